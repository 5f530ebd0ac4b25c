use tracing::debug;
use url::Url;

use crate::FetchedDoc;

/// Resolve a `file://` URL against the local filesystem. A missing path
/// yields a synthetic 404; directories honor the listing flag.
pub async fn check_file_url(url: &Url, directory_listing: bool) -> FetchedDoc {
    let Ok(path) = url.to_file_path() else {
        return FetchedDoc {
            status: 404,
            ..FetchedDoc::default()
        };
    };

    let status = match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_dir() && !directory_listing => {
            debug!(path = %path.display(), "directory hit without directory listing enabled");
            404
        }
        Ok(_) => 200,
        Err(_) => 404,
    };

    FetchedDoc {
        status,
        ..FetchedDoc::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_url(path: &std::path::Path) -> Url {
        Url::from_file_path(path).unwrap()
    }

    #[tokio::test]
    async fn existing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exists.txt");
        std::fs::write(&path, "x").unwrap();

        let doc = check_file_url(&file_url(&path), false).await;
        assert_eq!(doc.status, 200);
    }

    #[tokio::test]
    async fn missing_file_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let doc = check_file_url(&file_url(&dir.path().join("missing.txt")), false).await;
        assert_eq!(doc.status, 404);
    }

    #[tokio::test]
    async fn directories_honor_the_listing_flag() {
        let dir = tempfile::tempdir().unwrap();
        let url = file_url(dir.path());

        assert_eq!(check_file_url(&url, true).await.status, 200);
        assert_eq!(check_file_url(&url, false).await.status, 404);
    }
}
