use url::Url;

/// Transport class of a discovered URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeClass {
    /// http / https, checked over the network.
    Fetchable,
    /// file, checked against the filesystem.
    File,
    /// mailto, tel, javascript, data, and the rest: never checked.
    Unsupported,
}

pub fn classify_scheme(url: &Url) -> SchemeClass {
    match url.scheme() {
        "http" | "https" => SchemeClass::Fetchable,
        "file" => SchemeClass::File,
        _ => SchemeClass::Unsupported,
    }
}

/// Resolve a raw URL string, relative to `base` when present, using RFC
/// 3986 join semantics.
pub fn resolve(raw: &str, base: Option<&Url>) -> Result<Url, url::ParseError> {
    match base {
        Some(base) => base.join(raw),
        None => Url::parse(raw),
    }
}

/// Normalized form used by the dedupe cache: the parsed URL with its
/// fragment stripped. The `url` crate already lowercases the host and
/// elides default ports, so equal origins collapse structurally; path and
/// query are kept verbatim.
pub fn normalize(url: &Url) -> Url {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    normalized
}

/// Origin key per RFC 6454: scheme + host + effective port. Opaque
/// origins (e.g. `file://`) yield None and never match a seed origin.
pub fn origin_key(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    let port = url.port_or_known_default();
    match port {
        Some(port) => Some(format!("{}://{}:{}", url.scheme(), host, port)),
        None => Some(format!("{}://{}", url.scheme(), host)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_are_stripped() {
        let url = Url::parse("http://example.com/a?q=1#section").unwrap();
        assert_eq!(normalize(&url).as_str(), "http://example.com/a?q=1");
    }

    #[test]
    fn fragment_only_links_collapse_onto_the_parent() {
        let parent = Url::parse("http://example.com/page").unwrap();
        let resolved = resolve("#top", Some(&parent)).unwrap();
        assert_eq!(normalize(&resolved), normalize(&parent));
    }

    #[test]
    fn origin_ignores_default_ports() {
        let a = Url::parse("https://example.com/x").unwrap();
        let b = Url::parse("https://example.com:443/y").unwrap();
        let c = Url::parse("https://example.com:8443/y").unwrap();
        assert_eq!(origin_key(&a), origin_key(&b));
        assert_ne!(origin_key(&a), origin_key(&c));
    }

    #[test]
    fn scheme_classification() {
        for (raw, class) in [
            ("http://example.com/", SchemeClass::Fetchable),
            ("https://example.com/", SchemeClass::Fetchable),
            ("file:///tmp/x", SchemeClass::File),
            ("mailto:a@example.com", SchemeClass::Unsupported),
            ("tel:+15551234", SchemeClass::Unsupported),
            ("javascript:void(0)", SchemeClass::Unsupported),
            ("data:text/plain,hi", SchemeClass::Unsupported),
        ] {
            let url = Url::parse(raw).unwrap();
            assert_eq!(classify_scheme(&url), class, "{raw}");
        }
    }
}
