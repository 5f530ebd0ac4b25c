use regex::Regex;

/// A single URL rewrite rule. Rules run in order against the raw URL
/// string before resolution and classification.
#[derive(Debug, Clone)]
pub struct UrlRewriteRule {
    pub pattern: Regex,
    pub replacement: String,
}

impl UrlRewriteRule {
    pub fn new(pattern: Regex, replacement: impl Into<String>) -> Self {
        Self {
            pattern,
            replacement: replacement.into(),
        }
    }
}

/// Apply every rule in order, feeding each rule the output of the previous.
pub fn apply_rewrites(raw: &str, rules: &[UrlRewriteRule]) -> String {
    let mut out = raw.to_string();
    for rule in rules {
        out = rule
            .pattern
            .replace_all(&out, rule.replacement.as_str())
            .into_owned();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_apply_in_order() {
        let rules = vec![
            UrlRewriteRule::new(Regex::new("^http://legacy/").unwrap(), "http://new/"),
            UrlRewriteRule::new(Regex::new("^http://new/a$").unwrap(), "http://new/b"),
        ];
        assert_eq!(apply_rewrites("http://legacy/a", &rules), "http://new/b");
        assert_eq!(apply_rewrites("http://other/a", &rules), "http://other/a");
    }

    #[test]
    fn capture_groups_expand() {
        let rules = vec![UrlRewriteRule::new(
            Regex::new(r"^http://cdn-(\d+)\.example/").unwrap(),
            "http://cdn.example/$1/",
        )];
        assert_eq!(
            apply_rewrites("http://cdn-3.example/x.png", &rules),
            "http://cdn.example/3/x.png"
        );
    }
}
