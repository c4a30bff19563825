//! Hosts trusted without a signature.

/// Exact host names (case-insensitive) and `*.suffix` wildcards. A
/// wildcard matches subdomains at any depth, never the bare suffix.
#[derive(Debug, Clone, Default)]
pub struct DomainAllowlist {
    exact: Vec<String>,
    /// Stored as `.suffix`.
    suffixes: Vec<String>,
}

impl DomainAllowlist {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let mut allowlist = Self::default();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim().to_ascii_lowercase();
            if let Some(suffix) = pattern.strip_prefix("*.") {
                let suffix = suffix.trim_end_matches('.');
                if !suffix.is_empty() && !suffix.contains('*') {
                    allowlist.suffixes.push(format!(".{}", suffix));
                }
                continue;
            }
            // Wildcards are only valid as a leading `*.` label.
            let host = pattern.trim_end_matches('.');
            if !host.is_empty() && !host.contains('*') {
                allowlist.exact.push(host.to_string());
            }
        }
        allowlist
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.suffixes.is_empty()
    }

    pub fn matches(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        if host.is_empty() {
            return false;
        }
        self.exact.iter().any(|exact| *exact == host) ||
            self.suffixes
                .iter()
                .any(|suffix| host.len() > suffix.len() && host.ends_with(suffix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_matches_subdomains_only() {
        let allowlist = DomainAllowlist::new(&["*.example.com"]);
        assert!(allowlist.matches("img.example.com"));
        assert!(allowlist.matches("cdn.img.example.com"));
        assert!(!allowlist.matches("example.com"));
        assert!(!allowlist.matches("evilexample.com"));
        assert!(!allowlist.matches("example.com.evil.org"));
    }

    #[test]
    fn test_exact_match_ignores_case() {
        let allowlist = DomainAllowlist::new(&["Images.Example.org"]);
        assert!(allowlist.matches("images.example.org"));
        assert!(allowlist.matches("IMAGES.EXAMPLE.ORG"));
        assert!(!allowlist.matches("cdn.images.example.org"));
    }

    #[test]
    fn test_degenerate_patterns() {
        let allowlist = DomainAllowlist::new(&["", "*.", "  ", "*", "*..", "a.*.com"]);
        assert!(allowlist.is_empty());
        assert!(!allowlist.matches(""));
        assert!(!allowlist.matches("*"));
        assert!(!allowlist.matches("anything.com"));
    }

    #[test]
    fn test_trailing_dots_are_ignored() {
        let allowlist = DomainAllowlist::new(&["*.example.com.", "cdn.example.org."]);
        assert!(allowlist.matches("img.example.com"));
        assert!(allowlist.matches("img.example.com."));
        assert!(allowlist.matches("cdn.example.org"));
        assert!(!allowlist.matches("example.com"));
    }
}
