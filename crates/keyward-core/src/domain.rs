//! Host-name extraction for turning a pasted URL into an entry key.

fn host(url: &str) -> &str {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let end = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.'))
        .unwrap_or(rest.len());
    rest[..end].trim_matches('.')
}

/// Host part of `url` with scheme, port, path and query removed.
/// Input without a recognisable host is returned unchanged.
pub fn extract_full_domain(url: &str) -> String {
    match host(url) {
        "" => url.to_string(),
        h => h.to_string(),
    }
}

/// Registrable part of the host: the last two labels, or the last three
/// for `*.co.<tld>` hosts.
pub fn extract_top_domain(url: &str) -> String {
    let h = host(url);
    let labels: Vec<&str> = h.split('.').filter(|l| !l.is_empty()).collect();
    let keep = match labels.len() {
        0 | 1 => return url.to_string(),
        n if n >= 3 && labels[n - 2] == "co" => 3,
        _ => 2,
    };
    labels[labels.len() - keep..].join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_domain_strips_subdomains_and_paths() {
        for url in [
            "http://www.test.com/some/path/index.html",
            "https://test.com/some/path/index.html",
            "https://complicated.subdomain.structure.test.com/some/path/index.html",
            "www.test.com",
            "test.com/path/to/things",
            "test.com:8080/login",
        ] {
            assert_eq!(extract_top_domain(url), "test.com", "{url}");
        }
    }

    #[test]
    fn test_top_domain_keeps_co_suffix() {
        assert_eq!(
            extract_top_domain("www.amazon.co.jp/search=?some(characters)[strange]"),
            "amazon.co.jp"
        );
        assert_eq!(extract_top_domain("english.co.uk"), "english.co.uk");
    }

    #[test]
    fn test_full_domain() {
        assert_eq!(
            extract_full_domain("https://complicated.subdomain.structure.test.com/some/path"),
            "complicated.subdomain.structure.test.com"
        );
        assert_eq!(extract_full_domain("http://www.test.com/x"), "www.test.com");
        assert_eq!(
            extract_full_domain("www.amazon.co.jp/search=?some(characters)[strange]"),
            "www.amazon.co.jp"
        );
        assert_eq!(extract_full_domain("test.com?q=1"), "test.com");
    }

    #[test]
    fn test_no_url_passes_through() {
        assert_eq!(extract_top_domain("noUrl"), "noUrl");
        assert_eq!(extract_full_domain("noUrl"), "noUrl");
        assert_eq!(extract_full_domain("/path/only"), "/path/only");
    }
}
