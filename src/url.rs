//! URL normalization and decomposition.
//!
//! Breaks a raw blacklist-feed line into `(scheme, host, domain,
//! sub_domains, path, raw_query)` using the Public Suffix List, with a
//! naive last-two-labels fallback when the PSL can't help.

use crate::error::CoreError;

/// The structural pieces of a decomposed URL, as produced by [`set_url`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UrlParts {
    pub scheme: String,
    pub host: String,
    pub domain: String,
    pub sub_domains: Vec<String>,
    pub path: String,
    pub raw_query: String,
}

fn has_scheme(s: &str) -> bool {
    s.contains("://")
}

/// Parses a raw feed line into its structural components.
///
/// Feeds deliver bare domains far more often than full URLs, so when `raw`
/// carries no scheme the whole trimmed input is treated as the host.
pub fn set_url(raw: &str) -> Result<UrlParts, CoreError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoreError::MalformedUrl("empty input".to_string()));
    }

    if !has_scheme(trimmed) {
        let (domain, sub_domains) = extract_domain_and_sub_domains(trimmed);
        return Ok(UrlParts {
            scheme: String::new(),
            host: trimmed.to_string(),
            domain,
            sub_domains,
            path: String::new(),
            raw_query: String::new(),
        });
    }

    let parsed = url::Url::parse(trimmed).map_err(|e| CoreError::MalformedUrl(e.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| CoreError::MalformedUrl(format!("no host in {trimmed}")))?
        .to_string();
    let (domain, sub_domains) = extract_domain_and_sub_domains(&host);

    Ok(UrlParts {
        scheme: parsed.scheme().to_string(),
        host,
        domain,
        sub_domains,
        path: parsed.path().to_string(),
        raw_query: parsed.query().unwrap_or("").to_string(),
    })
}

/// Splits `host` into its PSL-derived effective TLD+1 and the labels in
/// front of it.
///
/// Falls back to a naive "last two labels" split when the PSL doesn't
/// recognize a proper suffix of `host` — this fallback is a conformance
/// requirement, not merely defensive (it's what makes wildcard-suffix
/// entries like `*.appspot.com` resolve the way feeds expect).
pub fn extract_domain_and_sub_domains(host: &str) -> (String, Vec<String>) {
    if let Some(domain) = psl::domain(host.as_bytes()) {
        if let Ok(domain_str) = std::str::from_utf8(domain.as_bytes()) {
            if is_strict_suffix(host, domain_str) {
                let prefix_len = host.len() - domain_str.len() - 1;
                let prefix = &host[..prefix_len];
                let sub_domains = if prefix.is_empty() {
                    Vec::new()
                } else {
                    prefix.split('.').map(str::to_string).collect()
                };
                return (domain_str.to_string(), sub_domains);
            }
        }
    }

    naive_domain_split(host)
}

fn is_strict_suffix(host: &str, suffix: &str) -> bool {
    suffix.len() < host.len()
        && host.ends_with(suffix)
        && host.as_bytes()[host.len() - suffix.len() - 1] == b'.'
}

fn naive_domain_split(host: &str) -> (String, Vec<String>) {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 1 {
        (host.to_string(), Vec::new())
    } else {
        let split_at = labels.len() - 2;
        let domain = labels[split_at..].join(".");
        let sub_domains = labels[..split_at].iter().map(|s| s.to_string()).collect();
        (domain, sub_domains)
    }
}

/// Lowercases `raw`, strips a trailing `/` from the path, and re-serializes.
/// Never fails: a URL that doesn't parse is returned lowercased as-is.
pub fn normalize_url(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    match url::Url::parse(&lowered) {
        Ok(mut parsed) => {
            let path = parsed.path().to_string();
            if path.len() > 1 && path.ends_with('/') {
                let trimmed = path.trim_end_matches('/');
                let trimmed = if trimmed.is_empty() { "/" } else { trimmed };
                parsed.set_path(trimmed);
            }
            parsed.to_string()
        }
        Err(_) => lowered,
    }
}

/// Enumerates every suffix of `host` down to (but excluding) the eTLD+1
/// naive split, for providers that want to index middle suffixes.
///
/// `a.b.c.d.e` yields `[a.b.c.d.e, b.c.d.e, c.d.e]`.
pub fn enumerate_sub_domain_suffixes(host: &str) -> Vec<String> {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return Vec::new();
    }
    (0..labels.len() - 2)
        .map(|i| labels[i..].join("."))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decomposes_rima_tde_example() {
        let parts = set_url("21.red-80-39-44.staticip.rima-tde.net").unwrap();
        assert_eq!(parts.domain, "rima-tde.net");
        assert_eq!(
            parts.sub_domains,
            vec!["21".to_string(), "red-80-39-44".to_string(), "staticip".to_string()]
        );
        assert_eq!(parts.path, "");
    }

    #[test]
    fn falls_back_naively_for_appspot_wildcard() {
        let parts =
            set_url("001420990998183-dot-wetransfer-auth-file-342.appspot.com").unwrap();
        assert_eq!(parts.domain, "appspot.com");
        assert_eq!(
            parts.sub_domains,
            vec!["001420990998183-dot-wetransfer-auth-file-342".to_string()]
        );
        assert_eq!(parts.host, "001420990998183-dot-wetransfer-auth-file-342.appspot.com");
    }

    #[test]
    fn reconstructs_host_from_domain_and_sub_domains() {
        let host = "a.b.c.example.com";
        let (domain, subs) = extract_domain_and_sub_domains(host);
        let mut rebuilt = subs.join(".");
        if !rebuilt.is_empty() {
            rebuilt.push('.');
        }
        rebuilt.push_str(&domain);
        assert_eq!(rebuilt, host);
    }

    #[test]
    fn single_label_host_has_no_sub_domains() {
        let (domain, subs) = extract_domain_and_sub_domains("localhost");
        assert_eq!(domain, "localhost");
        assert!(subs.is_empty());
    }

    #[test]
    fn normalize_url_is_idempotent() {
        let raw = "HTTP://Example.COM/Some/Path/";
        let once = normalize_url(raw);
        let twice = normalize_url(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_url_strips_trailing_slash() {
        let normalized = normalize_url("https://example.com/a/b/");
        assert_eq!(normalized, "https://example.com/a/b");
    }

    #[test]
    fn normalize_url_never_errors_on_garbage() {
        let normalized = normalize_url("NOT A URL AT ALL");
        assert_eq!(normalized, "not a url at all");
    }

    #[test]
    fn enumerate_suffixes_matches_spec_example() {
        let suffixes = enumerate_sub_domain_suffixes("a.b.c.d.e");
        assert_eq!(
            suffixes,
            vec!["a.b.c.d.e".to_string(), "b.c.d.e".to_string(), "c.d.e".to_string()]
        );
    }

    #[test]
    fn enumerate_suffixes_empty_for_short_host() {
        assert!(enumerate_sub_domain_suffixes("example.com").is_empty());
    }

    #[test]
    fn set_url_rejects_empty_input() {
        assert!(set_url("   ").is_err());
    }

    #[test]
    fn set_url_parses_full_url_with_path_and_query() {
        let parts = set_url("http://5.175.249.223/hiddenbin/boatnet.ppc?x=1").unwrap();
        assert_eq!(parts.scheme, "http");
        assert_eq!(parts.path, "/hiddenbin/boatnet.ppc");
        assert_eq!(parts.raw_query, "x=1");
    }
}
