/// Validates a post-login return path to prevent open redirects.
///
/// Only same-site relative paths are accepted: the value must start with
/// a single `/` and must not be a protocol-relative URL (`//evil.com`),
/// carry a scheme (`https://`, `javascript:`) or contain control
/// characters. Anything else yields `None` and the caller falls back to
/// its default destination.
pub fn validate_return_to(path: &str) -> Option<&str> {
    let relative = path.starts_with('/') && !path.starts_with("//");
    if !relative || path.contains("://") || path.chars().any(|c| c.is_control()) {
        return None;
    }
    Some(path)
}

/// Checks a request path against the configured excluded-path patterns.
///
/// A pattern is either an exact path (`/healthz`) or a prefix wildcard
/// (`/static/*`, which also matches `/static` itself).
pub fn matches_excluded_path(patterns: &[String], path: &str) -> bool {
    patterns.iter().any(|pattern| pattern_matches(pattern, path))
}

fn pattern_matches(pattern: &str, path: &str) -> bool {
    match pattern.strip_suffix("/*") {
        Some(prefix) => {
            path == prefix
                || path
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/'))
        }
        None => pattern == path,
    }
}
