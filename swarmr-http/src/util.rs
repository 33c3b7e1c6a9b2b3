pub(super) fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

pub(super) fn host_header_value(parsed: &url::Url) -> Option<String> {
    let host = parsed.host_str()?;
    match parsed.port() {
        Some(port) => Some(format!("{host}:{port}")),
        None => Some(host.to_string()),
    }
}

/// Join a target base address and an absolute request path.
///
/// Exactly one `/` separates the two regardless of trailing/leading slashes.
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return format!("{base}/");
    }
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(join_url("http://h:1", "/todos"), "http://h:1/todos");
        assert_eq!(join_url("http://h:1/", "/todos"), "http://h:1/todos");
        assert_eq!(join_url("http://h:1/", "todos/7"), "http://h:1/todos/7");
        assert_eq!(join_url("http://h:1/api", "/health"), "http://h:1/api/health");
        assert_eq!(join_url("http://h:1", ""), "http://h:1/");
    }

    #[test]
    fn host_header_keeps_explicit_port() {
        let u = url::Url::parse("http://localhost:8080/x").unwrap();
        assert_eq!(host_header_value(&u).as_deref(), Some("localhost:8080"));

        let u = url::Url::parse("http://localhost/x").unwrap();
        assert_eq!(host_header_value(&u).as_deref(), Some("localhost"));
    }
}
