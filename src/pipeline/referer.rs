//! Referer recovery for fragment requests.
//!
//! Fragment endpoints carry no information about the page being assembled
//! except the `Referer` header; this module turns that header into a path,
//! its segments, and the query string.

use axum::http::header::REFERER;
use axum::http::HeaderMap;
use url::Url;

use crate::application::error::RouteError;
use crate::routing::RefererPath;

pub fn parse_referer(headers: &HeaderMap) -> Result<RefererPath, RouteError> {
    let raw = headers
        .get(REFERER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    if raw.is_empty() {
        return Err(RouteError::validation("'Referer' header is empty"));
    }

    let parsed = if raw.starts_with('/') {
        Url::parse("http://referer.invalid")
            .and_then(|base| base.join(raw))
    } else {
        Url::parse(raw)
    };
    let url = parsed
        .map_err(|err| RouteError::Validation(format!("'Referer' header is invalid: {err}")))?;

    let path = url.path().to_string();
    let parts: Vec<String> = path
        .trim_matches('/')
        .split('/')
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect();
    let query = url.query().unwrap_or("").to_string();

    Ok(RefererPath { path, parts, query })
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(referer: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(REFERER, HeaderValue::from_str(referer).expect("header"));
        headers
    }

    #[test]
    fn absolute_referers_split_into_parts() {
        let referer =
            parse_referer(&headers("https://blog.example/en/blog/my-post?sort=titleAsc"))
                .expect("parses");
        assert_eq!(referer.path, "/en/blog/my-post");
        assert_eq!(referer.parts, vec!["en", "blog", "my-post"]);
        assert_eq!(referer.query, "sort=titleAsc");
    }

    #[test]
    fn path_only_referers_are_accepted() {
        let referer = parse_referer(&headers("/en/blog")).expect("parses");
        assert_eq!(referer.path, "/en/blog");
        assert_eq!(referer.parts, vec!["en", "blog"]);
        assert_eq!(referer.query, "");
    }

    #[test]
    fn missing_referer_is_a_validation_error() {
        let err = parse_referer(&HeaderMap::new()).expect_err("no referer");
        assert_eq!(err.public_message(), "'Referer' header is empty");
    }

    #[test]
    fn garbage_referers_are_rejected() {
        let err = parse_referer(&headers("::notaurl::")).expect_err("invalid");
        assert!(err.public_message().starts_with("'Referer' header is invalid"));
    }

    #[test]
    fn root_referer_has_no_parts() {
        let referer = parse_referer(&headers("https://blog.example/")).expect("parses");
        assert_eq!(referer.path, "/");
        assert!(referer.parts.is_empty());
    }
}
