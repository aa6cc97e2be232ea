//! Fragment-cache key derivation.
//!
//! Keys are globally unique per (method, segment-or-"full", normalized path,
//! query-if-policy-requires-it). Two policy-equivalent requests always derive
//! the same key; two distinct logical targets never share one.

use axum::http::Method;
use serde::Deserialize;

/// Per-route policy selecting whether and how a rendered artifact
/// participates in the fragment cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CacheSetting {
    Disabled,
    ByUrlOnly,
    ByUrlAndQuery,
}

/// Key slot used for a complete response, monolithic or composed layout.
pub const FULL_SEGMENT: &str = "full";

/// Derive the cache key for one render, or `None` when the route opts out.
///
/// `segment` is a fragment name (`header`, `body`, ...) or [`FULL_SEGMENT`].
/// The path is normalized by trimming slashes so `/en/blog` and `/en/blog/`
/// land on the same entry.
pub fn fragment_key(
    setting: CacheSetting,
    method: &Method,
    segment: &str,
    path: &str,
    query: &str,
) -> Option<String> {
    let trimmed = path.trim_matches('/');
    match setting {
        CacheSetting::Disabled => None,
        CacheSetting::ByUrlOnly => Some(format!("{method}.{segment}.{trimmed}")),
        CacheSetting::ByUrlAndQuery => Some(format!("{method}.{segment}.{trimmed}.{query}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_routes_never_derive_a_key() {
        assert_eq!(
            fragment_key(CacheSetting::Disabled, &Method::GET, "body", "/en/blog", ""),
            None
        );
    }

    #[test]
    fn url_only_ignores_query() {
        let asc = fragment_key(
            CacheSetting::ByUrlOnly,
            &Method::GET,
            FULL_SEGMENT,
            "/en/blog",
            "sort=titleAsc",
        );
        let desc = fragment_key(
            CacheSetting::ByUrlOnly,
            &Method::GET,
            FULL_SEGMENT,
            "/en/blog",
            "sort=titleDesc",
        );
        assert_eq!(asc, desc);
        assert_eq!(asc.as_deref(), Some("GET.full.en/blog"));
    }

    #[test]
    fn url_and_query_separates_queries() {
        let asc = fragment_key(
            CacheSetting::ByUrlAndQuery,
            &Method::GET,
            FULL_SEGMENT,
            "/en/blog",
            "sort=titleAsc",
        );
        let desc = fragment_key(
            CacheSetting::ByUrlAndQuery,
            &Method::GET,
            FULL_SEGMENT,
            "/en/blog",
            "sort=titleDesc",
        );
        assert_ne!(asc, desc);
    }

    #[test]
    fn segments_do_not_collide_with_full_pages() {
        let body = fragment_key(
            CacheSetting::ByUrlOnly,
            &Method::GET,
            "body",
            "/en/blog/my-post",
            "",
        );
        let full = fragment_key(
            CacheSetting::ByUrlOnly,
            &Method::GET,
            FULL_SEGMENT,
            "/en/blog/my-post",
            "",
        );
        assert_ne!(body, full);
    }

    #[test]
    fn trailing_slashes_normalize() {
        let plain = fragment_key(CacheSetting::ByUrlOnly, &Method::GET, "body", "/en/blog", "");
        let slashed = fragment_key(
            CacheSetting::ByUrlOnly,
            &Method::GET,
            "body",
            "/en/blog/",
            "",
        );
        assert_eq!(plain, slashed);
    }
}
