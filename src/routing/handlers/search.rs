//! `GET /api/v1/blog-search` — filtered, sorted article cards.

use std::cmp::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use serde_json::json;

use crate::application::collaborators::{ArticleListing, TemplateMap};
use crate::application::error::RouteError;
use crate::cache::CacheSetting;
use crate::routing::handlers::format_published;
use crate::routing::{
    LangSetting, RequestContext, RouteDescriptor, RouteHandler, SegmentSet, Services,
};

use super::catalogue::DEFAULT_SORT;

pub struct BlogSearchHandler {
    descriptor: RouteDescriptor,
}

impl BlogSearchHandler {
    pub fn new() -> Self {
        Self {
            descriptor: RouteDescriptor {
                method: Method::GET,
                pattern: "/api/v1/blog-search".to_string(),
                composed: false,
                cache: CacheSetting::ByUrlAndQuery,
                cache_ttl: Duration::from_secs(5 * 60),
                lang: LangSetting::InForm,
                templates: vec![
                    "views/partials/catalogue-blog-cards.html".to_string(),
                    "views/partials/catalogue-blog-card-tags.html".to_string(),
                ],
                segments: SegmentSet::NONE,
            },
        }
    }
}

impl Default for BlogSearchHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RouteHandler for BlogSearchHandler {
    fn descriptor(&self) -> &RouteDescriptor {
        &self.descriptor
    }

    async fn render(
        &self,
        ctx: &RequestContext,
        services: &Services,
        lang: &str,
        values: &mut TemplateMap,
    ) -> Result<StatusCode, RouteError> {
        let sort = match ctx.query_first("sort") {
            Some(sort) if !sort.is_empty() => sort,
            _ => DEFAULT_SORT,
        };
        let tags = ctx.query_all("tags[]");

        let mut listings = services.content.scan(&format!("{lang}/")).await?;
        listings.retain(|listing| {
            tags.is_empty() || listing.meta.tags.iter().any(|tag| tags.contains(tag))
        });
        sort_listings(&mut listings, sort);

        let cards: Vec<_> = listings
            .iter()
            .map(|listing| {
                json!({
                    "Link": listing.link,
                    "ArticleLink": format!("/{lang}/blog/{}", listing.reference),
                    "Title": listing.meta.title,
                    "PublishedTime": format_published(listing.meta.published_at),
                    "ActionDate": listing.meta.action_date,
                    "ShortDescription": listing.meta.short_description,
                    "Thumbnail": listing.meta.thumbnail,
                    "Tags": listing.meta.tags,
                    "LikeCount": services.ledger.like_count(&listing.reference),
                    "ViewCount": services.ledger.view_count(&listing.reference),
                })
            })
            .collect();

        values.insert("BlogPages".to_string(), json!(cards));
        Ok(StatusCode::OK)
    }
}

fn sort_listings(listings: &mut [ArticleListing], sort: &str) {
    listings.sort_by(|a, b| match sort {
        "titleAsc" => a.meta.title.cmp(&b.meta.title),
        "titleDesc" => b.meta.title.cmp(&a.meta.title),
        "actionDateAsc" => a.meta.action_date.cmp(&b.meta.action_date),
        "actionDateDesc" => b.meta.action_date.cmp(&a.meta.action_date),
        "publicationDateAsc" => a.meta.published_at.cmp(&b.meta.published_at),
        "publicationDateDesc" => b.meta.published_at.cmp(&a.meta.published_at),
        _ => Ordering::Equal,
    });
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use crate::application::collaborators::ArticleMeta;

    use super::*;

    fn listing(title: &str, action: &str, published: time::OffsetDateTime) -> ArticleListing {
        ArticleListing {
            link: format!("https://cdn.example/{title}"),
            reference: title.to_string(),
            meta: ArticleMeta {
                title: title.to_string(),
                published_at: published,
                action_date: action.to_string(),
                short_description: String::new(),
                thumbnail: String::new(),
                tags: Vec::new(),
                geolocation: String::new(),
            },
        }
    }

    #[test]
    fn publication_date_desc_puts_newest_first() {
        let mut listings = vec![
            listing("older", "2023-01-01", datetime!(2023-01-01 0:00 UTC)),
            listing("newer", "2024-01-01", datetime!(2024-01-01 0:00 UTC)),
        ];
        sort_listings(&mut listings, "publicationDateDesc");
        assert_eq!(listings[0].reference, "newer");
    }

    #[test]
    fn title_sorts_are_lexicographic() {
        let mut listings = vec![
            listing("banana", "2023-01-01", datetime!(2023-01-01 0:00 UTC)),
            listing("apple", "2024-01-01", datetime!(2024-01-01 0:00 UTC)),
        ];
        sort_listings(&mut listings, "titleAsc");
        assert_eq!(listings[0].reference, "apple");
        sort_listings(&mut listings, "titleDesc");
        assert_eq!(listings[0].reference, "banana");
    }

    #[test]
    fn unknown_sort_keeps_the_scan_order() {
        let mut listings = vec![
            listing("banana", "2023-01-01", datetime!(2023-01-01 0:00 UTC)),
            listing("apple", "2024-01-01", datetime!(2024-01-01 0:00 UTC)),
        ];
        sort_listings(&mut listings, "whatever");
        assert_eq!(listings[0].reference, "banana");
    }
}
