//! `GET /:lang/blog` — the article catalogue page.
//!
//! The body carries the available tag list (with per-tag article counts)
//! plus the sort and tag filters echoed back for the search widget; the
//! article cards themselves arrive through the blog-search endpoint.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use serde_json::json;

use crate::application::collaborators::TemplateMap;
use crate::application::error::RouteError;
use crate::cache::CacheSetting;
use crate::routing::{
    LangSetting, RequestContext, RouteDescriptor, RouteHandler, SegmentSet, Services,
};

pub const DEFAULT_SORT: &str = "publicationDateDesc";

pub struct CatalogueHandler {
    descriptor: RouteDescriptor,
}

impl CatalogueHandler {
    pub fn new() -> Self {
        Self {
            descriptor: RouteDescriptor {
                method: Method::GET,
                pattern: "/:lang/blog".to_string(),
                composed: true,
                cache: CacheSetting::ByUrlAndQuery,
                cache_ttl: Duration::from_secs(5 * 60),
                lang: LangSetting::InPath,
                templates: vec!["views/pages/blog-catalogue.html".to_string()],
                segments: SegmentSet::HEADER_AND_BODY,
            },
        }
    }

    fn title(&self, services: &Services, lang: &str) -> String {
        services
            .locales
            .get(lang)
            .map(|locale| locale.catalogue_header.clone())
            .unwrap_or_default()
    }
}

impl Default for CatalogueHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RouteHandler for CatalogueHandler {
    fn descriptor(&self) -> &RouteDescriptor {
        &self.descriptor
    }

    async fn render_header(
        &self,
        _ctx: &RequestContext,
        services: &Services,
        lang: &str,
        values: &mut TemplateMap,
    ) -> Result<StatusCode, RouteError> {
        values.insert("Title".to_string(), json!(self.title(services, lang)));
        Ok(StatusCode::OK)
    }

    async fn render_body(
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

        let listings = services.content.scan(&format!("{lang}/")).await?;
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for listing in &listings {
            for tag in &listing.meta.tags {
                *counts.entry(tag.as_str()).or_default() += 1;
            }
        }
        let tag_list: Vec<_> = counts
            .into_iter()
            .map(|(name, count)| json!({ "Name": name, "Count": count }))
            .collect();

        values.insert("Tags".to_string(), json!(tag_list));
        values.insert("QuerySort".to_string(), json!(sort));
        values.insert("QueryTags".to_string(), json!(tags.join(",")));
        values.insert("Title".to_string(), json!(self.title(services, lang)));
        Ok(StatusCode::OK)
    }
}
