//! `GET /:lang/blog/:title` — one article, rendered from stored markdown.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use serde_json::json;

use crate::application::collaborators::{ArticleMeta, TemplateMap};
use crate::application::error::RouteError;
use crate::cache::CacheSetting;
use crate::routing::handlers::format_published;
use crate::routing::{
    LangSetting, RequestContext, RouteDescriptor, RouteHandler, SegmentSet, Services,
};

pub struct ArticleHandler {
    descriptor: RouteDescriptor,
}

impl ArticleHandler {
    pub fn new() -> Self {
        Self {
            descriptor: RouteDescriptor {
                method: Method::GET,
                pattern: "/:lang/blog/:title".to_string(),
                composed: true,
                cache: CacheSetting::ByUrlOnly,
                cache_ttl: Duration::from_secs(15 * 60),
                lang: LangSetting::InPath,
                templates: vec!["views/pages/blog-page.html".to_string()],
                segments: SegmentSet::HEADER_AND_BODY,
            },
        }
    }
}

impl Default for ArticleHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn page_reference(ctx: &RequestContext) -> Result<&str, RouteError> {
    ctx.param("title")
        .ok_or_else(|| RouteError::Validation("article title is missing from the path".to_string()))
}

async fn read_meta(
    services: &Services,
    lang: &str,
    reference: &str,
) -> Result<(ArticleMeta, String), RouteError> {
    services
        .content
        .read_article(&format!("{lang}/{reference}.md"))
        .await
        .map_err(|err| RouteError::NotFound(format!("failed to find '{reference}' post: {err}")))
}

#[async_trait]
impl RouteHandler for ArticleHandler {
    fn descriptor(&self) -> &RouteDescriptor {
        &self.descriptor
    }

    async fn render_header(
        &self,
        ctx: &RequestContext,
        services: &Services,
        lang: &str,
        values: &mut TemplateMap,
    ) -> Result<StatusCode, RouteError> {
        let reference = page_reference(ctx)?;
        let (meta, _) = read_meta(services, lang, reference).await?;
        values.insert("Title".to_string(), json!(meta.title));
        Ok(StatusCode::OK)
    }

    async fn render_body(
        &self,
        ctx: &RequestContext,
        services: &Services,
        lang: &str,
        values: &mut TemplateMap,
    ) -> Result<StatusCode, RouteError> {
        let reference = page_reference(ctx)?;
        let (meta, markdown) = read_meta(services, lang, reference).await?;
        let html = services.markdown.to_html(&markdown)?;

        // Geolocation is authored as "lat lon [area-meters]".
        let mut geolocation = meta.geolocation.split_whitespace();
        let x = geolocation.next().unwrap_or_default();
        let y = geolocation.next().unwrap_or_default();
        let area = geolocation.next().unwrap_or_default();

        values.insert("MapLocationX".to_string(), json!(x));
        values.insert("MapLocationY".to_string(), json!(y));
        values.insert("MapLocationAreaMeters".to_string(), json!(area));
        values.insert("Title".to_string(), json!(meta.title));
        values.insert("ParsedMarkdown".to_string(), json!(html));
        values.insert(
            "PublishedDate".to_string(),
            json!(format_published(meta.published_at)),
        );
        values.insert("ActionDate".to_string(), json!(meta.action_date));
        values.insert(
            "ShortDescription".to_string(),
            json!(meta.short_description),
        );

        services
            .views
            .record(ctx.client_ip.clone(), reference.to_string());

        Ok(StatusCode::OK)
    }
}
