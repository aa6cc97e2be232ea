//! `GET`/`PUT /api/v1/like` — like status and toggling for one article.
//!
//! Both verbs identify the article from the Referer path, which must look
//! like `/{lang}/blog/{page}`; the article has to exist in the content
//! store. Responses render the like-button partial, with `Liked` and
//! `LikedCount` template values.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use serde_json::json;
use tracing::debug;

use crate::application::collaborators::TemplateMap;
use crate::application::error::RouteError;
use crate::cache::CacheSetting;
use crate::routing::{
    LangSetting, RequestContext, RouteDescriptor, RouteHandler, SegmentSet, Services,
};

fn like_descriptor(method: Method) -> RouteDescriptor {
    RouteDescriptor {
        method,
        pattern: "/api/v1/like".to_string(),
        composed: false,
        cache: CacheSetting::Disabled,
        cache_ttl: Duration::from_secs(5 * 60),
        lang: LangSetting::InReferer,
        templates: vec!["views/partials/blog-page-like-button.html".to_string()],
        segments: SegmentSet::NONE,
    }
}

/// Resolve the liked article's page reference from the Referer, checking it
/// actually exists.
async fn referer_page(
    ctx: &RequestContext,
    services: &Services,
    lang: &str,
) -> Result<String, RouteError> {
    let referer = ctx.referer()?;
    if referer.parts.len() != 3 || referer.parts[1] != "blog" {
        return Err(RouteError::Validation(format!(
            "invalid path format: expected '/:lang/blog/:page', got '{}'",
            referer.path
        )));
    }

    let page = referer.parts[2].clone();
    let link = format!("{lang}/{page}.md");
    let listings = services.content.scan(&link).await.unwrap_or_default();
    if listings.is_empty() {
        return Err(RouteError::NotFound(format!(
            "server did not find '{link}' article"
        )));
    }
    Ok(page)
}

pub struct LikeStatusHandler {
    descriptor: RouteDescriptor,
}

impl LikeStatusHandler {
    pub fn new() -> Self {
        Self {
            descriptor: like_descriptor(Method::GET),
        }
    }
}

impl Default for LikeStatusHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RouteHandler for LikeStatusHandler {
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
        let page = referer_page(ctx, services, lang).await?;

        let liked = services.ledger.like_status(&ctx.client_ip, &page);
        debug!(
            target = "brezza::routing",
            ip = %ctx.client_ip,
            page = %page,
            liked,
            "like status requested"
        );

        values.insert("Liked".to_string(), json!(liked));
        values.insert(
            "LikedCount".to_string(),
            json!(services.ledger.like_count(&page)),
        );
        Ok(StatusCode::OK)
    }
}

pub struct LikeToggleHandler {
    descriptor: RouteDescriptor,
}

impl LikeToggleHandler {
    pub fn new() -> Self {
        Self {
            descriptor: like_descriptor(Method::PUT),
        }
    }
}

impl Default for LikeToggleHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RouteHandler for LikeToggleHandler {
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
        let page = referer_page(ctx, services, lang).await?;

        let raw = ctx.form_value("like").unwrap_or("true");
        let liked = parse_boolish(raw)
            .ok_or_else(|| RouteError::Validation(format!("invalid like value '{raw}'")))?;

        if liked {
            services.ledger.like_on(&ctx.client_ip, &page);
        } else {
            services.ledger.like_off(&ctx.client_ip, &page);
        }
        debug!(
            target = "brezza::routing",
            ip = %ctx.client_ip,
            page = %page,
            liked,
            "like toggled"
        );

        values.insert("Liked".to_string(), json!(liked));
        values.insert(
            "LikedCount".to_string(),
            json!(services.ledger.like_count(&page)),
        );
        Ok(StatusCode::OK)
    }
}

fn parse_boolish(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}
