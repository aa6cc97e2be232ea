//! `GET /:lang<len(2)>` — the per-language home page.

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

pub struct HomeHandler {
    descriptor: RouteDescriptor,
}

impl HomeHandler {
    pub fn new() -> Self {
        Self {
            descriptor: RouteDescriptor {
                method: Method::GET,
                pattern: "/:lang<len(2)>".to_string(),
                composed: true,
                cache: CacheSetting::ByUrlOnly,
                cache_ttl: Duration::from_secs(10 * 60),
                lang: LangSetting::InPath,
                templates: vec!["views/pages/home-page.html".to_string()],
                segments: SegmentSet::HEADER_AND_BODY,
            },
        }
    }

    fn title(&self, services: &Services, lang: &str) -> String {
        services
            .locales
            .get(lang)
            .map(|locale| locale.home_header.clone())
            .unwrap_or_default()
    }
}

impl Default for HomeHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RouteHandler for HomeHandler {
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
        _ctx: &RequestContext,
        services: &Services,
        lang: &str,
        values: &mut TemplateMap,
    ) -> Result<StatusCode, RouteError> {
        values.insert("Title".to_string(), json!(self.title(services, lang)));
        Ok(StatusCode::OK)
    }
}
