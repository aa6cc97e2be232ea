//! `GET /` — the language selection page.

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

const TITLE: &str = "Choose Your Language";

pub struct LanguagePickHandler {
    descriptor: RouteDescriptor,
}

impl LanguagePickHandler {
    pub fn new() -> Self {
        Self {
            descriptor: RouteDescriptor {
                method: Method::GET,
                pattern: "/".to_string(),
                composed: true,
                cache: CacheSetting::ByUrlOnly,
                cache_ttl: Duration::from_secs(24 * 60 * 60),
                lang: LangSetting::NotRequired,
                templates: vec!["views/pages/language-pick.html".to_string()],
                segments: SegmentSet::HEADER_AND_BODY,
            },
        }
    }
}

impl Default for LanguagePickHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RouteHandler for LanguagePickHandler {
    fn descriptor(&self) -> &RouteDescriptor {
        &self.descriptor
    }

    async fn render_header(
        &self,
        _ctx: &RequestContext,
        _services: &Services,
        _lang: &str,
        values: &mut TemplateMap,
    ) -> Result<StatusCode, RouteError> {
        values.insert("Title".to_string(), json!(TITLE));
        Ok(StatusCode::OK)
    }

    async fn render_body(
        &self,
        _ctx: &RequestContext,
        services: &Services,
        _lang: &str,
        values: &mut TemplateMap,
    ) -> Result<StatusCode, RouteError> {
        values.insert("Title".to_string(), json!(TITLE));
        values.insert(
            "AvailableLanguages".to_string(),
            json!(services.languages),
        );
        Ok(StatusCode::OK)
    }
}
