//! `GET /:lang/user` — the subscriber profile page.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use serde_json::json;
use tracing::warn;

use crate::application::collaborators::{SubscriberInfo, TemplateMap};
use crate::application::error::RouteError;
use crate::cache::CacheSetting;
use crate::routing::{
    LangSetting, RequestContext, RouteDescriptor, RouteHandler, SegmentSet, Services,
};

pub struct UserHandler {
    descriptor: RouteDescriptor,
}

impl UserHandler {
    pub fn new() -> Self {
        Self {
            descriptor: RouteDescriptor {
                method: Method::GET,
                pattern: "/:lang/user".to_string(),
                composed: true,
                cache: CacheSetting::Disabled,
                cache_ttl: Duration::from_secs(5 * 60),
                lang: LangSetting::InPath,
                templates: vec!["views/pages/user-page.html".to_string()],
                segments: SegmentSet::HEADER_AND_BODY,
            },
        }
    }

    fn title(&self, services: &Services, lang: &str) -> String {
        services
            .locales
            .get(lang)
            .map(|locale| locale.user_profile.header.clone())
            .unwrap_or_default()
    }
}

impl Default for UserHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RouteHandler for UserHandler {
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
        // A fresh visitor has no profile yet; that renders as the empty one.
        let info = match services.mailer.info(&ctx.client_ip).await {
            Ok(info) => info,
            Err(err) => {
                warn!(
                    target = "brezza::routing",
                    error = %err,
                    "failed to read the subscriber profile"
                );
                SubscriberInfo::default()
            }
        };

        let listings = services.content.scan(&format!("{lang}/")).await?;
        let existing_tags: BTreeSet<&str> = listings
            .iter()
            .flat_map(|listing| listing.meta.tags.iter())
            .map(String::as_str)
            .collect();

        values.insert("Title".to_string(), json!(self.title(services, lang)));
        values.insert("Email".to_string(), json!(info.email));
        values.insert("TagsPicked".to_string(), json!(info.kind.as_str()));
        values.insert("TagsPickedList".to_string(), json!(info.tags));
        values.insert(
            "EmailCode".to_string(),
            json!(ctx.query_first("email_code").unwrap_or("")),
        );
        values.insert("ExistingTags".to_string(), json!(existing_tags));
        Ok(StatusCode::OK)
    }
}
