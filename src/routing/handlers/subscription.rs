//! `PUT /api/v1/subs` — update a client's notification subscription.
//!
//! Renders the personal-page status partial; validation and mailer failures
//! answer 422 with a localized message rather than a bare error body.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use serde_json::json;
use tracing::warn;

use crate::application::collaborators::{SubscriptionKind, TemplateMap};
use crate::application::error::RouteError;
use crate::cache::CacheSetting;
use crate::routing::handlers::{user_profile_locale, STATUS_PARTIAL};
use crate::routing::{
    LangSetting, RequestContext, RouteDescriptor, RouteHandler, SegmentSet, Services,
};

pub struct SubscribeHandler {
    descriptor: RouteDescriptor,
}

impl SubscribeHandler {
    pub fn new() -> Self {
        Self {
            descriptor: RouteDescriptor {
                method: Method::PUT,
                pattern: "/api/v1/subs".to_string(),
                composed: false,
                cache: CacheSetting::Disabled,
                cache_ttl: Duration::from_secs(5 * 60),
                lang: LangSetting::InReferer,
                templates: vec![STATUS_PARTIAL.to_string()],
                segments: SegmentSet::NONE,
            },
        }
    }
}

impl Default for SubscribeHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RouteHandler for SubscribeHandler {
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
        let locale = user_profile_locale(services, lang);
        values.insert("StatusId".to_string(), json!("subs-message"));

        let raw_kind = ctx.form_value("tags").unwrap_or("");
        let Some(kind) = SubscriptionKind::parse(raw_kind) else {
            values.insert("Status".to_string(), json!("Failed"));
            values.insert("Message".to_string(), json!(locale.subscribe_invalid_type));
            return Ok(StatusCode::UNPROCESSABLE_ENTITY);
        };

        let tags: Vec<String> = ctx
            .form_value("tags_picked")
            .unwrap_or("")
            .split(',')
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect();

        match services
            .mailer
            .subscribe(&ctx.client_ip, kind, &tags)
            .await
        {
            Ok(()) => {
                values.insert("Status".to_string(), json!("OK"));
                values.insert(
                    "Message".to_string(),
                    json!(locale.subscribed_successfully),
                );
                Ok(StatusCode::OK)
            }
            Err(err) => {
                warn!(
                    target = "brezza::routing",
                    kind = kind.as_str(),
                    error = %err,
                    "failed to update a subscription"
                );
                values.insert("Status".to_string(), json!("Failed"));
                values.insert("Message".to_string(), json!(locale.failed_to_subscribe));
                Ok(StatusCode::UNPROCESSABLE_ENTITY)
            }
        }
    }
}
