//! `GET /:lang/user/unsubscribe` — redeem an unsubscribe code from a
//! notification email. Always renders the unsubscribe page; the outcome is
//! carried by a status color, emoji, and localized text.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use serde_json::json;
use tracing::{error, info};

use crate::application::collaborators::{TemplateMap, UnsubscribeError, UnsubscribeLocale};
use crate::application::error::RouteError;
use crate::cache::CacheSetting;
use crate::routing::{
    LangSetting, RequestContext, RouteDescriptor, RouteHandler, SegmentSet, Services,
};

pub struct UnsubscribeHandler {
    descriptor: RouteDescriptor,
}

impl UnsubscribeHandler {
    pub fn new() -> Self {
        Self {
            descriptor: RouteDescriptor {
                method: Method::GET,
                pattern: "/:lang/user/unsubscribe".to_string(),
                composed: false,
                cache: CacheSetting::Disabled,
                cache_ttl: Duration::from_secs(5 * 60),
                lang: LangSetting::InPath,
                templates: vec!["views/pages/unsubscribe-page.html".to_string()],
                segments: SegmentSet::NONE,
            },
        }
    }
}

impl Default for UnsubscribeHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RouteHandler for UnsubscribeHandler {
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
        let locale = services
            .locales
            .get(lang)
            .map(|locale| locale.unsubscribe.clone())
            .unwrap_or_else(UnsubscribeLocale::default);

        let code = ctx.query_first("code").unwrap_or("");
        let (status, color, emoji, text) = if code.is_empty() {
            (
                StatusCode::BAD_REQUEST,
                "0, 0, 255",
                "(╭ರ_•́)",
                locale.unset_code,
            )
        } else {
            match services.mailer.unsubscribe(code).await {
                Ok(()) => (
                    StatusCode::OK,
                    "0, 255, 0",
                    "♡⸜(˶˃ ᵕ ˂˶)⸝♡",
                    locale.success,
                ),
                Err(UnsubscribeError::InvalidCode(code)) => {
                    info!(
                        target = "brezza::routing",
                        code = %code,
                        "rejected an invalid unsubscribe code"
                    );
                    (
                        StatusCode::BAD_REQUEST,
                        "255, 0, 0",
                        "(͠≖~≖  ͡ )",
                        locale.invalid_code,
                    )
                }
                Err(UnsubscribeError::Upstream(err)) => {
                    error!(
                        target = "brezza::routing",
                        error = %err,
                        "failed to redeem an unsubscribe code"
                    );
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "255, 128, 0",
                        "( ˶°ㅁ°) !!",
                        locale.on_server_error,
                    )
                }
            }
        };

        values.insert("StatusColor".to_string(), json!(color));
        values.insert("StatusEmoji".to_string(), json!(emoji));
        values.insert("StatusText".to_string(), json!(text));
        Ok(status)
    }
}
