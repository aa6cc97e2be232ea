//! `POST /api/v1/email/send-verification-code`, `POST /api/v1/email/verify`,
//! `GET /api/v1/email/is-in-verification` — the email-verification state
//! machine behind notification subscriptions.
//!
//! All three render the personal-page status partial. Retry and expiry
//! instants are surfaced to the page script as unix-millisecond `data-*`
//! attributes so the countdowns keep ticking client-side.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use serde_json::json;
use time::OffsetDateTime;
use tracing::warn;

use crate::application::collaborators::{TemplateMap, UserProfileLocale, VerificationWindow};
use crate::application::error::RouteError;
use crate::cache::CacheSetting;
use crate::routing::handlers::{format_published, user_profile_locale, STATUS_PARTIAL};
use crate::routing::{
    LangSetting, RequestContext, RouteDescriptor, RouteHandler, SegmentSet, Services,
};

fn email_descriptor(method: Method, pattern: &str) -> RouteDescriptor {
    RouteDescriptor {
        method,
        pattern: pattern.to_string(),
        composed: false,
        cache: CacheSetting::Disabled,
        cache_ttl: Duration::from_secs(5 * 60),
        lang: LangSetting::InReferer,
        templates: vec![STATUS_PARTIAL.to_string()],
        segments: SegmentSet::NONE,
    }
}

fn unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

fn data_attributes(pairs: &[(&str, String)]) -> String {
    pairs
        .iter()
        .map(|(name, value)| format!("data-{name}=\"{value}\""))
        .collect::<Vec<_>>()
        .join(" ")
}

fn retry_delay_message(locale: &UserProfileLocale, window: &VerificationWindow) -> String {
    locale
        .delay_til_verification
        .replace("{}", &format_published(window.retry_at))
}

pub struct SendVerificationCodeHandler {
    descriptor: RouteDescriptor,
}

impl SendVerificationCodeHandler {
    pub fn new() -> Self {
        Self {
            descriptor: email_descriptor(Method::POST, "/api/v1/email/send-verification-code"),
        }
    }
}

impl Default for SendVerificationCodeHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RouteHandler for SendVerificationCodeHandler {
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
        values.insert("StatusId".to_string(), json!("email-message"));
        values.insert("Status".to_string(), json!("Failed"));

        let email = ctx.form_value("email").unwrap_or("").trim().to_string();
        if email.is_empty() {
            values.insert("Message".to_string(), json!(locale.email_empty));
            return Ok(StatusCode::UNPROCESSABLE_ENTITY);
        }

        match services.mailer.mail_is_taken(&email).await {
            Ok(false) => {}
            Ok(true) => {
                values.insert("Message".to_string(), json!(locale.email_taken));
                return Ok(StatusCode::UNPROCESSABLE_ENTITY);
            }
            Err(err) => {
                warn!(
                    target = "brezza::routing",
                    error = %err,
                    "failed to check whether an email is taken"
                );
                values.insert(
                    "Message".to_string(),
                    json!(locale.verification_code_sending_error),
                );
                return Ok(StatusCode::UNPROCESSABLE_ENTITY);
            }
        }

        let window = services.mailer.verification_window(&ctx.client_ip).await;
        if !window.retry_allowed {
            values.insert(
                "Message".to_string(),
                json!(retry_delay_message(&locale, &window)),
            );
            values.insert(
                "DataAttributes".to_string(),
                json!(data_attributes(&[(
                    "striked-end-time",
                    unix_millis(window.retry_at).to_string(),
                )])),
            );
            return Ok(StatusCode::UNPROCESSABLE_ENTITY);
        }

        // A profile lookup failure is not fatal for sending a fresh code.
        match services.mailer.info(&ctx.client_ip).await {
            Ok(info) if info.email == email => {
                values.insert(
                    "Message".to_string(),
                    json!(locale.email_already_validated),
                );
                return Ok(StatusCode::UNPROCESSABLE_ENTITY);
            }
            Ok(_) => {}
            Err(err) => {
                warn!(
                    target = "brezza::routing",
                    error = %err,
                    "failed to read the subscriber profile"
                );
            }
        }

        if let Err(err) = services
            .mailer
            .send_verification_code(&ctx.client_ip, &email, lang)
            .await
        {
            warn!(
                target = "brezza::routing",
                error = %err,
                "failed to send a verification code"
            );
            values.insert(
                "Message".to_string(),
                json!(locale.verification_code_sending_error),
            );
            return Ok(StatusCode::UNPROCESSABLE_ENTITY);
        }

        let window = services.mailer.verification_window(&ctx.client_ip).await;
        values.insert("Status".to_string(), json!("OK"));
        values.insert("Message".to_string(), json!(locale.verification_code_sent));
        values.insert(
            "DataAttributes".to_string(),
            json!(data_attributes(&[
                (
                    "striked-end-time",
                    unix_millis(window.retry_at).to_string()
                ),
                (
                    "code-expiry-time",
                    unix_millis(window.code_expires_at).to_string()
                ),
            ])),
        );
        Ok(StatusCode::OK)
    }
}

pub struct VerifyCodeHandler {
    descriptor: RouteDescriptor,
}

impl VerifyCodeHandler {
    pub fn new() -> Self {
        Self {
            descriptor: email_descriptor(Method::POST, "/api/v1/email/verify"),
        }
    }
}

impl Default for VerifyCodeHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RouteHandler for VerifyCodeHandler {
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
        values.insert("StatusId".to_string(), json!("verification-message"));

        let code = ctx.form_value("code").unwrap_or("").trim();
        if code.is_empty() {
            values.insert("Status".to_string(), json!("Failed"));
            values.insert("Message".to_string(), json!(locale.verification_empty));
            return Ok(StatusCode::UNPROCESSABLE_ENTITY);
        }

        match services.mailer.verify(code, lang).await {
            Ok(()) => {
                values.insert("Status".to_string(), json!("OK"));
                values.insert("Message".to_string(), json!(locale.verification_success));
                values.insert(
                    "DataAttributes".to_string(),
                    json!(data_attributes(&[(
                        "hide-verification-panel",
                        String::new()
                    )])),
                );
                Ok(StatusCode::OK)
            }
            Err(err) => {
                warn!(
                    target = "brezza::routing",
                    error = %err,
                    "failed to verify an email code"
                );
                values.insert("Status".to_string(), json!("Failed"));
                values.insert("Message".to_string(), json!(locale.verification_failed));
                Ok(StatusCode::UNPROCESSABLE_ENTITY)
            }
        }
    }
}

pub struct OngoingVerificationHandler {
    descriptor: RouteDescriptor,
}

impl OngoingVerificationHandler {
    pub fn new() -> Self {
        Self {
            descriptor: email_descriptor(Method::GET, "/api/v1/email/is-in-verification"),
        }
    }
}

impl Default for OngoingVerificationHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RouteHandler for OngoingVerificationHandler {
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
        values.insert("StatusId".to_string(), json!("email-message"));

        let window = services.mailer.verification_window(&ctx.client_ip).await;
        let mut attributes = vec![(
            "code-expiry-time",
            unix_millis(window.code_expires_at).to_string(),
        )];

        if window.retry_allowed {
            values.insert("Status".to_string(), json!("OK"));
            values.insert("Message".to_string(), json!(""));
        } else {
            attributes.push(("striked-end-time", unix_millis(window.retry_at).to_string()));
            values.insert("Status".to_string(), json!("Neutral"));
            values.insert(
                "Message".to_string(),
                json!(retry_delay_message(&locale, &window)),
            );
        }
        values.insert(
            "DataAttributes".to_string(),
            json!(data_attributes(&attributes)),
        );
        Ok(StatusCode::OK)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn data_attributes_render_as_html_fragments() {
        let rendered = data_attributes(&[
            ("striked-end-time", "1714731630000".to_string()),
            ("hide-verification-panel", String::new()),
        ]);
        assert_eq!(
            rendered,
            "data-striked-end-time=\"1714731630000\" data-hide-verification-panel=\"\""
        );
    }

    #[test]
    fn retry_instants_convert_to_unix_milliseconds() {
        assert_eq!(unix_millis(datetime!(2024-05-03 10:20:30 UTC)), 1714731630000);
    }

    #[test]
    fn delay_message_substitutes_the_retry_time() {
        let locale = UserProfileLocale {
            delay_til_verification: "Retry after {}".to_string(),
            ..UserProfileLocale::default()
        };
        let window = VerificationWindow {
            retry_allowed: false,
            retry_at: datetime!(2024-05-03 10:20:30 +02:00),
            code_expires_at: datetime!(2024-05-03 10:35:30 +02:00),
        };
        assert_eq!(
            retry_delay_message(&locale, &window),
            "Retry after 2024-05-03 10:20:30 +02:00"
        );
    }
}
