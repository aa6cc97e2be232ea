//! `GET /api/v1/tz` — reformat a timestamp in a requested UTC offset.
//!
//! Untemplated: the converted timestamp is the whole response body. The
//! `tz` query carries an offset like `+02:00`; anything unparseable falls
//! back to UTC rather than failing the request.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tracing::warn;

use crate::application::collaborators::TemplateMap;
use crate::application::error::RouteError;
use crate::cache::CacheSetting;
use crate::routing::handlers::{format_published, parse_published};
use crate::routing::{
    LangSetting, RequestContext, RouteDescriptor, RouteHandler, SegmentSet, Services,
};

const OFFSET_FORMAT: &[FormatItem<'_>] =
    format_description!("[offset_hour sign:mandatory]:[offset_minute]");

pub struct TimezoneHandler {
    descriptor: RouteDescriptor,
}

impl TimezoneHandler {
    pub fn new() -> Self {
        Self {
            descriptor: RouteDescriptor {
                method: Method::GET,
                pattern: "/api/v1/tz".to_string(),
                composed: false,
                cache: CacheSetting::Disabled,
                cache_ttl: Duration::from_secs(5 * 60),
                lang: LangSetting::NotRequired,
                templates: Vec::new(),
                segments: SegmentSet::NONE,
            },
        }
    }
}

impl Default for TimezoneHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, RouteError> {
    parse_published(raw)
        .or_else(|_| OffsetDateTime::parse(raw, &Rfc3339))
        .map_err(|_| RouteError::Validation(format!("invalid timestamp format for '{raw}'")))
}

fn parse_offset(raw: &str) -> UtcOffset {
    match UtcOffset::parse(raw, &OFFSET_FORMAT) {
        Ok(offset) => offset,
        Err(err) => {
            warn!(
                target = "brezza::routing",
                tz = raw,
                error = %err,
                "unparseable tz offset, answering in UTC"
            );
            UtcOffset::UTC
        }
    }
}

#[async_trait]
impl RouteHandler for TimezoneHandler {
    fn descriptor(&self) -> &RouteDescriptor {
        &self.descriptor
    }

    async fn render(
        &self,
        ctx: &RequestContext,
        _services: &Services,
        _lang: &str,
        values: &mut TemplateMap,
    ) -> Result<StatusCode, RouteError> {
        let at = parse_timestamp(ctx.query_first("timestamp").unwrap_or(""))?;
        let offset = match ctx.query_first("tz") {
            Some(tz) if !tz.is_empty() => parse_offset(tz),
            _ => UtcOffset::UTC,
        };

        values.insert(
            "Output".to_string(),
            json!(format_published(at.to_offset(offset))),
        );
        Ok(StatusCode::OK)
    }
}
