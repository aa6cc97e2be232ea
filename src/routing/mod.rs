//! Route model: descriptors, the handler trait, and shared services.
//!
//! A route describes itself once through [`RouteDescriptor`] (method,
//! pattern, caching policy, language requirement, template files, fragment
//! capabilities) and the dispatch pipeline drives everything else off that
//! descriptor. Handlers fill a per-request [`TemplateMap`] and return a
//! status; template expansion, caching, and composition stay in the
//! pipeline.

pub mod handlers;
pub mod matcher;
pub mod registry;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};

use crate::application::collaborators::{
    ContentStore, LocaleCatalog, Mailer, MarkdownRenderer, TemplateEngine, TemplateMap,
};
use crate::application::error::RouteError;
use crate::cache::{CacheSetting, FragmentCache};
use crate::ledger::recorder::ViewRecorder;
use crate::ledger::InteractionLedger;

/// Shared collaborators handed to every render step.
pub struct Services {
    pub content: Arc<dyn ContentStore>,
    pub markdown: Arc<dyn MarkdownRenderer>,
    pub templates: Arc<dyn TemplateEngine>,
    pub mailer: Arc<dyn Mailer>,
    pub locales: LocaleCatalog,
    pub languages: Vec<String>,
    pub ledger: Arc<InteractionLedger>,
    pub views: Arc<ViewRecorder>,
    pub fragments: Arc<FragmentCache>,
}

/// The five named fragments a composed page is assembled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    Header,
    Body,
    Footer,
    TopEmbeds,
    BottomEmbeds,
}

impl Segment {
    pub const ALL: [Segment; 5] = [
        Segment::Header,
        Segment::Body,
        Segment::Footer,
        Segment::TopEmbeds,
        Segment::BottomEmbeds,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Segment::Header => "header",
            Segment::Body => "body",
            Segment::Footer => "footer",
            Segment::TopEmbeds => "top-embeds",
            Segment::BottomEmbeds => "bottom-embeds",
        }
    }

    pub fn parse(name: &str) -> Option<Segment> {
        Segment::ALL.into_iter().find(|s| s.as_str() == name)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which fragments a route actually renders. Requests for fragments outside
/// this set answer 204 without invoking the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentSet {
    pub header: bool,
    pub body: bool,
    pub footer: bool,
    pub top_embeds: bool,
    pub bottom_embeds: bool,
}

impl SegmentSet {
    pub const NONE: SegmentSet = SegmentSet {
        header: false,
        body: false,
        footer: false,
        top_embeds: false,
        bottom_embeds: false,
    };

    pub const HEADER_AND_BODY: SegmentSet = SegmentSet {
        header: true,
        body: true,
        footer: false,
        top_embeds: false,
        bottom_embeds: false,
    };

    pub fn contains(&self, segment: Segment) -> bool {
        match segment {
            Segment::Header => self.header,
            Segment::Body => self.body,
            Segment::Footer => self.footer,
            Segment::TopEmbeds => self.top_embeds,
            Segment::BottomEmbeds => self.bottom_embeds,
        }
    }
}

/// How a route expects the language to arrive, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LangSetting {
    NotRequired,
    /// First path segment carries the language code.
    InPath,
    /// Language arrives as the `lang` form or query field.
    InForm,
    /// Language is the first segment of the Referer path.
    InReferer,
}

/// Static self-description of one route.
#[derive(Debug, Clone)]
pub struct RouteDescriptor {
    pub method: Method,
    pub pattern: String,
    /// Composed routes render inside the shared layout and serve fragments;
    /// monolithic routes produce their whole response themselves.
    pub composed: bool,
    pub cache: CacheSetting,
    pub cache_ttl: Duration,
    pub lang: LangSetting,
    /// Template files injected when this route's content is expanded.
    pub templates: Vec<String>,
    pub segments: SegmentSet,
}

/// The Referer target a fragment request is reconstructed from.
#[derive(Debug, Clone, PartialEq)]
pub struct RefererPath {
    pub path: String,
    pub parts: Vec<String>,
    pub query: String,
}

/// Everything a handler may read about the request being dispatched.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub path: String,
    pub raw_query: String,
    pub params: HashMap<String, String>,
    pub query: HashMap<String, Vec<String>>,
    pub form: HashMap<String, String>,
    pub client_ip: String,
    pub referer: Option<RefererPath>,
}

impl RequestContext {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn query_first(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn query_all(&self, name: &str) -> &[String] {
        self.query.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn form_value(&self, name: &str) -> Option<&str> {
        self.form.get(name).map(String::as_str)
    }

    /// The Referer path split into segments, or a 400-mapped error when the
    /// header was absent or unparseable.
    pub fn referer(&self) -> Result<&RefererPath, RouteError> {
        self.referer
            .as_ref()
            .ok_or_else(|| RouteError::Validation("'Referer' header is empty".to_string()))
    }
}

#[async_trait]
pub trait RouteHandler: Send + Sync {
    fn descriptor(&self) -> &RouteDescriptor;

    /// Render the route's own content into `values`. Monolithic routes get
    /// their template expanded with the result afterwards; the `Output`
    /// value is used verbatim when expansion yields nothing.
    async fn render(
        &self,
        _ctx: &RequestContext,
        _services: &Services,
        _lang: &str,
        _values: &mut TemplateMap,
    ) -> Result<StatusCode, RouteError> {
        Ok(StatusCode::NO_CONTENT)
    }

    async fn render_header(
        &self,
        _ctx: &RequestContext,
        _services: &Services,
        _lang: &str,
        _values: &mut TemplateMap,
    ) -> Result<StatusCode, RouteError> {
        Ok(StatusCode::NO_CONTENT)
    }

    async fn render_body(
        &self,
        _ctx: &RequestContext,
        _services: &Services,
        _lang: &str,
        _values: &mut TemplateMap,
    ) -> Result<StatusCode, RouteError> {
        Ok(StatusCode::NO_CONTENT)
    }

    async fn render_footer(
        &self,
        _ctx: &RequestContext,
        _services: &Services,
        _lang: &str,
        _values: &mut TemplateMap,
    ) -> Result<StatusCode, RouteError> {
        Ok(StatusCode::NO_CONTENT)
    }

    async fn render_top_embeds(
        &self,
        _ctx: &RequestContext,
        _services: &Services,
        _lang: &str,
        _values: &mut TemplateMap,
    ) -> Result<StatusCode, RouteError> {
        Ok(StatusCode::NO_CONTENT)
    }

    async fn render_bottom_embeds(
        &self,
        _ctx: &RequestContext,
        _services: &Services,
        _lang: &str,
        _values: &mut TemplateMap,
    ) -> Result<StatusCode, RouteError> {
        Ok(StatusCode::NO_CONTENT)
    }

    /// Fragment dispatch by name; the pipeline calls this after checking the
    /// descriptor's [`SegmentSet`].
    async fn render_segment(
        &self,
        segment: Segment,
        ctx: &RequestContext,
        services: &Services,
        lang: &str,
        values: &mut TemplateMap,
    ) -> Result<StatusCode, RouteError> {
        match segment {
            Segment::Header => self.render_header(ctx, services, lang, values).await,
            Segment::Body => self.render_body(ctx, services, lang, values).await,
            Segment::Footer => self.render_footer(ctx, services, lang, values).await,
            Segment::TopEmbeds => self.render_top_embeds(ctx, services, lang, values).await,
            Segment::BottomEmbeds => self.render_bottom_embeds(ctx, services, lang, values).await,
        }
    }
}
