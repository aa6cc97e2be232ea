//! Trait seams for the external collaborators of the dispatch core.
//!
//! The object-storage client, markdown renderer, and template engine are
//! integrations owned by other teams; the pipeline only ever sees these
//! traits. `infra::local` provides minimal filesystem-backed adapters so the
//! binary boots without them.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

/// Key-value bag handed to every render step and expanded by the template
/// engine. Render steps only ever insert; the map is fresh per request.
pub type TemplateMap = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("storage error: {message}")]
    Storage { message: String },
    #[error("markdown rendering failed: {message}")]
    Markdown { message: String },
    #[error("template error: {message}")]
    Template { message: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CollaboratorError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn markdown(message: impl Into<String>) -> Self {
        Self::Markdown {
            message: message.into(),
        }
    }

    pub fn template(message: impl Into<String>) -> Self {
        Self::Template {
            message: message.into(),
        }
    }
}

/// Front-matter metadata of one stored article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleMeta {
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub published_at: OffsetDateTime,
    #[serde(default)]
    pub action_date: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// "lat lon [area-meters]", space separated, as authored.
    #[serde(default)]
    pub geolocation: String,
}

/// One article as listed by the content store.
#[derive(Debug, Clone)]
pub struct ArticleListing {
    /// Public link to the article, e.g. `/en/blog/my-post`.
    pub link: String,
    /// Page reference: the storage file stem, no extension.
    pub reference: String,
    pub meta: ArticleMeta,
}

/// Read access to the blog content bucket.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// List articles whose storage name starts with `prefix`
    /// (e.g. `"en/"` for one language, `"en/my-post.md"` for one article).
    async fn scan(&self, prefix: &str) -> Result<Vec<ArticleListing>, CollaboratorError>;

    /// Read one article's front matter and markdown body by storage name.
    async fn read_article(&self, name: &str) -> Result<(ArticleMeta, String), CollaboratorError>;
}

/// Markdown to HTML conversion, including any custom block extensions.
pub trait MarkdownRenderer: Send + Sync {
    fn to_html(&self, markdown: &str) -> Result<String, CollaboratorError>;
}

/// What a subscriber wants to be notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriptionKind {
    #[default]
    None,
    All,
    Specific,
}

impl SubscriptionKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "none" => Some(Self::None),
            "all" => Some(Self::All),
            "specific" => Some(Self::Specific),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::All => "all",
            Self::Specific => "specific",
        }
    }
}

/// Everything the mailer knows about one client.
#[derive(Debug, Clone, Default)]
pub struct SubscriberInfo {
    /// Verified address, empty when the client never completed verification.
    pub email: String,
    pub kind: SubscriptionKind,
    pub tags: Vec<String>,
}

/// Retry and expiry state of a client's ongoing email verification.
#[derive(Debug, Clone, Copy)]
pub struct VerificationWindow {
    pub retry_allowed: bool,
    pub retry_at: OffsetDateTime,
    pub code_expires_at: OffsetDateTime,
}

#[derive(Debug, Error)]
pub enum UnsubscribeError {
    /// The code is wrong or already spent; the client's fault.
    #[error("invalid unsubscribe code: {0}")]
    InvalidCode(String),
    #[error(transparent)]
    Upstream(#[from] CollaboratorError),
}

/// The notification-subscription service. Owns its own client identities and
/// the outbound email channel; this side only ever drives the state machine.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn info(&self, raw_id: &str) -> Result<SubscriberInfo, CollaboratorError>;

    async fn mail_is_taken(&self, email: &str) -> Result<bool, CollaboratorError>;

    async fn verification_window(&self, raw_id: &str) -> VerificationWindow;

    /// Issue a verification code and send it to `email` in the client's
    /// language.
    async fn send_verification_code(
        &self,
        raw_id: &str,
        email: &str,
        lang: &str,
    ) -> Result<(), CollaboratorError>;

    /// Redeem a verification code, binding the pending address.
    async fn verify(&self, code: &str, lang: &str) -> Result<(), CollaboratorError>;

    async fn subscribe(
        &self,
        raw_id: &str,
        kind: SubscriptionKind,
        tags: &[String],
    ) -> Result<(), CollaboratorError>;

    /// Redeem an unsubscribe code from a notification email.
    async fn unsubscribe(&self, code: &str) -> Result<(), UnsubscribeError>;
}

/// Named template sets expanded into bytes.
pub trait TemplateEngine: Send + Sync {
    /// Register a named template assembled from the given files. Called only
    /// during startup registration.
    fn add(&self, name: &str, files: &[String]) -> Result<(), CollaboratorError>;

    /// Expand the named template with `values`, injecting `extra` files into
    /// the set for this render only.
    fn render(
        &self,
        name: &str,
        values: &TemplateMap,
        extra: &[String],
    ) -> Result<Bytes, CollaboratorError>;
}

/// Localized strings for one language, loaded by the configuration layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Locale {
    #[serde(default)]
    pub home_header: String,
    #[serde(default)]
    pub catalogue_header: String,
    #[serde(default)]
    pub language_pick_header: String,
    #[serde(default)]
    pub user_profile: UserProfileLocale,
    #[serde(default)]
    pub unsubscribe: UnsubscribeLocale,
}

/// Strings for the profile page and the subscription/verification endpoints.
/// `delay_til_verification` carries a `{}` placeholder for the retry time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfileLocale {
    pub header: String,
    pub subscribe_invalid_type: String,
    pub failed_to_subscribe: String,
    pub subscribed_successfully: String,
    pub email_empty: String,
    pub email_taken: String,
    pub email_already_validated: String,
    pub verification_code_sending_error: String,
    pub verification_code_sent: String,
    pub delay_til_verification: String,
    pub verification_empty: String,
    pub verification_failed: String,
    pub verification_success: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UnsubscribeLocale {
    pub unset_code: String,
    pub invalid_code: String,
    pub on_server_error: String,
    pub success: String,
}

pub type LocaleCatalog = HashMap<String, Locale>;
