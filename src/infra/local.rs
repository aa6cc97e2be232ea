//! Local filesystem adapters for the collaborator traits.
//!
//! These are development stand-ins: articles live as `<ref>.md` bodies with
//! `<ref>.json` front matter next to them, markdown passes through
//! untransformed, and templates are plain files with `{{Key}}` substitution.
//! Production deployments swap in real implementations behind the same
//! traits.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::collaborators::{
    ArticleListing, ArticleMeta, CollaboratorError, ContentStore, Locale, LocaleCatalog, Mailer,
    MarkdownRenderer, SubscriberInfo, SubscriptionKind, TemplateEngine, TemplateMap,
    UnsubscribeError, VerificationWindow,
};
use crate::config::LanguageSettings;

use super::InfraError;

const SOURCE: &str = "infra::local";

/// Articles on the local filesystem, laid out as `<root>/<lang>/<ref>.md`
/// plus `<root>/<lang>/<ref>.json`.
pub struct LocalContentStore {
    root: PathBuf,
}

impl LocalContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn read_meta(&self, stem: &Path) -> Result<ArticleMeta, CollaboratorError> {
        let raw = tokio::fs::read_to_string(stem.with_extension("json")).await?;
        serde_json::from_str(&raw).map_err(|err| {
            CollaboratorError::storage(format!(
                "invalid article metadata at '{}': {err}",
                stem.display()
            ))
        })
    }
}

#[async_trait]
impl ContentStore for LocalContentStore {
    async fn scan(&self, prefix: &str) -> Result<Vec<ArticleListing>, CollaboratorError> {
        // `en/` lists one language; `en/my-post.md` probes one article.
        let dir = match prefix.rsplit_once('/') {
            Some((dir, _)) => dir,
            None => "",
        };
        let dir_path = self.root.join(dir);
        if !dir_path.is_dir() {
            return Ok(Vec::new());
        }

        let mut listings = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.ends_with(".md") {
                continue;
            }
            let relative = if dir.is_empty() {
                name.to_string()
            } else {
                format!("{dir}/{name}")
            };
            if !relative.starts_with(prefix) {
                continue;
            }

            let stem = dir_path.join(name.trim_end_matches(".md"));
            match self.read_meta(&stem).await {
                Ok(meta) => listings.push(ArticleListing {
                    link: relative.clone(),
                    reference: name.trim_end_matches(".md").to_string(),
                    meta,
                }),
                Err(err) => {
                    warn!(
                        target = "brezza::infra",
                        source = SOURCE,
                        article = relative,
                        error = %err,
                        "skipping article with unreadable metadata"
                    );
                }
            }
        }
        listings.sort_by(|a, b| a.reference.cmp(&b.reference));
        Ok(listings)
    }

    async fn read_article(&self, name: &str) -> Result<(ArticleMeta, String), CollaboratorError> {
        let stem = self.root.join(name.trim_end_matches(".md"));
        let meta = self.read_meta(&stem).await?;
        let body = tokio::fs::read_to_string(stem.with_extension("md")).await?;
        Ok((meta, body))
    }
}

/// Pass-through markdown "renderer".
pub struct PlainMarkdown;

impl MarkdownRenderer for PlainMarkdown {
    fn to_html(&self, markdown: &str) -> Result<String, CollaboratorError> {
        Ok(markdown.to_string())
    }
}

/// Plain-file templates with `{{Key}}` substitution. Registered file sets
/// are concatenated in order; extra files are appended for one render.
pub struct SimpleTemplates {
    site_root: PathBuf,
    registered: Mutex<HashMap<String, Vec<String>>>,
}

impl SimpleTemplates {
    pub fn new(site_root: impl Into<PathBuf>) -> Self {
        Self {
            site_root: site_root.into(),
            registered: Mutex::new(HashMap::new()),
        }
    }

    fn read_files(&self, files: &[String]) -> Result<String, CollaboratorError> {
        let mut combined = String::new();
        for file in files {
            let path = self.site_root.join(file);
            match std::fs::read_to_string(&path) {
                Ok(content) => combined.push_str(&content),
                // Missing template files render as empty; the route's
                // `Output` fallback covers untemplated responses.
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    warn!(
                        target = "brezza::infra",
                        source = SOURCE,
                        file = %path.display(),
                        "template file missing, rendering without it"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(combined)
    }
}

impl TemplateEngine for SimpleTemplates {
    fn add(&self, name: &str, files: &[String]) -> Result<(), CollaboratorError> {
        let mut registered = match self.registered.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        registered.insert(name.to_string(), files.to_vec());
        Ok(())
    }

    fn render(
        &self,
        name: &str,
        values: &TemplateMap,
        extra: &[String],
    ) -> Result<Bytes, CollaboratorError> {
        let mut files = {
            let registered = match self.registered.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            registered
                .get(name)
                .cloned()
                .ok_or_else(|| CollaboratorError::template(format!("unknown template '{name}'")))?
        };
        files.extend_from_slice(extra);

        let mut rendered = self.read_files(&files)?;
        for (key, value) in values {
            let replacement = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            rendered = rendered.replace(&format!("{{{{{key}}}}}"), &replacement);
        }
        Ok(Bytes::from(rendered))
    }
}

const MAILER_RETRY_DELAY: Duration = Duration::from_secs(60);
const MAILER_CODE_TTL: Duration = Duration::from_secs(15 * 60);

struct PendingVerification {
    raw_id: String,
    email: String,
}

#[derive(Default)]
struct MailerState {
    subscribers: HashMap<String, SubscriberInfo>,
    pending: HashMap<String, PendingVerification>,
    /// Per client: (earliest retry instant, code expiry instant).
    windows: HashMap<String, (OffsetDateTime, OffsetDateTime)>,
    unsubscribe_codes: HashMap<String, String>,
}

/// In-memory mailer stand-in. There is no outbound channel: verification
/// codes are written to the log instead of emailed, and all state lives for
/// the process only.
pub struct InMemoryMailer {
    retry_delay: Duration,
    code_ttl: Duration,
    state: Mutex<MailerState>,
}

impl InMemoryMailer {
    pub fn new() -> Self {
        Self::with_windows(MAILER_RETRY_DELAY, MAILER_CODE_TTL)
    }

    pub fn with_windows(retry_delay: Duration, code_ttl: Duration) -> Self {
        Self {
            retry_delay,
            code_ttl,
            state: Mutex::new(MailerState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MailerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for InMemoryMailer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mailer for InMemoryMailer {
    async fn info(&self, raw_id: &str) -> Result<SubscriberInfo, CollaboratorError> {
        Ok(self
            .lock()
            .subscribers
            .get(raw_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn mail_is_taken(&self, email: &str) -> Result<bool, CollaboratorError> {
        Ok(self
            .lock()
            .subscribers
            .values()
            .any(|subscriber| subscriber.email == email))
    }

    async fn verification_window(&self, raw_id: &str) -> VerificationWindow {
        let now = OffsetDateTime::now_utc();
        match self.lock().windows.get(raw_id) {
            Some(&(retry_at, code_expires_at)) => VerificationWindow {
                retry_allowed: now >= retry_at,
                retry_at,
                code_expires_at,
            },
            None => VerificationWindow {
                retry_allowed: true,
                retry_at: now,
                code_expires_at: now,
            },
        }
    }

    async fn send_verification_code(
        &self,
        raw_id: &str,
        email: &str,
        lang: &str,
    ) -> Result<(), CollaboratorError> {
        let now = OffsetDateTime::now_utc();
        let code = Uuid::new_v4().to_string();

        let mut state = self.lock();
        state.pending.insert(
            code.clone(),
            PendingVerification {
                raw_id: raw_id.to_string(),
                email: email.to_string(),
            },
        );
        state.windows.insert(
            raw_id.to_string(),
            (now + self.retry_delay, now + self.code_ttl),
        );
        info!(
            target = "brezza::infra",
            source = SOURCE,
            code = %code,
            lang,
            "verification code issued (no outbound channel, read it here)"
        );
        Ok(())
    }

    async fn verify(&self, code: &str, _lang: &str) -> Result<(), CollaboratorError> {
        let mut state = self.lock();
        let pending = state
            .pending
            .remove(code)
            .ok_or_else(|| CollaboratorError::storage("unknown verification code"))?;

        let expired = state
            .windows
            .get(&pending.raw_id)
            .is_some_and(|&(_, expiry)| OffsetDateTime::now_utc() > expiry);
        if expired {
            return Err(CollaboratorError::storage("verification code expired"));
        }

        state
            .subscribers
            .entry(pending.raw_id.clone())
            .or_default()
            .email = pending.email;
        state
            .unsubscribe_codes
            .insert(Uuid::new_v4().to_string(), pending.raw_id);
        Ok(())
    }

    async fn subscribe(
        &self,
        raw_id: &str,
        kind: SubscriptionKind,
        tags: &[String],
    ) -> Result<(), CollaboratorError> {
        let mut state = self.lock();
        let subscriber = state.subscribers.entry(raw_id.to_string()).or_default();
        subscriber.kind = kind;
        subscriber.tags = tags.to_vec();
        Ok(())
    }

    async fn unsubscribe(&self, code: &str) -> Result<(), UnsubscribeError> {
        let mut state = self.lock();
        let raw_id = state
            .unsubscribe_codes
            .remove(code)
            .ok_or_else(|| UnsubscribeError::InvalidCode(code.to_string()))?;
        if let Some(subscriber) = state.subscribers.get_mut(&raw_id) {
            subscriber.kind = SubscriptionKind::None;
            subscriber.tags.clear();
        }
        Ok(())
    }
}

/// Load locale catalogs for the configured languages. A missing or invalid
/// locale file degrades to empty strings rather than refusing to boot.
pub fn load_locales(
    dir: &Path,
    languages: &[LanguageSettings],
) -> Result<LocaleCatalog, InfraError> {
    let mut catalog = LocaleCatalog::new();
    for language in languages {
        let path = dir.join(&language.locale_file);
        let locale = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|err| {
                InfraError::locale(format!("invalid locale file '{}': {err}", path.display()))
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    target = "brezza::infra",
                    source = SOURCE,
                    lang = language.name,
                    file = %path.display(),
                    "locale file missing, using empty strings"
                );
                Locale::default()
            }
            Err(err) => {
                return Err(InfraError::locale(format!(
                    "failed to read locale file '{}': {err}",
                    path.display()
                )));
            }
        };
        catalog.insert(language.name.clone(), locale);
    }
    Ok(catalog)
}
