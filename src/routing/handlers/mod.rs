//! The concrete route set.

mod article;
mod catalogue;
mod home;
mod language_pick;
mod likes;
mod map_page;
mod search;
mod subscription;
mod timezone;
mod unsubscribe;
mod user_page;
mod verification;

use std::sync::Arc;

use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

pub use article::ArticleHandler;
pub use catalogue::CatalogueHandler;
pub use home::HomeHandler;
pub use language_pick::LanguagePickHandler;
pub use likes::{LikeStatusHandler, LikeToggleHandler};
pub use map_page::MapHandler;
pub use search::BlogSearchHandler;
pub use subscription::SubscribeHandler;
pub use timezone::TimezoneHandler;
pub use unsubscribe::UnsubscribeHandler;
pub use user_page::UserHandler;
pub use verification::{OngoingVerificationHandler, SendVerificationCodeHandler, VerifyCodeHandler};

use super::{RouteHandler, Services};
use crate::application::collaborators::UserProfileLocale;

/// Every route the server exposes, in registration order.
pub fn all() -> Vec<Arc<dyn RouteHandler>> {
    vec![
        Arc::new(LanguagePickHandler::new()),
        Arc::new(HomeHandler::new()),
        Arc::new(CatalogueHandler::new()),
        Arc::new(ArticleHandler::new()),
        Arc::new(MapHandler::new()),
        Arc::new(UserHandler::new()),
        Arc::new(UnsubscribeHandler::new()),
        Arc::new(LikeStatusHandler::new()),
        Arc::new(LikeToggleHandler::new()),
        Arc::new(BlogSearchHandler::new()),
        Arc::new(SubscribeHandler::new()),
        Arc::new(SendVerificationCodeHandler::new()),
        Arc::new(VerifyCodeHandler::new()),
        Arc::new(OngoingVerificationHandler::new()),
        Arc::new(TimezoneHandler::new()),
    ]
}

/// Status partial shared by the subscription and verification endpoints.
pub(crate) const STATUS_PARTIAL: &str = "views/partials/personal-page-status.html";

pub(crate) fn user_profile_locale(services: &Services, lang: &str) -> UserProfileLocale {
    services
        .locales
        .get(lang)
        .map(|locale| locale.user_profile.clone())
        .unwrap_or_default()
}

/// Publication timestamps render as `2024-05-03 10:20:30 +02:00`.
const PUBLISHED_FORMAT: &[FormatItem<'_>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second] [offset_hour sign:mandatory]:[offset_minute]"
);

pub(crate) fn format_published(at: OffsetDateTime) -> String {
    at.format(&PUBLISHED_FORMAT).unwrap_or_default()
}

pub(crate) fn parse_published(raw: &str) -> Result<OffsetDateTime, time::error::Parse> {
    OffsetDateTime::parse(raw, &PUBLISHED_FORMAT)
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn published_format_carries_the_offset() {
        let formatted = format_published(datetime!(2024-05-03 10:20:30 +02:00));
        assert_eq!(formatted, "2024-05-03 10:20:30 +02:00");
    }

    #[test]
    fn route_set_has_no_duplicates() {
        let registry = crate::routing::registry::RouteRegistry::new(all());
        assert!(registry.is_ok());
    }
}
