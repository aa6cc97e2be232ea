//! `GET /:lang/map` — every geolocated article of a language as map markers.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use serde_json::json;
use tracing::error;

use crate::application::collaborators::{ArticleListing, TemplateMap};
use crate::application::error::RouteError;
use crate::cache::CacheSetting;
use crate::routing::{
    LangSetting, RequestContext, RouteDescriptor, RouteHandler, SegmentSet, Services,
};

// Initial viewport center when no marker is focused.
const MAP_CENTER_LAT: f64 = 45.4507;
const MAP_CENTER_LONG: f64 = 68.8319;

pub struct MapHandler {
    descriptor: RouteDescriptor,
}

impl MapHandler {
    pub fn new() -> Self {
        Self {
            descriptor: RouteDescriptor {
                method: Method::GET,
                pattern: "/:lang/map".to_string(),
                composed: false,
                cache: CacheSetting::Disabled,
                cache_ttl: Duration::from_secs(5 * 60),
                lang: LangSetting::InPath,
                templates: vec!["views/pages/global-map.html".to_string()],
                segments: SegmentSet::NONE,
            },
        }
    }
}

impl Default for MapHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// "lat lon [area-meters]"; articles without at least two parts stay off the
/// map.
fn marker(lang: &str, listing: &ArticleListing) -> Option<serde_json::Value> {
    let mut parts = listing.meta.geolocation.split_whitespace();
    let lat = parts.next()?;
    let long = parts.next()?;
    let area = parts.next().unwrap_or_default();

    Some(json!({
        "Title": listing.meta.title,
        "PageLink": format!("/{lang}/blog/{}", listing.reference),
        "Lat": lat.parse::<f64>().unwrap_or_default(),
        "Long": long.parse::<f64>().unwrap_or_default(),
        "AccuracyMeters": area.parse::<i64>().unwrap_or_default(),
        "Thumbnail": listing.meta.thumbnail,
    }))
}

#[async_trait]
impl RouteHandler for MapHandler {
    fn descriptor(&self) -> &RouteDescriptor {
        &self.descriptor
    }

    async fn render(
        &self,
        _ctx: &RequestContext,
        services: &Services,
        lang: &str,
        values: &mut TemplateMap,
    ) -> Result<StatusCode, RouteError> {
        // An unreachable store still renders the page, just without markers.
        let (listings, status) = match services.content.scan(&format!("{lang}/")).await {
            Ok(listings) => (listings, StatusCode::OK),
            Err(err) => {
                error!(
                    target = "brezza::routing",
                    lang,
                    error = %err,
                    "failed to scan articles for the map page"
                );
                (Vec::new(), StatusCode::PARTIAL_CONTENT)
            }
        };

        let markers: Vec<_> = listings
            .iter()
            .filter_map(|listing| marker(lang, listing))
            .collect();

        values.insert("MapMarkers".to_string(), json!(markers));
        values.insert("MapLocationLat".to_string(), json!(MAP_CENTER_LAT));
        values.insert("MapLocationLong".to_string(), json!(MAP_CENTER_LONG));
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use crate::application::collaborators::ArticleMeta;

    use super::*;

    fn listing(geolocation: &str) -> ArticleListing {
        ArticleListing {
            link: "en/hike.md".to_string(),
            reference: "hike".to_string(),
            meta: ArticleMeta {
                title: "A Hike".to_string(),
                published_at: datetime!(2024-05-03 10:20:30 UTC),
                action_date: String::new(),
                short_description: String::new(),
                thumbnail: "hike.jpg".to_string(),
                tags: Vec::new(),
                geolocation: geolocation.to_string(),
            },
        }
    }

    #[test]
    fn geolocated_articles_become_markers() {
        let marker = marker("en", &listing("56.9496 24.1052 250")).expect("marker");
        assert_eq!(marker["PageLink"], "/en/blog/hike");
        assert_eq!(marker["Lat"], 56.9496);
        assert_eq!(marker["Long"], 24.1052);
        assert_eq!(marker["AccuracyMeters"], 250);
    }

    #[test]
    fn articles_without_coordinates_stay_off_the_map() {
        assert!(marker("en", &listing("")).is_none());
        assert!(marker("en", &listing("56.9496")).is_none());
        assert!(marker("en", &listing("56.9496 24.1052")).is_some());
    }
}
