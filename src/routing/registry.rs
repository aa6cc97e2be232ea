//! The route registry: the explicit, constructor-injected route table.
//!
//! Built once at startup from the full handler list. Composed routes are
//! additionally indexed in a [`PathMatcher`] so fragment requests can be
//! routed by their Referer path.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::http::Method;
use thiserror::Error;

use super::matcher::{PathMatcher, PatternError};
use super::RouteHandler;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("route {method} {pattern} registered twice")]
    Duplicate { method: Method, pattern: String },
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

pub struct RouteRegistry {
    routes: Vec<Arc<dyn RouteHandler>>,
    composed: HashMap<String, usize>,
    matcher: PathMatcher,
}

impl RouteRegistry {
    pub fn new(routes: Vec<Arc<dyn RouteHandler>>) -> Result<Self, RegistryError> {
        let mut seen: HashSet<(Method, String)> = HashSet::new();
        let mut composed = HashMap::new();
        let mut matcher = PathMatcher::new();

        for (index, route) in routes.iter().enumerate() {
            let descriptor = route.descriptor();
            let key = (descriptor.method.clone(), descriptor.pattern.clone());
            if !seen.insert(key) {
                return Err(RegistryError::Duplicate {
                    method: descriptor.method.clone(),
                    pattern: descriptor.pattern.clone(),
                });
            }
            if descriptor.composed {
                matcher.add(&descriptor.pattern)?;
                composed.insert(descriptor.pattern.clone(), index);
            }
        }

        Ok(Self {
            routes,
            composed,
            matcher,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn RouteHandler>> {
        self.routes.iter()
    }

    /// Resolve a composed route from a concrete path (typically taken from a
    /// fragment request's Referer), binding its path parameters.
    pub fn match_composed(
        &self,
        path: &str,
    ) -> Option<(Arc<dyn RouteHandler>, HashMap<String, String>)> {
        let hit = self.matcher.match_path(path)?;
        let index = *self.composed.get(&hit.pattern)?;
        Some((self.routes[index].clone(), hit.params))
    }
}
