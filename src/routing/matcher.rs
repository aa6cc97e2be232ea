//! Pattern matching for referer-derived paths.
//!
//! Patterns use the route syntax `/:name` for a parameter segment, with an
//! optional exact-length constraint `/:name<len(2)>`. Matching is segment by
//! segment; when several patterns match a path, a static segment outranks a
//! parameter at the first differing position, and registration order breaks
//! ties.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PatternError {
    #[error("invalid route pattern {pattern:?}: {reason}")]
    Invalid { pattern: String, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Static(String),
    Param { name: String, len: Option<usize> },
}

#[derive(Debug, Clone)]
struct ParsedPattern {
    raw: String,
    tokens: Vec<Token>,
}

/// The result of matching a concrete path against the registered patterns.
#[derive(Debug, Clone, PartialEq)]
pub struct PathMatch {
    pub pattern: String,
    pub params: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct PathMatcher {
    patterns: Vec<ParsedPattern>,
}

impl PathMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pattern: &str) -> Result<(), PatternError> {
        let tokens = parse_pattern(pattern)?;
        self.patterns.push(ParsedPattern {
            raw: pattern.to_string(),
            tokens,
        });
        Ok(())
    }

    /// Match a path, returning the winning pattern and its bound parameters.
    pub fn match_path(&self, path: &str) -> Option<PathMatch> {
        let segments: Vec<&str> = path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        let mut best: Option<&ParsedPattern> = None;
        for candidate in &self.patterns {
            if !matches_segments(&candidate.tokens, &segments) {
                continue;
            }
            best = Some(match best {
                None => candidate,
                // Strict win required, so earlier registration keeps ties.
                Some(current) if outranks(&candidate.tokens, &current.tokens) => candidate,
                Some(current) => current,
            });
        }

        best.map(|pattern| {
            let mut params = HashMap::new();
            for (token, segment) in pattern.tokens.iter().zip(&segments) {
                if let Token::Param { name, .. } = token {
                    params.insert(name.clone(), (*segment).to_string());
                }
            }
            PathMatch {
                pattern: pattern.raw.clone(),
                params,
            }
        })
    }
}

fn parse_pattern(pattern: &str) -> Result<Vec<Token>, PatternError> {
    let invalid = |reason: &str| PatternError::Invalid {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    if !pattern.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }

    let mut tokens = Vec::new();
    for segment in pattern.trim_matches('/').split('/') {
        if segment.is_empty() {
            if pattern.trim_matches('/').is_empty() {
                break;
            }
            return Err(invalid("empty segment"));
        }
        if let Some(rest) = segment.strip_prefix(':') {
            let (name, len) = match rest.split_once('<') {
                None => (rest, None),
                Some((name, constraint)) => {
                    let digits = constraint
                        .strip_prefix("len(")
                        .and_then(|c| c.strip_suffix(")>"))
                        .ok_or_else(|| invalid("constraint must be <len(N)>"))?;
                    let len: usize = digits
                        .parse()
                        .map_err(|_| invalid("constraint length must be a number"))?;
                    (name, Some(len))
                }
            };
            if name.is_empty() {
                return Err(invalid("parameter needs a name"));
            }
            tokens.push(Token::Param {
                name: name.to_string(),
                len,
            });
        } else {
            tokens.push(Token::Static(segment.to_string()));
        }
    }
    Ok(tokens)
}

fn matches_segments(tokens: &[Token], segments: &[&str]) -> bool {
    if tokens.len() != segments.len() {
        return false;
    }
    tokens.iter().zip(segments).all(|(token, segment)| {
        match token {
            Token::Static(value) => value == segment,
            Token::Param { len: Some(len), .. } => segment.chars().count() == *len,
            Token::Param { len: None, .. } => true,
        }
    })
}

/// Position-by-position precedence: the first position where the kinds
/// differ decides, static beating param.
fn outranks(candidate: &[Token], current: &[Token]) -> bool {
    for (a, b) in candidate.iter().zip(current) {
        match (a, b) {
            (Token::Static(_), Token::Param { .. }) => return true,
            (Token::Param { .. }, Token::Static(_)) => return false,
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(patterns: &[&str]) -> PathMatcher {
        let mut matcher = PathMatcher::new();
        for pattern in patterns {
            matcher.add(pattern).expect("pattern parses");
        }
        matcher
    }

    #[test]
    fn static_and_param_segments_bind() {
        let matcher = matcher(&["/:lang<len(2)>/blog/:title"]);
        let hit = matcher.match_path("/en/blog/first-post").expect("match");
        assert_eq!(hit.pattern, "/:lang<len(2)>/blog/:title");
        assert_eq!(hit.params["lang"], "en");
        assert_eq!(hit.params["title"], "first-post");
    }

    #[test]
    fn length_constraint_filters() {
        let matcher = matcher(&["/:lang<len(2)>"]);
        assert!(matcher.match_path("/en").is_some());
        assert!(matcher.match_path("/eng").is_none());
    }

    #[test]
    fn static_outranks_param_at_first_difference() {
        let matcher = matcher(&["/:lang<len(2)>/blog", "/en/blog"]);
        let hit = matcher.match_path("/en/blog").expect("match");
        assert_eq!(hit.pattern, "/en/blog");
        let other = matcher.match_path("/it/blog").expect("match");
        assert_eq!(other.pattern, "/:lang<len(2)>/blog");
    }

    #[test]
    fn registration_order_breaks_ties() {
        let matcher = matcher(&["/:a/blog", "/:b/blog"]);
        let hit = matcher.match_path("/en/blog").expect("match");
        assert_eq!(hit.pattern, "/:a/blog");
    }

    #[test]
    fn segment_count_must_agree() {
        let matcher = matcher(&["/:lang<len(2)>/blog"]);
        assert!(matcher.match_path("/en").is_none());
        assert!(matcher.match_path("/en/blog/extra").is_none());
    }

    #[test]
    fn root_pattern_matches_root_only() {
        let matcher = matcher(&["/"]);
        assert!(matcher.match_path("/").is_some());
        assert!(matcher.match_path("/en").is_none());
    }

    #[test]
    fn trailing_slash_is_irrelevant() {
        let matcher = matcher(&["/:lang<len(2)>/blog"]);
        assert!(matcher.match_path("/en/blog/").is_some());
    }

    #[test]
    fn malformed_constraints_are_rejected() {
        let mut matcher = PathMatcher::new();
        assert!(matcher.add("/:lang<len(two)>").is_err());
        assert!(matcher.add("/:lang<size(2)>").is_err());
        assert!(matcher.add("no-leading-slash").is_err());
        assert!(matcher.add("/:<len(2)>").is_err());
    }
}
