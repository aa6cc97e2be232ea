//! Request dispatch: composed pages, monolithic routes, and page fragments.
//!
//! Every request follows the same stations: resolve the language the route
//! demands, find the route (fragments recover theirs from the Referer),
//! consult the fragment cache, render, compose templates, queue the result
//! for cache admission, respond. Handlers only ever see a [`RequestContext`]
//! and a fresh template map.

pub mod referer;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{to_bytes, Body};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, on, MethodFilter};
use axum::Router;
use bytes::Bytes;
use serde_json::json;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::application::collaborators::{CollaboratorError, TemplateMap};
use crate::application::error::{plain_text_response, RouteError};
use crate::cache::{fragment_key, FULL_SEGMENT};
use crate::routing::registry::RouteRegistry;
use crate::routing::{
    LangSetting, RequestContext, RouteDescriptor, RouteHandler, Segment, Services,
};

const SOURCE: &str = "pipeline";
const GENERAL_PAGE: &str = "general-page";
const FORM_BODY_LIMIT: usize = 64 * 1024;

#[derive(Clone)]
pub struct PipelineState {
    pub services: Arc<Services>,
    pub registry: Arc<RouteRegistry>,
}

/// Register the layout, the per-segment partials, and every route's own
/// template set with the engine. Runs once at startup.
pub fn register_templates(
    services: &Services,
    registry: &RouteRegistry,
) -> Result<(), CollaboratorError> {
    services.templates.add(
        GENERAL_PAGE,
        &[format!("views/layouts/{GENERAL_PAGE}.html")],
    )?;
    for segment in Segment::ALL {
        services.templates.add(
            &format!("{GENERAL_PAGE}-{segment}"),
            &[format!("views/partials/{GENERAL_PAGE}-{segment}.html")],
        )?;
    }
    for route in registry.iter() {
        let descriptor = route.descriptor();
        services
            .templates
            .add(&template_name(descriptor), &descriptor.templates)?;
    }
    Ok(())
}

/// Assemble the axum router from the registry.
pub fn build_router(state: PipelineState) -> Router {
    let mut router = Router::<PipelineState>::new();
    for route in state.registry.iter() {
        let path = axum_path(&route.descriptor().pattern);
        let filter = method_filter(&route.descriptor().method);
        let bound_route = route.clone();
        let handler = move |State(state): State<PipelineState>,
                            params: Option<Path<HashMap<String, String>>>,
                            request: Request<Body>| async move {
            let params = params.map(|Path(params)| params).unwrap_or_default();
            dispatch_route(state, bound_route, params, request).await
        };
        router = router.route(&path, on(filter, handler));
    }
    router
        .route("/api/v1/general-page/{segment}", get(dispatch_fragment))
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
        .with_state(state)
}

/// One template per route, named by its method and pattern.
fn template_name(descriptor: &RouteDescriptor) -> String {
    format!("{} {}", descriptor.method, descriptor.pattern)
}

/// Translate the route pattern grammar into axum's capture syntax.
fn axum_path(pattern: &str) -> String {
    let trimmed = pattern.trim_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    let mut out = String::new();
    for segment in trimmed.split('/') {
        out.push('/');
        match segment.strip_prefix(':') {
            Some(rest) => {
                let name = rest.split_once('<').map_or(rest, |(name, _)| name);
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
            None => out.push_str(segment),
        }
    }
    out
}

fn method_filter(method: &Method) -> MethodFilter {
    if *method == Method::PUT {
        MethodFilter::PUT
    } else if *method == Method::POST {
        MethodFilter::POST
    } else if *method == Method::DELETE {
        MethodFilter::DELETE
    } else {
        MethodFilter::GET
    }
}

async fn dispatch_route(
    state: PipelineState,
    route: Arc<dyn RouteHandler>,
    params: HashMap<String, String>,
    request: Request<Body>,
) -> Response {
    let services = state.services.clone();
    let descriptor = route.descriptor().clone();
    let (parts, body) = request.into_parts();
    let raw_query = parts.uri.query().unwrap_or("").to_string();

    let ctx = RequestContext {
        path: parts.uri.path().to_string(),
        query: parse_query(&raw_query),
        raw_query,
        params,
        form: read_form(&parts.headers, &parts.method, body).await,
        client_ip: client_ip(&parts.headers),
        referer: referer::parse_referer(&parts.headers).ok(),
    };

    let lang = match resolve_lang(&services, &ctx, descriptor.lang) {
        Ok(lang) => lang,
        Err(err) => return error_response(&descriptor, &ctx, err),
    };

    if descriptor.composed {
        compose_full_page(&services, &descriptor, &ctx, &lang).await
    } else {
        render_monolithic(&services, route.as_ref(), &descriptor, &ctx, &lang).await
    }
}

/// A composed route's full-page response is the shared layout; the client
/// pulls the route's fragments through the fragment endpoint afterwards.
async fn compose_full_page(
    services: &Services,
    descriptor: &RouteDescriptor,
    ctx: &RequestContext,
    lang: &str,
) -> Response {
    let key = fragment_key(
        descriptor.cache,
        &descriptor.method,
        FULL_SEGMENT,
        &ctx.path,
        &ctx.raw_query,
    );
    if let Some(key) = &key {
        if let Some(cached) = services.fragments.get(key) {
            return html_response(StatusCode::OK, cached);
        }
    }

    let values = seeded_values(services, lang, ctx);
    match services.templates.render(GENERAL_PAGE, &values, &[]) {
        Ok(content) => {
            if let Some(key) = key {
                services.fragments.set_with_ttl(
                    key,
                    content.clone(),
                    content.len() as u64,
                    descriptor.cache_ttl,
                    StatusCode::OK.as_u16(),
                );
            }
            html_response(StatusCode::OK, content)
        }
        Err(err) => compose_failure(descriptor, ctx, None, err),
    }
}

async fn render_monolithic(
    services: &Services,
    route: &dyn RouteHandler,
    descriptor: &RouteDescriptor,
    ctx: &RequestContext,
    lang: &str,
) -> Response {
    let key = fragment_key(
        descriptor.cache,
        &descriptor.method,
        FULL_SEGMENT,
        &ctx.path,
        &ctx.raw_query,
    );
    if let Some(key) = &key {
        if let Some(cached) = services.fragments.get(key) {
            return html_response(StatusCode::OK, cached);
        }
    }

    let mut values = seeded_values(services, lang, ctx);
    let status = match route.render(ctx, services, lang, &mut values).await {
        Ok(status) => status,
        Err(err) => return error_response(descriptor, ctx, err),
    };

    let content = match services
        .templates
        .render(&template_name(descriptor), &values, &[])
    {
        Ok(content) => content,
        Err(err) => return compose_failure(descriptor, ctx, None, err),
    };
    // Untemplated routes may hand their body over directly.
    let content = if content.is_empty() {
        values
            .get("Output")
            .and_then(|value| value.as_str())
            .map(|output| Bytes::from(output.to_string()))
            .unwrap_or(content)
    } else {
        content
    };

    if status.is_success() {
        if let Some(key) = key {
            services.fragments.set_with_ttl(
                key,
                content.clone(),
                content.len() as u64,
                descriptor.cache_ttl,
                status.as_u16(),
            );
        }
    }
    html_response(status, content)
}

async fn dispatch_fragment(
    State(state): State<PipelineState>,
    Path(segment): Path<String>,
    request: Request<Body>,
) -> Response {
    let services = state.services.clone();
    let Some(segment) = Segment::parse(&segment) else {
        return plain_text_response(
            StatusCode::BAD_REQUEST,
            format!("unknown segment '{segment}'"),
        );
    };

    let (parts, body) = request.into_parts();
    let referer = match referer::parse_referer(&parts.headers) {
        Ok(referer) => referer,
        Err(err) => return plain_text_response(err.status_code(), err.public_message()),
    };

    let Some((route, params)) = state.registry.match_composed(&referer.path) else {
        return plain_text_response(
            StatusCode::NOT_FOUND,
            format!(
                "fail to get templated page for 'GET {}': not found",
                referer.path
            ),
        );
    };
    let descriptor = route.descriptor().clone();

    let ctx = RequestContext {
        path: referer.path.clone(),
        raw_query: referer.query.clone(),
        params,
        query: parse_query(&referer.query),
        form: read_form(&parts.headers, &parts.method, body).await,
        client_ip: client_ip(&parts.headers),
        referer: Some(referer),
    };

    let lang = match resolve_lang(&services, &ctx, fragment_lang_setting(descriptor.lang)) {
        Ok(lang) => lang,
        Err(err) => return error_response(&descriptor, &ctx, err),
    };

    if !descriptor.segments.contains(segment) {
        return StatusCode::NO_CONTENT.into_response();
    }

    let key = fragment_key(
        descriptor.cache,
        &descriptor.method,
        segment.as_str(),
        &ctx.path,
        &ctx.raw_query,
    );
    if let Some(key) = &key {
        if let Some(cached) = services.fragments.get(key) {
            return html_response(StatusCode::OK, cached);
        }
    }

    let mut values = seeded_values(&services, &lang, &ctx);
    let status = match route
        .render_segment(segment, &ctx, &services, &lang, &mut values)
        .await
    {
        Ok(status) => status,
        Err(err) => return error_response(&descriptor, &ctx, err),
    };

    let content = match services.templates.render(
        &format!("{GENERAL_PAGE}-{segment}"),
        &values,
        &descriptor.templates,
    ) {
        Ok(content) => content,
        Err(err) => return compose_failure(&descriptor, &ctx, Some(segment), err),
    };

    if status.is_success() {
        if let Some(key) = key {
            services.fragments.set_with_ttl(
                key,
                content.clone(),
                content.len() as u64,
                descriptor.cache_ttl,
                status.as_u16(),
            );
        }
    }
    html_response(status, content)
}

/// Fragments read the language from the Referer path even for `InPath`
/// routes, since their own path carries only the segment name.
fn fragment_lang_setting(setting: LangSetting) -> LangSetting {
    match setting {
        LangSetting::InPath => LangSetting::InReferer,
        other => other,
    }
}

fn resolve_lang(
    services: &Services,
    ctx: &RequestContext,
    setting: LangSetting,
) -> Result<String, RouteError> {
    let lang = match setting {
        LangSetting::NotRequired => return Ok(String::new()),
        LangSetting::InPath => ctx
            .path
            .trim_matches('/')
            .split('/')
            .next()
            .filter(|part| part.chars().count() == 2)
            .unwrap_or("")
            .to_string(),
        LangSetting::InForm => ctx
            .form_value("lang")
            .or_else(|| ctx.query_first("lang"))
            .unwrap_or("")
            .to_string(),
        LangSetting::InReferer => ctx
            .referer()?
            .parts
            .first()
            .cloned()
            .unwrap_or_default(),
    };

    if services.languages.iter().any(|known| *known == lang) {
        Ok(lang)
    } else {
        Err(RouteError::Validation(format!(
            "lang value is invalid: '{lang}' is not considered an available language"
        )))
    }
}

/// Fresh per-request template values: locale, language, trimmed path, query.
fn seeded_values(services: &Services, lang: &str, ctx: &RequestContext) -> TemplateMap {
    let locale = services.locales.get(lang).cloned().unwrap_or_default();
    let mut values = TemplateMap::new();
    values.insert(
        "L".to_string(),
        serde_json::to_value(&locale).unwrap_or_default(),
    );
    values.insert("Lang".to_string(), json!(lang));
    values.insert("Path".to_string(), json!(ctx.path.trim_matches('/')));
    values.insert("QueryString".to_string(), json!(ctx.raw_query));
    values
}

fn error_response(descriptor: &RouteDescriptor, ctx: &RequestContext, err: RouteError) -> Response {
    let status = err.status_code();
    if status.is_server_error() {
        error!(
            target = "brezza::pipeline",
            source = SOURCE,
            status = status.as_u16(),
            method = %descriptor.method,
            path = %ctx.path,
            query = %ctx.raw_query,
            error = %err,
            "failed to finish rendering a page"
        );
    }
    plain_text_response(status, err.public_message())
}

fn compose_failure(
    descriptor: &RouteDescriptor,
    ctx: &RequestContext,
    segment: Option<Segment>,
    err: CollaboratorError,
) -> Response {
    error!(
        target = "brezza::pipeline",
        source = SOURCE,
        method = %descriptor.method,
        path = %ctx.path,
        query = %ctx.raw_query,
        segment = segment.map(Segment::as_str).unwrap_or(""),
        error = %err,
        "failed to expand template"
    );
    plain_text_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to generate div")
}

fn html_response(status: StatusCode, body: Bytes) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        body,
    )
        .into_response()
}

fn parse_query(raw: &str) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        map.entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    map
}

async fn read_form(headers: &HeaderMap, method: &Method, body: Body) -> HashMap<String, String> {
    if *method == Method::GET {
        return HashMap::new();
    }
    let urlencoded = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
    if !urlencoded {
        return HashMap::new();
    }

    match to_bytes(body, FORM_BODY_LIMIT).await {
        Ok(bytes) => url::form_urlencoded::parse(&bytes).into_owned().collect(),
        Err(err) => {
            warn!(
                target = "brezza::pipeline",
                source = SOURCE,
                error = %err,
                "failed to read form body"
            );
            HashMap::new()
        }
    }
}

/// The first address in `X-Forwarded-For`, or a placeholder when the proxy
/// header is absent.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "local".to_string())
}

#[derive(Clone)]
struct RequestId(String);

async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = RequestId(Uuid::new_v4().to_string());
    request.extensions_mut().insert(request_id.clone());
    let mut response = next.run(request).await;
    response.extensions_mut().insert(request_id);
    response
}

async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let start = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis() as u64;

    if status.is_server_error() {
        error!(
            target = "brezza::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            query = uri.query().unwrap_or(""),
            elapsed_ms,
            request_id,
            "request failed"
        );
    } else if status.is_client_error() {
        warn!(
            target = "brezza::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            query = uri.query().unwrap_or(""),
            elapsed_ms,
            request_id,
            "request rejected"
        );
    } else {
        debug!(
            target = "brezza::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            query = uri.query().unwrap_or(""),
            elapsed_ms,
            request_id,
            "request completed"
        );
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patterns_translate_to_axum_captures() {
        assert_eq!(axum_path("/"), "/");
        assert_eq!(axum_path("/:lang<len(2)>"), "/{lang}");
        assert_eq!(axum_path("/:lang/blog/:title"), "/{lang}/blog/{title}");
        assert_eq!(axum_path("/api/v1/like"), "/api/v1/like");
    }

    #[test]
    fn query_parsing_keeps_repeated_keys() {
        let query = parse_query("sort=titleAsc&tags%5B%5D=food&tags%5B%5D=travel");
        assert_eq!(query["sort"], vec!["titleAsc"]);
        assert_eq!(query["tags[]"], vec!["food", "travel"]);
    }

    #[test]
    fn forwarded_header_wins_for_client_identity() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "203.0.113.7, 10.0.0.1".parse().expect("header"),
        );
        assert_eq!(client_ip(&headers), "203.0.113.7");
        assert_eq!(client_ip(&HeaderMap::new()), "local");
    }
}
