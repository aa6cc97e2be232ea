//! End-to-end dispatch tests through the assembled axum router: composed
//! pages, fragment recovery from the Referer, caching, and the like,
//! subscription, map, and timezone endpoints.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::json;
use tempfile::TempDir;
use tower::ServiceExt;

use brezza::application::collaborators::{
    Locale, LocaleCatalog, Mailer, SubscriptionKind, TemplateMap, UnsubscribeLocale,
    UserProfileLocale,
};
use brezza::application::error::RouteError;
use brezza::cache::{CacheSetting, FragmentCache};
use brezza::identity::HashIdentity;
use brezza::infra::local::{InMemoryMailer, LocalContentStore, PlainMarkdown, SimpleTemplates};
use brezza::ledger::InteractionLedger;
use brezza::ledger::recorder::ViewRecorder;
use brezza::pipeline::{self, PipelineState};
use brezza::routing::registry::RouteRegistry;
use brezza::routing::{
    LangSetting, RequestContext, RouteDescriptor, RouteHandler, SegmentSet, Services, handlers,
};

struct TestSite {
    _dir: TempDir,
    router: Router,
    services: Arc<Services>,
}

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create dirs");
    }
    std::fs::write(path, content).expect("write file");
}

fn write_article(root: &Path, lang: &str, reference: &str, title: &str) {
    write(
        &root.join(format!("content/{lang}/{reference}.md")),
        &format!("# {title}\n"),
    );
    write(
        &root.join(format!("content/{lang}/{reference}.json")),
        &json!({
            "title": title,
            "published_at": "2024-05-03T10:20:30Z",
            "action_date": "2024-05-01",
            "tags": ["travel"],
            "geolocation": "12.5 45.25 300",
        })
        .to_string(),
    );
}

fn test_site_with(extra_routes: Vec<Arc<dyn RouteHandler>>) -> TestSite {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();

    write(
        &root.join("views/layouts/general-page.html"),
        "<html lang=\"{{Lang}}\">{{Path}}</html>",
    );
    write(
        &root.join("views/partials/general-page-header.html"),
        "<header>{{Title}}</header>",
    );
    write(
        &root.join("views/partials/general-page-body.html"),
        "<main>{{ParsedMarkdown}}</main>",
    );
    write(
        &root.join("views/partials/blog-page-like-button.html"),
        "{{Liked}}:{{LikedCount}}",
    );
    write(
        &root.join("views/partials/catalogue-blog-cards.html"),
        "cards:{{BlogPages}}",
    );
    write(
        &root.join("views/partials/personal-page-status.html"),
        "{{StatusId}}:{{Status}}:{{Message}}",
    );
    write(
        &root.join("views/pages/unsubscribe-page.html"),
        "{{StatusText}}",
    );
    write(
        &root.join("views/pages/global-map.html"),
        "markers:{{MapMarkers}}",
    );
    write_article(root, "en", "first-post", "First Post");

    let identity = Arc::new(HashIdentity::new(b"0123456789abcdef".to_vec()).expect("identity"));
    let ledger = Arc::new(InteractionLedger::new(identity));
    let mut locales = LocaleCatalog::new();
    locales.insert(
        "en".to_string(),
        Locale {
            home_header: "Welcome".to_string(),
            user_profile: UserProfileLocale {
                header: "Your profile".to_string(),
                subscribe_invalid_type: "Unknown subscription type".to_string(),
                subscribed_successfully: "Subscribed".to_string(),
                email_empty: "Email is empty".to_string(),
                verification_failed: "Verification failed".to_string(),
                ..UserProfileLocale::default()
            },
            unsubscribe: UnsubscribeLocale {
                unset_code: "No code attached".to_string(),
                invalid_code: "Invalid code".to_string(),
                ..UnsubscribeLocale::default()
            },
            ..Locale::default()
        },
    );

    let services = Arc::new(Services {
        content: Arc::new(LocalContentStore::new(root.join("content"))),
        markdown: Arc::new(PlainMarkdown),
        templates: Arc::new(SimpleTemplates::new(root)),
        mailer: Arc::new(InMemoryMailer::new()),
        locales,
        languages: vec!["en".to_string()],
        ledger: ledger.clone(),
        views: Arc::new(ViewRecorder::new(ledger, 16)),
        fragments: Arc::new(FragmentCache::new(1 << 20, 16)),
    });

    let mut routes = handlers::all();
    routes.extend(extra_routes);
    let registry = Arc::new(RouteRegistry::new(routes).expect("registry"));
    pipeline::register_templates(&services, &registry).expect("register templates");
    let router = pipeline::build_router(PipelineState {
        services: services.clone(),
        registry,
    });

    TestSite {
        _dir: dir,
        router,
        services,
    }
}

fn test_site() -> TestSite {
    test_site_with(Vec::new())
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

async fn get(router: &Router, uri: &str, referer: Option<&str>) -> (StatusCode, String) {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(referer) = referer {
        builder = builder.header(header::REFERER, referer);
    }
    let request = builder.body(Body::empty()).expect("request should build");
    send(router, request).await
}

#[tokio::test(flavor = "multi_thread")]
async fn composed_page_renders_the_shared_layout() {
    let site = test_site();
    let (status, body) = get(&site.router, "/en", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "<html lang=\"en\">en</html>");
}

#[tokio::test(flavor = "multi_thread")]
async fn composed_page_rejects_unknown_language() {
    let site = test_site();
    let (status, body) = get(&site.router, "/zz", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        "lang value is invalid: 'zz' is not considered an available language"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn composed_page_is_cached_under_its_full_key() {
    let site = test_site();
    let (status, _) = get(&site.router, "/en/blog/first-post", None).await;
    assert_eq!(status, StatusCode::OK);

    site.services.fragments.close().await;
    assert!(
        site.services
            .fragments
            .get("GET.full.en/blog/first-post")
            .is_some()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn fragment_without_referer_is_rejected() {
    let site = test_site();
    let (status, body) = get(&site.router, "/api/v1/general-page/header", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "'Referer' header is empty");
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_fragment_name_is_rejected() {
    let site = test_site();
    let (status, body) = get(&site.router, "/api/v1/general-page/sidebar", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "unknown segment 'sidebar'");
}

#[tokio::test(flavor = "multi_thread")]
async fn fragment_with_unroutable_referer_is_not_found() {
    let site = test_site();
    let (status, body) = get(
        &site.router,
        "/api/v1/general-page/header",
        Some("http://localhost/en/blog/a/b"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        "fail to get templated page for 'GET /en/blog/a/b': not found"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn article_header_fragment_renders_the_title() {
    let site = test_site();
    let (status, body) = get(
        &site.router,
        "/api/v1/general-page/header",
        Some("http://localhost/en/blog/first-post"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "<header>First Post</header>");
}

#[tokio::test(flavor = "multi_thread")]
async fn fragment_outside_the_route_segment_set_is_no_content() {
    let site = test_site();
    let (status, body) = get(
        &site.router,
        "/api/v1/general-page/footer",
        Some("http://localhost/en/blog/first-post"),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn fragment_language_comes_from_the_referer_and_is_validated() {
    let site = test_site();
    let (status, body) = get(
        &site.router,
        "/api/v1/general-page/header",
        Some("http://localhost/zz/blog/first-post"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        "lang value is invalid: 'zz' is not considered an available language"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn body_fragment_records_a_view() {
    let site = test_site();
    let (status, body) = get(
        &site.router,
        "/api/v1/general-page/body",
        Some("http://localhost/en/blog/first-post"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("# First Post"));

    site.services.views.close().await;
    assert_eq!(site.services.ledger.view_count("first-post"), 1);
}

async fn send_like(router: &Router, method: Method, referer: &str, ip: &str, form: Option<&str>) -> (StatusCode, String) {
    let mut builder = Request::builder()
        .method(method)
        .uri("/api/v1/like")
        .header(header::REFERER, referer)
        .header("x-forwarded-for", ip);
    let body = match form {
        Some(form) => {
            builder = builder.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
            Body::from(form.to_string())
        }
        None => Body::empty(),
    };
    let request = builder.body(body).expect("request should build");
    send(router, request).await
}

#[tokio::test(flavor = "multi_thread")]
async fn like_toggle_is_visible_to_the_same_client_only() {
    let site = test_site();
    let referer = "http://localhost/en/blog/first-post";

    let (status, body) = send_like(
        &site.router,
        Method::PUT,
        referer,
        "203.0.113.9",
        Some("like=true"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "true:1");

    let (status, body) = send_like(&site.router, Method::GET, referer, "203.0.113.9", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "true:1");

    let (status, body) = send_like(&site.router, Method::GET, referer, "203.0.113.10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "false:1");
}

#[tokio::test(flavor = "multi_thread")]
async fn like_for_a_missing_article_is_not_found() {
    let site = test_site();
    let (status, body) = send_like(
        &site.router,
        Method::PUT,
        "http://localhost/en/blog/ghost",
        "203.0.113.9",
        Some("like=true"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "server did not find 'en/ghost.md' article");
}

#[tokio::test(flavor = "multi_thread")]
async fn like_with_a_non_article_referer_is_rejected() {
    let site = test_site();
    let (status, body) = send_like(
        &site.router,
        Method::GET,
        "http://localhost/en/about",
        "203.0.113.9",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        "invalid path format: expected '/:lang/blog/:page', got '/en/about'"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn like_with_a_malformed_value_is_rejected() {
    let site = test_site();
    let (status, body) = send_like(
        &site.router,
        Method::PUT,
        "http://localhost/en/blog/first-post",
        "203.0.113.9",
        Some("like=maybe"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "invalid like value 'maybe'");
}

#[tokio::test(flavor = "multi_thread")]
async fn blog_search_reads_its_language_from_the_query() {
    let site = test_site();
    let (status, body) = get(
        &site.router,
        "/api/v1/blog-search?lang=en&sort=titleAsc",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("cards:"));
    assert!(body.contains("/en/blog/first-post"));
}

#[tokio::test(flavor = "multi_thread")]
async fn blog_search_without_a_language_is_rejected() {
    let site = test_site();
    let (status, _) = get(&site.router, "/api/v1/blog-search", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

struct RawOutputRoute {
    descriptor: RouteDescriptor,
}

impl RawOutputRoute {
    fn new() -> Self {
        Self {
            descriptor: RouteDescriptor {
                method: Method::GET,
                pattern: "/raw".to_string(),
                composed: false,
                cache: CacheSetting::Disabled,
                cache_ttl: Duration::from_secs(60),
                lang: LangSetting::NotRequired,
                templates: Vec::new(),
                segments: SegmentSet::NONE,
            },
        }
    }
}

#[async_trait]
impl RouteHandler for RawOutputRoute {
    fn descriptor(&self) -> &RouteDescriptor {
        &self.descriptor
    }

    async fn render(
        &self,
        _ctx: &RequestContext,
        _services: &Services,
        _lang: &str,
        values: &mut TemplateMap,
    ) -> Result<StatusCode, RouteError> {
        values.insert("Output".to_string(), json!("plain output"));
        Ok(StatusCode::OK)
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn untemplated_routes_fall_back_to_their_output_value() {
    let site = test_site_with(vec![Arc::new(RawOutputRoute::new())]);
    let (status, body) = get(&site.router, "/raw", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "plain output");
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_fragment_requests_hit_the_cache() {
    let site = test_site();
    let referer = "http://localhost/en/blog/first-post";

    let (status, first) = get(&site.router, "/api/v1/general-page/header", Some(referer)).await;
    assert_eq!(status, StatusCode::OK);

    // Drain the admission queue, then rewrite the template on disk. A cache
    // hit keeps serving the original render.
    tokio::time::sleep(Duration::from_millis(50)).await;
    write(
        &site._dir.path().join("views/partials/general-page-header.html"),
        "changed",
    );
    let (status, second) = get(&site.router, "/api/v1/general-page/header", Some(referer)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first, second);
}

async fn send_form(
    router: &Router,
    method: Method,
    uri: &str,
    referer: &str,
    ip: &str,
    form: &str,
) -> (StatusCode, String) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::REFERER, referer)
        .header("x-forwarded-for", ip)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .expect("request should build");
    send(router, request).await
}

#[tokio::test(flavor = "multi_thread")]
async fn subscribing_updates_the_subscriber_profile() {
    let site = test_site();
    let (status, body) = send_form(
        &site.router,
        Method::PUT,
        "/api/v1/subs",
        "http://localhost/en/user",
        "203.0.113.9",
        "tags=specific&tags_picked=travel,food",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "subs-message:OK:Subscribed");

    let info = site
        .services
        .mailer
        .info("203.0.113.9")
        .await
        .expect("subscriber info");
    assert_eq!(info.kind, SubscriptionKind::Specific);
    assert_eq!(info.tags, vec!["travel", "food"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn subscribing_with_an_unknown_kind_is_unprocessable() {
    let site = test_site();
    let (status, body) = send_form(
        &site.router,
        Method::PUT,
        "/api/v1/subs",
        "http://localhost/en/user",
        "203.0.113.9",
        "tags=sometimes",
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body, "subs-message:Failed:Unknown subscription type");
}

#[tokio::test(flavor = "multi_thread")]
async fn verification_requires_an_email_address() {
    let site = test_site();
    let (status, body) = send_form(
        &site.router,
        Method::POST,
        "/api/v1/email/send-verification-code",
        "http://localhost/en/user",
        "203.0.113.9",
        "email=",
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body, "email-message:Failed:Email is empty");
}

#[tokio::test(flavor = "multi_thread")]
async fn verification_with_a_bad_code_fails() {
    let site = test_site();
    let (status, body) = send_form(
        &site.router,
        Method::POST,
        "/api/v1/email/verify",
        "http://localhost/en/user",
        "203.0.113.9",
        "code=nope",
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body, "verification-message:Failed:Verification failed");
}

#[tokio::test(flavor = "multi_thread")]
async fn ongoing_verification_always_answers_ok() {
    let site = test_site();
    let (status, body) = get(
        &site.router,
        "/api/v1/email/is-in-verification",
        Some("http://localhost/en/user"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "email-message:OK:");
}

#[tokio::test(flavor = "multi_thread")]
async fn user_page_header_fragment_renders_its_title() {
    let site = test_site();
    let (status, body) = get(
        &site.router,
        "/api/v1/general-page/header",
        Some("http://localhost/en/user"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "<header>Your profile</header>");
}

#[tokio::test(flavor = "multi_thread")]
async fn unsubscribe_without_a_code_is_rejected() {
    let site = test_site();
    let (status, body) = get(&site.router, "/en/user/unsubscribe", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "No code attached");

    let (status, body) = get(&site.router, "/en/user/unsubscribe?code=bogus", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Invalid code");
}

#[tokio::test(flavor = "multi_thread")]
async fn map_page_lists_geolocated_articles() {
    let site = test_site();
    let (status, body) = get(&site.router, "/en/map", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("markers:"));
    assert!(body.contains("/en/blog/first-post"));
    assert!(body.contains("12.5"));
}

#[tokio::test(flavor = "multi_thread")]
async fn timezone_endpoint_reformats_in_the_requested_offset() {
    let site = test_site();
    let (status, body) = get(
        &site.router,
        "/api/v1/tz?timestamp=2024-05-03+10%3A20%3A30+%2B00%3A00&tz=%2B02%3A00",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "2024-05-03 12:20:30 +02:00");
}

#[tokio::test(flavor = "multi_thread")]
async fn timezone_rejects_malformed_timestamps() {
    let site = test_site();
    let (status, body) = get(&site.router, "/api/v1/tz?timestamp=yesterday", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "invalid timestamp format for 'yesterday'");
}
