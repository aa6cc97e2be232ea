use std::process;
use std::sync::Arc;

use brezza::application::error::AppError;
use brezza::cache::FragmentCache;
use brezza::config;
use brezza::identity::HashIdentity;
use brezza::infra::{db, local, telemetry};
use brezza::ledger::recorder::ViewRecorder;
use brezza::ledger::store::LedgerStore;
use brezza::ledger::InteractionLedger;
use brezza::pipeline::{self, PipelineState};
use brezza::routing::registry::RouteRegistry;
use brezza::routing::{handlers, Services};
use tokio::signal;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (_cli, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let pool = db::connect(
        &settings.database.url,
        settings.database.max_connections.get(),
    )
    .await?;
    db::run_migrations(&pool).await?;

    let identity = Arc::new(HashIdentity::new(settings.identity.salt.clone())?);
    let ledger = Arc::new(InteractionLedger::new(identity));
    let store = LedgerStore::new(pool.clone());
    let (likes, views) = store.load().await?;
    ledger.hydrate(likes, views);

    let fragments = Arc::new(FragmentCache::new(
        settings.cache.max_cost_bytes.get(),
        settings.cache.queue_capacity.get(),
    ));
    let recorder = Arc::new(ViewRecorder::new(
        ledger.clone(),
        settings.cache.view_queue_capacity.get(),
    ));

    let locales = local::load_locales(&settings.content.locale_dir, &settings.languages)?;
    let services = Arc::new(Services {
        content: Arc::new(local::LocalContentStore::new(settings.content.root.clone())),
        markdown: Arc::new(local::PlainMarkdown),
        templates: Arc::new(local::SimpleTemplates::new(
            settings.content.site_root.clone(),
        )),
        mailer: Arc::new(local::InMemoryMailer::new()),
        locales,
        languages: settings
            .languages
            .iter()
            .map(|language| language.name.clone())
            .collect(),
        ledger: ledger.clone(),
        views: recorder.clone(),
        fragments: fragments.clone(),
    });

    let registry = Arc::new(RouteRegistry::new(handlers::all())?);
    pipeline::register_templates(&services, &registry)?;
    let router = pipeline::build_router(PipelineState {
        services,
        registry,
    });

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::unexpected(format!("failed to bind listener: {err}")))?;
    info!(target = "brezza", addr = %settings.server.addr, "listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    // No new requests at this point. Drain the background queues so every
    // accepted interaction reaches the ledger, then persist it once.
    let drained = tokio::time::timeout(settings.server.graceful_shutdown, async {
        recorder.close().await;
        fragments.close().await;
    })
    .await;
    if drained.is_err() {
        warn!(
            target = "brezza",
            "background queues did not drain within the shutdown window"
        );
    }

    if let Err(err) = store.persist(&ledger.snapshot()).await {
        error!(target = "brezza", error = %err, "failed to persist interaction ledger");
    }
    pool.close().await;

    info!(target = "brezza", "shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        error!(target = "brezza", error = %err, "failed to listen for shutdown signal");
    }
    info!(target = "brezza", "shutdown signal received");
}
