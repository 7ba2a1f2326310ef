use std::{future::IntoFuture, process};

use sigrelay::{
    application::{
        binder::AssetBinder,
        error::AppError,
        pipeline::SignaturePipeline,
    },
    config,
    infra::{
        error::InfraError,
        http::{self, HttpState},
        storage, telemetry,
    },
};
use tokio::sync::watch;
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
    let (_cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    let layout = settings.storage_layout()?;
    let store = storage::build_object_store(&settings.storage).await?;
    info!(
        backend = ?settings.storage.backend,
        asset_bucket = layout.asset_bucket(),
        document_bucket = layout.document_bucket(),
        public_base = %layout.public_base(),
        "object store configured"
    );

    let pipeline = SignaturePipeline::new(
        store,
        AssetBinder::new(layout),
        settings.pipeline_settings(),
    );

    serve_http(&settings, HttpState::new(pipeline)).await
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let body_limit = usize::try_from(settings.uploads.max_request_bytes.get())
        .map_err(|_| AppError::unexpected("upload limit exceeds addressable memory"))?;
    let router = http::build_router(state, body_limit);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .into_future();

    let grace = settings.server.graceful_shutdown;
    let drain_deadline = async move {
        if shutdown_rx.wait_for(|requested| *requested).await.is_ok() {
            tokio::time::sleep(grace).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = drain_deadline => {
            warn!(grace_seconds = grace.as_secs(), "graceful shutdown timed out; dropping open connections");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(err) => {
            error!(error = %err, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
