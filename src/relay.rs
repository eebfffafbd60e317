//! The relay endpoint: one multipart upload in, one model call out.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, instrument};

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::model::{CachePolicy, ModelRequest, VisionModel};
use crate::page;
use crate::prompt::InsightRequest;
use crate::workers_ai::WorkersAiClient;

pub const INSIGHTS_PATH: &str = "/api/insights";

/// Shared, read-only state. Nothing here changes between requests.
#[derive(Clone)]
pub struct AppState {
    model: Arc<dyn VisionModel>,
    cache: CachePolicy,
}

impl AppState {
    pub fn new(model: Arc<dyn VisionModel>, cache: CachePolicy) -> Self {
        Self { model, cache }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InsightsResponse {
    pub insights: String,
}

/// A decoded upload.
#[derive(Debug)]
pub struct RelayForm {
    pub image: Vec<u8>,
    pub content_type: Option<String>,
    pub request: InsightRequest,
}

/// Reads every part of the upload into memory and picks the variant.
///
/// A `question` part selects question answering; otherwise `language` and
/// `length` are required.
pub async fn read_form(mut multipart: Multipart) -> Result<RelayForm, RelayError> {
    let mut image = None;
    let mut content_type = None;
    let mut language = None;
    let mut length = None;
    let mut question = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("image") => {
                content_type = field.content_type().map(str::to_owned);
                image = Some(field.bytes().await?.to_vec());
            }
            Some("language") => language = Some(field.text().await?),
            Some("length") => length = Some(field.text().await?),
            Some("question") => question = Some(field.text().await?),
            other => debug!("Ignoring form field {:?}", other),
        }
    }

    let image = image
        .filter(|bytes| !bytes.is_empty())
        .ok_or(RelayError::MissingField("image"))?;

    let request = match question {
        Some(q) if q.trim().is_empty() => return Err(RelayError::MissingField("question")),
        Some(q) => InsightRequest::Question(q),
        None => InsightRequest::Insights {
            language: language
                .ok_or(RelayError::MissingField("language"))?
                .parse()?,
            length: length.ok_or(RelayError::MissingField("length"))?.parse()?,
        },
    };

    Ok(RelayForm {
        image,
        content_type,
        request,
    })
}

async fn relay(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<String, RelayError> {
    let form = read_form(multipart?).await?;
    info!(
        "Relaying {} byte image ({}) to {}",
        form.image.len(),
        form.content_type.as_deref().unwrap_or("unknown type"),
        state.model.name()
    );

    let request = ModelRequest {
        messages: form.request.messages(),
        decoding: form.request.decoding(),
        image: form.image,
        cache: state.cache,
    };

    Ok(state.model.run(request).await?)
}

#[instrument(skip_all)]
pub async fn generate_insights(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<InsightsResponse>, RelayError> {
    let start = Instant::now();

    match relay(&state, multipart).await {
        Ok(insights) => {
            info!("Insights generated in {}ms", start.elapsed().as_millis());
            Ok(Json(InsightsResponse { insights }))
        }
        Err(err) => {
            error!(error = %err, "Error generating insights");
            Err(err)
        }
    }
}

pub fn router(state: AppState, enable_cors: bool) -> Router {
    let cors = if enable_cors {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/", get(page::index))
        .route("/health", get(|| async { "OK" }))
        .route(INSIGHTS_PATH, post(generate_insights))
        .layer(DefaultBodyLimit::disable())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Runs the relay until Ctrl+C or SIGTERM.
pub async fn start_server(config: RelayConfig) -> anyhow::Result<()> {
    config.validate()?;

    let client = WorkersAiClient::new(&config);
    info!("Model endpoint: {}", client.url());

    let state = AppState::new(Arc::new(client), config.cache_policy());
    let app = router(state, config.enable_cors);

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                error!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
