use crate::{
    app::{AppError, SessionHandle},
    eid::Eid,
    ingest::LOCAL_ALBUM,
    photos::{Album, Photo, PhotoSource},
    search::{SearchMode, SearchResults},
    sync::SyncStatus,
};
use anyhow::Context;
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

#[derive(Clone)]
struct SharedState {
    handle: SessionHandle,
    owner_id: String,
}

fn router(state: Arc<SharedState>) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .route("/api/albums", get(albums))
        .route("/api/albums/toggle", post(toggle_album))
        .route("/api/albums/select_all", post(select_all))
        .route("/api/albums/unselect_all", post(unselect_all))
        .route("/api/sync/start", post(start_sync))
        .route("/api/sync/pause", post(pause_sync))
        .route("/api/sync/toggle", post(toggle_sync))
        .route("/api/search", get(results).post(search))
        .route("/api/photos", post(add_photo))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(state)
}

async fn start_app(handle: SessionHandle, owner_id: String, listen: String) -> anyhow::Result<()> {
    let shared_state = Arc::new(SharedState {
        handle: handle.clone(),
        owner_id,
    });

    async fn shutdown_signal(handle: SessionHandle) {
        let ctrl_c = async {
            if let Err(err) = signal::ctrl_c().await {
                log::error!("failed to install Ctrl+C handler: {err}");
                std::future::pending::<()>().await;
            }
        };

        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(err) => {
                    log::error!("failed to install signal handler: {err}");
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        log::warn!("shutting down");
        if let Err(err) = tokio::task::spawn_blocking(move || handle.shutdown()).await {
            log::error!("runtime shutdown failed: {err}");
        }
    }

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    log::info!("listening on {listen}");

    axum::serve(listener, router(shared_state))
        .with_graceful_shutdown(shutdown_signal(handle))
        .await?;

    Ok(())
}

pub fn start_daemon(handle: SessionHandle, owner_id: &str, listen: &str) -> anyhow::Result<()> {
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(start_app(handle.clone(), owner_id.to_string(), listen.to_string()));

    handle.shutdown();
    result
}

// Make our own error that wraps `AppError`.
#[derive(Debug)]
struct HttpError(AppError);

// Tell axum how to convert `AppError` into a response.
impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            AppError::NotFound => axum::http::StatusCode::NOT_FOUND,
            AppError::AlreadyExists(_) | AppError::InvalidTransition { .. } => {
                axum::http::StatusCode::CONFLICT
            }
            AppError::SessionExpired => axum::http::StatusCode::UNAUTHORIZED,
            AppError::Shutdown => axum::http::StatusCode::SERVICE_UNAVAILABLE,
            AppError::Reqwest(_) | AppError::IO(_) | AppError::Other(_) => {
                log::error!("{self:?}");
                axum::http::StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

async fn status(State(state): State<Arc<SharedState>>) -> Result<Json<SyncStatus>, HttpError> {
    tokio::task::block_in_place(move || Ok(Json(state.handle.status()?)))
}

async fn albums(State(state): State<Arc<SharedState>>) -> Result<Json<Vec<Album>>, HttpError> {
    tokio::task::block_in_place(move || Ok(Json(state.handle.albums()?)))
}

#[derive(Debug, Deserialize)]
pub struct ToggleAlbumRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct ToggleAlbumResponse {
    pub name: String,
    pub sync_enabled: bool,
}

async fn toggle_album(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<ToggleAlbumRequest>,
) -> Result<Json<ToggleAlbumResponse>, HttpError> {
    log::debug!("payload: {payload:?}");

    tokio::task::block_in_place(move || {
        let sync_enabled = state.handle.toggle_album(&payload.name)?;
        Ok(Json(ToggleAlbumResponse {
            name: payload.name,
            sync_enabled,
        }))
    })
}

async fn select_all(State(state): State<Arc<SharedState>>) -> Result<Json<SyncStatus>, HttpError> {
    tokio::task::block_in_place(move || {
        state.handle.select_all_albums()?;
        Ok(Json(state.handle.status()?))
    })
}

async fn unselect_all(
    State(state): State<Arc<SharedState>>,
) -> Result<Json<SyncStatus>, HttpError> {
    tokio::task::block_in_place(move || {
        state.handle.unselect_all_albums()?;
        Ok(Json(state.handle.status()?))
    })
}

async fn start_sync(State(state): State<Arc<SharedState>>) -> Result<Json<SyncStatus>, HttpError> {
    tokio::task::block_in_place(move || {
        state.handle.start_sync()?;
        Ok(Json(state.handle.status()?))
    })
}

async fn pause_sync(State(state): State<Arc<SharedState>>) -> Result<Json<SyncStatus>, HttpError> {
    tokio::task::block_in_place(move || {
        state.handle.pause_sync()?;
        Ok(Json(state.handle.status()?))
    })
}

async fn toggle_sync(
    State(state): State<Arc<SharedState>>,
) -> Result<Json<SyncStatus>, HttpError> {
    tokio::task::block_in_place(move || {
        state.handle.toggle_sync()?;
        Ok(Json(state.handle.status()?))
    })
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub mode: Option<SearchMode>,
}

/// Sets the query and returns right away, results follow after the debounce.
async fn search(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<serde_json::Value>, HttpError> {
    log::debug!("payload: {payload:?}");

    tokio::task::block_in_place(move || {
        if let Some(mode) = payload.mode {
            state.handle.set_mode(mode)?;
        }
        state.handle.set_query(&payload.query)?;
        Ok(Json(json!({"query": payload.query, "pending": true})))
    })
}

async fn results(State(state): State<Arc<SharedState>>) -> Result<Json<SearchResults>, HttpError> {
    tokio::task::block_in_place(move || Ok(Json(state.handle.results()?)))
}

#[derive(Debug, Deserialize)]
pub struct AddPhotoRequest {
    pub name: String,
    pub album: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub size: u64,
}

async fn add_photo(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<AddPhotoRequest>,
) -> Result<Json<Photo>, HttpError> {
    log::debug!("payload: {payload:?}");

    let id = Eid::prefixed("local").to_string();
    let photo = Photo {
        url: format!("local://{id}"),
        id,
        owner_id: state.owner_id.clone(),
        name: payload.name,
        album: payload.album.unwrap_or_else(|| LOCAL_ALBUM.to_string()),
        tags: payload.tags,
        description: payload.description,
        date: Utc::now(),
        source: PhotoSource::Local,
        size: payload.size,
        embedding: None,
    };

    tokio::task::block_in_place(move || {
        state.handle.add_local_photos(vec![photo.clone()])?;
        Ok(Json(photo))
    })
}
