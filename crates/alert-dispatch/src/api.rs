use crate::compose::{AlertRequest, ValidationError};
use crate::dispatch::{self, Channel, Dispatcher};
use axum::{
    extract::{rejection::JsonRejection, State},
    handler::HandlerWithoutStateExt,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse};

/// Build the router of the alert dispatch API.
///
/// When `public_dir` is set, GET and HEAD requests which match no API route
/// are served from it. Everything else which matches no route, including
/// API paths requested with the wrong method, is answered with a JSON 404.
pub fn router(dispatcher: Arc<Dispatcher>, public_dir: Option<std::path::PathBuf>) -> Router {
    let router = Router::new()
        .route("/api/send-sms", post(handle_send_sms).fallback(not_found))
        .route("/send-sms", post(handle_send_sms).fallback(not_found))
        .route("/api/make-call", post(handle_make_call).fallback(not_found))
        .route("/make-call", post(handle_make_call).fallback(not_found))
        .route("/api/health", get(handle_health).fallback(not_found))
        .route("/health", get(handle_health).fallback(not_found));

    let router = match public_dir {
        Some(public_dir) => router.fallback_service(
            tower_http::services::ServeDir::new(public_dir)
                .call_fallback_on_method_not_allowed(true)
                .fallback(not_found.into_service()),
        ),
        None => router.fallback(not_found),
    };

    router
        .with_state(dispatcher)
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(tracing::Level::INFO))
                .on_response(DefaultOnResponse::new().level(tracing::Level::INFO)),
        )
}

/// Response of a successful dispatch.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct Sent {
    pub success: bool,
}

/// Response of the health check.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub status: String,
    /// RFC 3339 UTC time at which the health check was served.
    pub timestamp: String,
    pub twilio_initialized: bool,
}

/// Error that describes a failed request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{}", .0.body_text())]
    Body(#[from] JsonRejection),
    #[error(transparent)]
    Validation(ValidationError),
    #[error("{}: {source}", .channel.failure_prefix())]
    Dispatch {
        channel: Channel,
        source: dispatch::Error,
    },
    #[error("Route not found")]
    NotFound,
}

impl Error {
    fn dispatch(channel: Channel, err: dispatch::Error) -> Self {
        match err {
            dispatch::Error::Validation(err) => Error::Validation(err),
            source => Error::Dispatch { channel, source },
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::Body(rejection) => rejection.status(),
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Dispatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

#[derive(Debug, serde::Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.to_string();

        if status.is_server_error() {
            tracing::error!(%status, %error, "request failed");
        } else {
            tracing::debug!(%status, %error, "request rejected");
        }
        (status, Json(ErrorBody { error })).into_response()
    }
}

pub async fn handle_send_sms(
    State(dispatcher): State<Arc<Dispatcher>>,
    request: Result<Json<AlertRequest>, JsonRejection>,
) -> Result<Json<Sent>, Error> {
    let Json(request) = request?;

    dispatcher
        .send_alert(request)
        .await
        .map_err(|err| Error::dispatch(Channel::Sms, err))?;

    Ok(Json(Sent { success: true }))
}

pub async fn handle_make_call(
    State(dispatcher): State<Arc<Dispatcher>>,
    request: Result<Json<AlertRequest>, JsonRejection>,
) -> Result<Json<Sent>, Error> {
    let Json(request) = request?;

    dispatcher
        .initiate_call(request)
        .await
        .map_err(|err| Error::dispatch(Channel::Voice, err))?;

    Ok(Json(Sent { success: true }))
}

pub async fn handle_health(State(dispatcher): State<Arc<Dispatcher>>) -> Json<Health> {
    Json(Health {
        status: "Server is running".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        twilio_initialized: dispatcher.is_live(),
    })
}

async fn not_found() -> Error {
    Error::NotFound
}
