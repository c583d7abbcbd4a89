//! HTTP proxy in front of the pricing provider

use crate::booking::{
    assemble_booking_draft, render_confirmation, BookingError, DocumentRenderer, PassengerDraft,
    PlainTextRenderer, RenderError,
};
use crate::client::FareProvider;
use crate::{City, FareResults, FlightOffer, InvalidRequest, ProviderError, SearchQuery};
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared, read-only handles used by every request
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn FareProvider>,
    pub renderer: Arc<dyn DocumentRenderer>,
}

impl AppState {
    pub fn new(provider: Arc<dyn FareProvider>) -> Self {
        Self {
            provider,
            renderer: Arc::new(PlainTextRenderer),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn DocumentRenderer>) -> Self {
        self.renderer = renderer;
        self
    }
}

/// Errors returned to API callers.
///
/// Provider failures carry their cause for logging only; the response body
/// holds the generic message.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    IncompleteBooking(#[from] BookingError),

    #[error("Failed to fetch cities")]
    CityLookup(#[source] ProviderError),

    #[error("Failed to search flights")]
    FareSearch(#[source] ProviderError),

    #[error("Failed to generate booking document")]
    Render(#[from] RenderError),
}

impl From<InvalidRequest> for ApiError {
    fn from(err: InvalidRequest) -> Self {
        ApiError::InvalidRequest(err.0)
    }
}

// Deserializer detail stays in the logs.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(rejection = %rejection.body_text(), "Could not decode request body");
        ApiError::InvalidRequest("Invalid request body".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidRequest(msg) => {
                warn!(reason = %msg, "Rejected invalid request");
                StatusCode::BAD_REQUEST
            }
            ApiError::IncompleteBooking(e) => {
                warn!(error = %e, "Rejected incomplete booking");
                StatusCode::BAD_REQUEST
            }
            ApiError::CityLookup(e) | ApiError::FareSearch(e) => {
                error!(error = %e, "{}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Render(e) => {
                error!(error = %e, "{}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// CORS policy for browser callers.
///
/// A concrete origin is allowed with credentials; no origin, or `*`, allows
/// any origin without credentials.
pub fn cors_layer(allowed_origin: Option<&str>) -> Result<CorsLayer, header::InvalidHeaderValue> {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    match allowed_origin.map(str::trim) {
        None | Some("") | Some("*") => Ok(cors.allow_origin(Any)),
        Some(origin) => Ok(cors
            .allow_origin(HeaderValue::from_str(origin)?)
            .allow_credentials(true)),
    }
}

/// Build the API router
pub fn app(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/api/cities", get(cities))
        .route("/api/search", post(search))
        .route("/api/generate-booking", post(generate_booking))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct CityParams {
    pub term: Option<String>,
}

async fn cities(
    State(state): State<AppState>,
    Query(params): Query<CityParams>,
) -> Result<Json<Vec<City>>, ApiError> {
    let term = params.term.unwrap_or_default();
    if term.trim().is_empty() {
        return Ok(Json(Vec::new()));
    }

    let cities = state
        .provider
        .lookup_cities(&term)
        .await
        .map_err(ApiError::CityLookup)?;

    Ok(Json(cities))
}

async fn search(
    State(state): State<AppState>,
    payload: Result<Json<SearchQuery>, JsonRejection>,
) -> Result<Json<FareResults>, ApiError> {
    let Json(query) = payload?;
    let request = query.validate()?;

    info!(
        origin = %request.origin,
        destination = %request.destination,
        depart_date = %request.depart_date,
        adults = request.adults,
        "Flight search request received"
    );

    let results = state
        .provider
        .search_fares(&request)
        .await
        .map_err(ApiError::FareSearch)?;

    Ok(Json(results))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBookingPayload {
    pub flight_details: Option<FlightOffer>,
    pub passenger_details: Option<PassengerDraft>,
}

async fn generate_booking(
    State(state): State<AppState>,
    payload: Result<Json<GenerateBookingPayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    let record = assemble_booking_draft(payload.flight_details, payload.passenger_details)?;
    let document = render_confirmation(&record, state.renderer.as_ref())?;

    info!(bytes = document.len(), "Booking confirmation generated");

    let headers = [
        (header::CONTENT_TYPE, state.renderer.content_type().to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"booking-confirmation.{}\"",
                state.renderer.file_extension()
            ),
        ),
    ];
    Ok((StatusCode::OK, headers, document).into_response())
}
