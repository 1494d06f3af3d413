use axum::{
	Json, Router,
	extract::{Path, Query, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use anl_service::{
	CompatibilityRequest, CompatibilityResponse, Error, IngestMessageRequest,
	IngestMessageResponse, MatchesRequest, MatchesResponse, ProfileResponse, RebuildReport,
	UpsertUserRequest,
};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MatchesQuery {
	pub top_n: Option<u32>,
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/users", post(upsert_user))
		.route("/v1/profile/message", post(ingest_message))
		.route("/v1/profile/{user_id}", get(get_profile))
		.route("/v1/matches/{user_id}", get(matches))
		.route("/v1/compatibility", post(compatibility))
		.with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new().route("/v1/admin/rebuild_vectors", post(rebuild_vectors)).with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn upsert_user(
	State(state): State<AppState>,
	Json(payload): Json<UpsertUserRequest>,
) -> Result<StatusCode, ApiError> {
	state.service.upsert_user(payload).await?;

	Ok(StatusCode::NO_CONTENT)
}

async fn ingest_message(
	State(state): State<AppState>,
	Json(payload): Json<IngestMessageRequest>,
) -> Result<(StatusCode, Json<IngestMessageResponse>), ApiError> {
	let response = state.service.ingest_message(payload).await?;

	Ok((StatusCode::ACCEPTED, Json(response)))
}

async fn get_profile(
	State(state): State<AppState>,
	Path(user_id): Path<Uuid>,
) -> Result<Json<ProfileResponse>, ApiError> {
	let response = state.service.get_profile(user_id).await?;

	Ok(Json(response))
}

async fn matches(
	State(state): State<AppState>,
	Path(user_id): Path<Uuid>,
	Query(query): Query<MatchesQuery>,
) -> Result<Json<MatchesResponse>, ApiError> {
	let response =
		state.service.matches(MatchesRequest { user_id, top_n: query.top_n }).await?;

	Ok(Json(response))
}

async fn compatibility(
	State(state): State<AppState>,
	Json(payload): Json<CompatibilityRequest>,
) -> Result<Json<CompatibilityResponse>, ApiError> {
	let response = state.service.compatibility(payload).await?;

	Ok(Json(response))
}

async fn rebuild_vectors(State(state): State<AppState>) -> Result<Json<RebuildReport>, ApiError> {
	let response = state.service.rebuild_vectors().await?;

	Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}
impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		match err {
			Error::InvalidRequest { message } =>
				ApiError::new(StatusCode::BAD_REQUEST, "invalid_request", message, None),
			Error::NotFound { message } =>
				ApiError::new(StatusCode::NOT_FOUND, "not_found", message, None),
			Error::Provider { message } => {
				tracing::error!(error = %message, "Provider call failed.");

				ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "provider_error", message, None)
			},
			Error::Storage { message } => {
				tracing::error!(error = %message, "Storage call failed.");

				ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", message, None)
			},
			Error::Qdrant { message } => {
				tracing::error!(error = %message, "Qdrant call failed.");

				ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "qdrant_error", message, None)
			},
		}
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}
