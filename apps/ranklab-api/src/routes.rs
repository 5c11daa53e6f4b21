use axum::{
	Json, Router,
	body::Body,
	extract::{Path, Query, State},
	http::{HeaderMap, Request, StatusCode, header::AUTHORIZATION},
	middleware::{self, Next},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AppState;
use ranklab_backends::{ConnectionStatus, FieldFilters};
use ranklab_service::{
	ConnectionTestRequest, CreateExecutionRequest, DocumentsRequest, DocumentsResponse, Error,
	Execution, FieldValuesRequest, FieldValuesResponse, FieldsRequest, FieldsResponse,
	GetExecutionRequest, PreviewRequest, PreviewResponse,
};

#[derive(Debug, Deserialize)]
struct PreviewBody {
	phrase: String,
}

#[derive(Debug, Deserialize)]
struct FieldValuesQuery {
	field: String,
	prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DocumentsBody {
	ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	errno: Option<i32>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	errno: Option<i32>,
}
impl ApiError {
	fn new(status: StatusCode, error_code: impl Into<String>, message: impl Into<String>) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), errno: None }
	}
}
impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		let errno = err.errno();
		let (status, code) = match &err {
			Error::ConnectionFailed { .. } => (StatusCode::BAD_GATEWAY, "CONNECTION_FAILED"),
			Error::SmokeTestFailed { .. } => (StatusCode::BAD_GATEWAY, "SMOKE_TEST_FAILED"),
			Error::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
			Error::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
			Error::Authentication { .. } => (StatusCode::BAD_GATEWAY, "AUTHENTICATION_FAILED"),
			Error::Backend { .. } => (StatusCode::BAD_GATEWAY, "BACKEND_ERROR"),
			Error::Storage { .. } => {
				tracing::error!(error = %err, "Storage failure while handling request.");

				(StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR")
			},
		};

		Self { errno, ..Self::new(status, code, err.to_string()) }
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, errno: self.errno };

		(self.status, Json(body)).into_response()
	}
}

pub fn router(state: AppState) -> Router {
	let api = Router::new()
		.route("/v1/executions", post(create_execution))
		.route("/v1/executions/{execution_id}", get(get_execution))
		.route("/v1/search_configurations/{search_configuration_id}/preview", post(preview))
		.route("/v1/search_endpoints/{search_endpoint_id}/test_connection", post(test_connection))
		.route("/v1/search_endpoints/{search_endpoint_id}/fields", get(fields))
		.route("/v1/search_endpoints/{search_endpoint_id}/field_values", get(field_values))
		.route("/v1/search_endpoints/{search_endpoint_id}/documents", post(documents))
		.route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

	Router::new().route("/health", get(health)).merge(api).with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn auth_middleware(
	State(state): State<AppState>,
	req: Request<Body>,
	next: Next,
) -> Response {
	if let Some(expected) = state.auth_token.as_deref()
		&& read_bearer_token(req.headers()) != Some(expected)
	{
		return ApiError::new(
			StatusCode::UNAUTHORIZED,
			"UNAUTHORIZED",
			"A valid Bearer token is required.",
		)
		.into_response();
	}

	next.run(req).await
}

fn read_bearer_token(headers: &HeaderMap) -> Option<&str> {
	let raw = headers.get(AUTHORIZATION)?;
	let value = raw.to_str().ok()?.trim();
	let token = value.strip_prefix("Bearer ")?.trim();

	if token.is_empty() { None } else { Some(token) }
}

async fn create_execution(
	State(state): State<AppState>,
	Json(payload): Json<CreateExecutionRequest>,
) -> Result<(StatusCode, Json<Execution>), ApiError> {
	let execution = state.service.create_execution(payload).await?;

	Ok((StatusCode::CREATED, Json(execution)))
}

async fn get_execution(
	State(state): State<AppState>,
	Path(execution_id): Path<Uuid>,
) -> Result<Json<Execution>, ApiError> {
	let execution = state.service.get_execution(GetExecutionRequest { execution_id }).await?;

	Ok(Json(execution))
}

async fn preview(
	State(state): State<AppState>,
	Path(search_configuration_id): Path<Uuid>,
	Json(payload): Json<PreviewBody>,
) -> Result<Json<PreviewResponse>, ApiError> {
	let response = state
		.service
		.preview_phrase(PreviewRequest { search_configuration_id, phrase: payload.phrase })
		.await?;

	Ok(Json(response))
}

async fn test_connection(
	State(state): State<AppState>,
	Path(search_endpoint_id): Path<Uuid>,
) -> Result<Json<ConnectionStatus>, ApiError> {
	let status =
		state.service.test_endpoint_connection(ConnectionTestRequest { search_endpoint_id }).await?;

	Ok(Json(status))
}

async fn fields(
	State(state): State<AppState>,
	Path(search_endpoint_id): Path<Uuid>,
	Query(filters): Query<FieldFilters>,
) -> Result<Json<FieldsResponse>, ApiError> {
	let response =
		state.service.endpoint_fields(FieldsRequest { search_endpoint_id, filters }).await?;

	Ok(Json(response))
}

async fn field_values(
	State(state): State<AppState>,
	Path(search_endpoint_id): Path<Uuid>,
	Query(query): Query<FieldValuesQuery>,
) -> Result<Json<FieldValuesResponse>, ApiError> {
	let response = state
		.service
		.endpoint_field_values(FieldValuesRequest {
			search_endpoint_id,
			field: query.field,
			prefix: query.prefix,
		})
		.await?;

	Ok(Json(response))
}

async fn documents(
	State(state): State<AppState>,
	Path(search_endpoint_id): Path<Uuid>,
	Json(payload): Json<DocumentsBody>,
) -> Result<Json<DocumentsResponse>, ApiError> {
	let response = state
		.service
		.endpoint_documents(DocumentsRequest { search_endpoint_id, ids: payload.ids })
		.await?;

	Ok(Json(response))
}

#[cfg(test)]
mod tests {
	use axum::body;

	use super::*;

	async fn body_json(response: Response) -> serde_json::Value {
		let bytes = body::to_bytes(response.into_body(), usize::MAX)
			.await
			.expect("Failed to read response body.");

		serde_json::from_slice(&bytes).expect("Failed to parse response body.")
	}

	#[tokio::test]
	async fn connection_failures_carry_errno() {
		let err =
			Error::ConnectionFailed { message: "connection refused".to_string(), errno: Some(111) };
		let response = ApiError::from(err).into_response();

		assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

		let json = body_json(response).await;

		assert_eq!(json["error_code"], "CONNECTION_FAILED");
		assert_eq!(json["errno"], 111);
	}

	#[tokio::test]
	async fn smoke_test_failures_carry_errno() {
		let err =
			Error::SmokeTestFailed { message: "connection reset".to_string(), errno: Some(104) };
		let response = ApiError::from(err).into_response();

		assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

		let json = body_json(response).await;

		assert_eq!(json["error_code"], "SMOKE_TEST_FAILED");
		assert_eq!(json["errno"], 104);
	}

	#[tokio::test]
	async fn backend_authentication_failures_have_their_own_code() {
		let err =
			Error::Authentication { message: "missing authentication credentials".to_string() };
		let response = ApiError::from(err).into_response();

		assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
		assert_eq!(body_json(response).await["error_code"], "AUTHENTICATION_FAILED");
	}

	#[tokio::test]
	async fn missing_records_map_to_not_found_without_errno() {
		let err = Error::NotFound { message: "execution 42".to_string() };
		let response = ApiError::from(err).into_response();

		assert_eq!(response.status(), StatusCode::NOT_FOUND);

		let json = body_json(response).await;

		assert_eq!(json["error_code"], "NOT_FOUND");
		assert!(json.get("errno").is_none());
	}

	#[test]
	fn bearer_token_is_read_from_the_header() {
		let mut headers = HeaderMap::new();

		assert_eq!(read_bearer_token(&headers), None);

		headers.insert(AUTHORIZATION, "Bearer  s3cret ".parse().expect("Invalid header."));

		assert_eq!(read_bearer_token(&headers), Some("s3cret"));

		headers.insert(AUTHORIZATION, "Basic abc".parse().expect("Invalid header."));

		assert_eq!(read_bearer_token(&headers), None);
	}
}
