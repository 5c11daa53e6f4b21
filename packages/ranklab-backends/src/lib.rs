pub mod elasticsearch;
pub mod error;
pub mod expander;
pub mod solr;

pub use error::{Error, Result};
pub use expander::{DefaultExpander, ExpandedQuery, ExpansionRequest, QueryExpander};

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use ranklab_domain::endpoint::{BackendType, SearchEndpoint};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Facet values returned by [`QueryInterface::get_field_values`] are capped at this count.
pub const FIELD_VALUES_LIMIT: usize = 10;

/// One search backend behind a uniform contract.
pub trait QueryInterface
where
	Self: Send + Sync,
{
	/// Never fails; an unreachable or rejecting backend yields `success = false`.
	fn test_connection(&self) -> BoxFuture<'_, ConnectionStatus>;

	fn get_fields<'a>(&'a self, filters: &'a FieldFilters) -> BoxFuture<'a, Result<Vec<String>>>;

	fn get_field_values<'a>(
		&'a self,
		field: &'a str,
		prefix: Option<&'a str>,
	) -> BoxFuture<'a, Result<Vec<String>>>;

	fn get_documents_by_id<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, Result<Vec<Document>>>;

	fn execute_query<'a>(&'a self, query: &'a ExpandedQuery) -> BoxFuture<'a, Result<QueryResult>>;
}

pub trait QueryInterfaceFactory
where
	Self: Send + Sync,
{
	fn build(&self, endpoint: &SearchEndpoint) -> Result<Arc<dyn QueryInterface>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
	pub success: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub errno: Option<i32>,
}
impl ConnectionStatus {
	pub fn ok(message: impl Into<String>) -> Self {
		Self { success: true, message: Some(message.into()), errno: None }
	}

	pub fn failed(err: &Error) -> Self {
		Self { success: false, message: Some(err.to_string()), errno: err.errno() }
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFilters {
	pub aggregatable: Option<bool>,
	pub searchable: Option<bool>,
	#[serde(rename = "type")]
	pub field_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
	pub id: String,
	pub source: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
	pub id: String,
	pub explanation: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
	pub took_ms: i64,
	pub total_results: i64,
	pub results: Vec<SearchHit>,
}
impl QueryResult {
	pub fn ids(&self) -> Vec<String> {
		self.results.iter().map(|hit| hit.id.clone()).collect()
	}
}

/// Builds reqwest-backed interfaces for the implemented backend types.
pub struct HttpQueryInterfaceFactory {
	timeout: Duration,
}
impl HttpQueryInterfaceFactory {
	pub fn new(cfg: &ranklab_config::Backends) -> Self {
		Self { timeout: Duration::from_millis(cfg.timeout_ms) }
	}
}
impl QueryInterfaceFactory for HttpQueryInterfaceFactory {
	fn build(&self, endpoint: &SearchEndpoint) -> Result<Arc<dyn QueryInterface>> {
		match endpoint.backend {
			BackendType::Elasticsearch | BackendType::OpenSearch => Ok(Arc::new(
				elasticsearch::ElasticsearchInterface::new(endpoint.clone(), self.timeout)?,
			)),
			BackendType::Solr =>
				Ok(Arc::new(solr::SolrInterface::new(endpoint.clone(), self.timeout)?)),
			backend @ (BackendType::Vespa | BackendType::RedisSearch) =>
				Err(Error::Unimplemented { backend }),
		}
	}
}

pub(crate) fn http_client(timeout: Duration, verify_tls: bool) -> Result<Client> {
	Ok(Client::builder().timeout(timeout).danger_accept_invalid_certs(!verify_tls).build()?)
}

pub(crate) fn with_credentials(
	request: RequestBuilder,
	endpoint: &SearchEndpoint,
) -> RequestBuilder {
	match &endpoint.credentials {
		Some(credentials) => request.basic_auth(&credentials.username, Some(&credentials.password)),
		None => request,
	}
}

/// Returns the response body as JSON, or the classified failure for non-2xx statuses.
pub(crate) async fn read_json(response: Response) -> Result<Value> {
	let response = ensure_success(response).await?;

	Ok(response.json().await?)
}

pub(crate) async fn ensure_success(response: Response) -> Result<Response> {
	let status = response.status();

	if status.is_success() {
		return Ok(response);
	}

	let body = response.text().await.unwrap_or_default();

	Err(error::classify_failure(status.as_u16(), &body))
}

/// Document ids arrive as strings from Elasticsearch but may be numeric in Solr.
pub(crate) fn id_string(value: &Value) -> Option<String> {
	match value {
		Value::String(raw) => Some(raw.clone()),
		Value::Number(number) => Some(number.to_string()),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn endpoint(backend: BackendType) -> SearchEndpoint {
		SearchEndpoint {
			search_endpoint_id: Default::default(),
			backend,
			url: "http://127.0.0.1:9200".to_string(),
			index: "products".to_string(),
			verify_tls: true,
			credentials: None,
		}
	}

	#[test]
	fn unimplemented_backends_fail_at_construction() {
		let factory = HttpQueryInterfaceFactory::new(&ranklab_config::Backends::default());

		for backend in [BackendType::Vespa, BackendType::RedisSearch] {
			assert!(matches!(factory.build(&endpoint(backend)), Err(Error::Unimplemented { .. })));
		}
		for backend in [BackendType::Elasticsearch, BackendType::OpenSearch, BackendType::Solr] {
			assert!(factory.build(&endpoint(backend)).is_ok());
		}
	}

	#[test]
	fn numeric_ids_are_stringified() {
		assert_eq!(id_string(&serde_json::json!(42)), Some("42".to_string()));
		assert_eq!(id_string(&serde_json::json!("doc-1")), Some("doc-1".to_string()));
		assert_eq!(id_string(&Value::Null), None);
	}
}
