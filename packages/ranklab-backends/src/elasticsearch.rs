//! Elasticsearch and OpenSearch over their shared REST surface.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;

use crate::{
	BoxFuture, ConnectionStatus, Document, Error, ExpandedQuery, FIELD_VALUES_LIMIT, FieldFilters,
	QueryInterface, QueryResult, Result, SearchHit,
};
use ranklab_domain::endpoint::SearchEndpoint;

// Characters with a meaning in Lucene regular expressions.
const LUCENE_REGEX_RESERVED: &[char] = &[
	'.', '?', '+', '*', '|', '{', '}', '[', ']', '(', ')', '"', '\\', '#', '@', '&', '<', '>', '~',
];

pub struct ElasticsearchInterface {
	client: Client,
	endpoint: SearchEndpoint,
}
impl ElasticsearchInterface {
	pub fn new(endpoint: SearchEndpoint, timeout: Duration) -> Result<Self> {
		let client = crate::http_client(timeout, endpoint.verify_tls)?;

		Ok(Self { client, endpoint })
	}

	fn request(&self, method: Method, path: &str) -> RequestBuilder {
		let url = format!("{}{path}", self.endpoint.base_url());

		crate::with_credentials(self.client.request(method, url), &self.endpoint)
	}

	fn index_path(&self, suffix: &str) -> String {
		format!("/{}/{suffix}", self.endpoint.index)
	}

	async fn ping(&self) -> Result<String> {
		let json = crate::read_json(self.request(Method::GET, "/").send().await?).await?;
		let cluster = json.get("cluster_name").and_then(Value::as_str).unwrap_or("unknown");
		let version = json.pointer("/version/number").and_then(Value::as_str).unwrap_or("unknown");

		Ok(format!("Connected to cluster {cluster} (version {version})."))
	}

	async fn fields(&self, filters: &FieldFilters) -> Result<Vec<String>> {
		let response = self
			.request(Method::GET, &self.index_path("_field_caps"))
			.query(&[("fields", "*")])
			.send()
			.await?;

		parse_field_caps(&crate::read_json(response).await?, filters)
	}

	async fn field_values(&self, field: &str, prefix: Option<&str>) -> Result<Vec<String>> {
		let mut terms = serde_json::json!({ "field": field, "size": FIELD_VALUES_LIMIT });

		if let Some(prefix) = prefix.filter(|prefix| !prefix.is_empty()) {
			terms["include"] = Value::String(format!("{}.*", escape_lucene_regex(prefix)));
		}

		let body = serde_json::json!({ "size": 0, "aggs": { "values": { "terms": terms } } });
		let response =
			self.request(Method::POST, &self.index_path("_search")).json(&body).send().await?;

		parse_terms_buckets(&crate::read_json(response).await?)
	}

	async fn documents(&self, ids: &[String]) -> Result<Vec<Document>> {
		if ids.is_empty() {
			return Ok(Vec::new());
		}

		let body = serde_json::json!({ "ids": ids });
		let response =
			self.request(Method::POST, &self.index_path("_mget")).json(&body).send().await?;

		parse_mget(&crate::read_json(response).await?)
	}

	async fn search(&self, query: &ExpandedQuery) -> Result<QueryResult> {
		let body = query.json_body().ok_or_else(|| {
			Error::invalid_template(format!(
				"Query expanded for {} cannot run on {}.",
				query.backend(),
				self.endpoint.backend
			))
		})?;
		let response = self
			.request(Method::POST, &self.index_path("_search"))
			.query(&[("explain", "true")])
			.json(body)
			.send()
			.await?;

		parse_search_response(&crate::read_json(response).await?)
	}
}
impl QueryInterface for ElasticsearchInterface {
	fn test_connection(&self) -> BoxFuture<'_, ConnectionStatus> {
		Box::pin(async move {
			match self.ping().await {
				Ok(message) => ConnectionStatus::ok(message),
				Err(err) => {
					tracing::warn!(
						endpoint = %self.endpoint.search_endpoint_id,
						error = %err,
						"Search endpoint connection test failed."
					);

					ConnectionStatus::failed(&err)
				},
			}
		})
	}

	fn get_fields<'a>(&'a self, filters: &'a FieldFilters) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(self.fields(filters))
	}

	fn get_field_values<'a>(
		&'a self,
		field: &'a str,
		prefix: Option<&'a str>,
	) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(self.field_values(field, prefix))
	}

	fn get_documents_by_id<'a>(
		&'a self,
		ids: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Document>>> {
		Box::pin(self.documents(ids))
	}

	fn execute_query<'a>(&'a self, query: &'a ExpandedQuery) -> BoxFuture<'a, Result<QueryResult>> {
		Box::pin(self.search(query))
	}
}

fn escape_lucene_regex(raw: &str) -> String {
	let mut out = String::with_capacity(raw.len() * 2);

	for ch in raw.chars() {
		if LUCENE_REGEX_RESERVED.contains(&ch) {
			out.push('\\');
		}

		out.push(ch);
	}

	out
}

fn parse_field_caps(json: &Value, filters: &FieldFilters) -> Result<Vec<String>> {
	let fields = json
		.get("fields")
		.and_then(Value::as_object)
		.ok_or_else(|| Error::invalid_response("Field capabilities response is missing fields."))?;
	let mut names = Vec::new();

	for (name, by_type) in fields {
		if name.starts_with('_') {
			continue;
		}

		let Some(by_type) = by_type.as_object() else {
			continue;
		};
		let keep = by_type.iter().any(|(field_type, caps)| {
			let flag = |key: &str| caps.get(key).and_then(Value::as_bool).unwrap_or(false);

			filters.field_type.as_deref().is_none_or(|wanted| wanted == field_type.as_str())
				&& filters.aggregatable.is_none_or(|wanted| wanted == flag("aggregatable"))
				&& filters.searchable.is_none_or(|wanted| wanted == flag("searchable"))
		});

		if keep {
			names.push(name.clone());
		}
	}

	names.sort();

	Ok(names)
}

fn parse_terms_buckets(json: &Value) -> Result<Vec<String>> {
	let buckets = json
		.pointer("/aggregations/values/buckets")
		.and_then(Value::as_array)
		.ok_or_else(|| Error::invalid_response("Terms aggregation response is missing buckets."))?;

	Ok(buckets
		.iter()
		.filter_map(|bucket| {
			bucket
				.get("key_as_string")
				.and_then(Value::as_str)
				.map(str::to_string)
				.or_else(|| bucket.get("key").and_then(crate::id_string))
		})
		.take(FIELD_VALUES_LIMIT)
		.collect())
}

fn parse_mget(json: &Value) -> Result<Vec<Document>> {
	let docs = json
		.get("docs")
		.and_then(Value::as_array)
		.ok_or_else(|| Error::invalid_response("Multi-get response is missing docs."))?;

	Ok(docs
		.iter()
		.filter(|doc| doc.get("found").and_then(Value::as_bool).unwrap_or(false))
		.filter_map(|doc| {
			let id = doc.get("_id").and_then(crate::id_string)?;
			let source = doc.get("_source").cloned().unwrap_or(Value::Null);

			Some(Document { id, source })
		})
		.collect())
}

fn parse_search_response(json: &Value) -> Result<QueryResult> {
	let took_ms = json.get("took").and_then(Value::as_i64).unwrap_or(0);
	let hits = json
		.get("hits")
		.ok_or_else(|| Error::invalid_response("Search response is missing hits."))?;
	let total = hits.get("total");
	let total_results = total
		.and_then(|total| total.get("value"))
		.and_then(Value::as_i64)
		.or_else(|| total.and_then(Value::as_i64))
		.unwrap_or(0);
	let mut results = Vec::new();

	for hit in hits.get("hits").and_then(Value::as_array).into_iter().flatten() {
		let id = hit
			.get("_id")
			.and_then(crate::id_string)
			.ok_or_else(|| Error::invalid_response("Search hit is missing _id."))?;
		let explanation = hit.get("_explanation").cloned().unwrap_or(Value::Null);

		results.push(SearchHit { id, explanation });
	}

	Ok(QueryResult { took_ms, total_results, results })
}
