use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use crate::{
	BoxFuture, ConnectionStatus, Document, Error, ExpandedQuery, FIELD_VALUES_LIMIT, FieldFilters,
	QueryInterface, QueryResult, Result, SearchHit,
};
use ranklab_domain::endpoint::SearchEndpoint;

const ID_FIELD: &str = "id";
// ASCII unit separator. Commas and whitespace are legal inside document ids.
const TERMS_SEPARATOR: char = '\u{1f}';

pub struct SolrInterface {
	client: Client,
	endpoint: SearchEndpoint,
}
impl SolrInterface {
	pub fn new(endpoint: SearchEndpoint, timeout: Duration) -> Result<Self> {
		let client = crate::http_client(timeout, endpoint.verify_tls)?;

		Ok(Self { client, endpoint })
	}

	fn get(&self, handler: &str) -> RequestBuilder {
		let url = format!("{}/solr/{}{handler}", self.endpoint.base_url(), self.endpoint.index);

		crate::with_credentials(self.client.get(url), &self.endpoint)
	}

	async fn ping(&self) -> Result<String> {
		let response = self.get("/admin/ping").query(&[("wt", "json")]).send().await?;
		let json = crate::read_json(response).await?;

		match json.get("status").and_then(Value::as_str) {
			Some("OK") => Ok(format!("Solr core {} is reachable.", self.endpoint.index)),
			other => Err(Error::invalid_response(format!(
				"Ping returned status {}.",
				other.unwrap_or("unknown")
			))),
		}
	}

	// Any stored field can be queried in Solr, so the filters do not narrow the list.
	async fn fields(&self) -> Result<Vec<String>> {
		let response = self
			.get("/select")
			.query(&[("q", "*:*"), ("rows", "0"), ("fl", "*"), ("wt", "csv")])
			.send()
			.await?;
		let header = crate::ensure_success(response).await?.text().await?;

		Ok(parse_csv_header(&header))
	}

	async fn field_values(&self, field: &str, prefix: Option<&str>) -> Result<Vec<String>> {
		let limit = FIELD_VALUES_LIMIT.to_string();
		let mut params = vec![
			("q", "*:*"),
			("rows", "0"),
			("facet", "true"),
			("facet.field", field),
			("facet.limit", limit.as_str()),
			("facet.mincount", "1"),
			("wt", "json"),
		];

		if let Some(prefix) = prefix.filter(|prefix| !prefix.is_empty()) {
			params.push(("facet.prefix", prefix));
		}

		let response = self.get("/select").query(&params).send().await?;

		parse_facet_values(&crate::read_json(response).await?, field)
	}

	async fn documents(&self, ids: &[String]) -> Result<Vec<Document>> {
		if ids.is_empty() {
			return Ok(Vec::new());
		}

		let q = terms_query(ids);
		let rows = ids.len().to_string();
		let response = self
			.get("/select")
			.query(&[("q", q.as_str()), ("rows", rows.as_str()), ("wt", "json")])
			.send()
			.await?;

		parse_documents(&crate::read_json(response).await?)
	}

	async fn search(&self, query: &ExpandedQuery) -> Result<QueryResult> {
		let solr = query.solr().ok_or_else(|| {
			Error::invalid_template(format!(
				"Query expanded for {} cannot run on solr.",
				query.backend()
			))
		})?;
		let response = self
			.get(&solr.handler)
			.query(&solr.params)
			.query(&[("debug", "results"), ("wt", "json")])
			.send()
			.await?;

		parse_select_response(&crate::read_json(response).await?)
	}
}
impl QueryInterface for SolrInterface {
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

	fn get_fields<'a>(&'a self, _filters: &'a FieldFilters) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(self.fields())
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

fn parse_csv_header(body: &str) -> Vec<String> {
	let header = body.lines().next().unwrap_or_default();
	let mut fields: Vec<String> = header
		.split(',')
		.map(|field| field.trim().trim_matches('"').to_string())
		.filter(|field| !field.is_empty() && !field.starts_with('_'))
		.collect();

	fields.sort();
	fields.dedup();

	fields
}

fn parse_facet_values(json: &Value, field: &str) -> Result<Vec<String>> {
	let counts = json
		.pointer("/facet_counts/facet_fields")
		.and_then(|fields| fields.get(field))
		.and_then(Value::as_array)
		.ok_or_else(|| Error::invalid_response(format!("Facet response is missing {field}.")))?;

	// Solr interleaves values and counts: [value, count, value, count, ...].
	Ok(counts.iter().step_by(2).filter_map(crate::id_string).take(FIELD_VALUES_LIMIT).collect())
}

fn parse_documents(json: &Value) -> Result<Vec<Document>> {
	let docs = json
		.pointer("/response/docs")
		.and_then(Value::as_array)
		.ok_or_else(|| Error::invalid_response("Select response is missing docs."))?;

	Ok(docs
		.iter()
		.filter_map(|doc| {
			let id = doc.get(ID_FIELD).and_then(crate::id_string)?;

			Some(Document { id, source: doc.clone() })
		})
		.collect())
}

fn parse_select_response(json: &Value) -> Result<QueryResult> {
	let took_ms = json.pointer("/responseHeader/QTime").and_then(Value::as_i64).unwrap_or(0);
	let response = json
		.get("response")
		.ok_or_else(|| Error::invalid_response("Select response is missing response."))?;
	let total_results = response.get("numFound").and_then(Value::as_i64).unwrap_or(0);
	let explain = json.pointer("/debug/explain");
	let mut results = Vec::new();

	for doc in response.get("docs").and_then(Value::as_array).into_iter().flatten() {
		let id = doc
			.get(ID_FIELD)
			.and_then(crate::id_string)
			.ok_or_else(|| Error::invalid_response("Select hit is missing id."))?;
		let explanation =
			explain.and_then(|explain| explain.get(&id)).cloned().unwrap_or(Value::Null);

		results.push(SearchHit { id, explanation });
	}

	Ok(QueryResult { took_ms, total_results, results })
}

fn terms_query(ids: &[String]) -> String {
	let separator = TERMS_SEPARATOR.to_string();

	format!("{{!terms f={ID_FIELD} separator='{TERMS_SEPARATOR}'}}{}", ids.join(&separator))
}
