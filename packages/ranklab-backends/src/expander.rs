//! Query expansion: template, active rules, knobs and phrase in; a backend-ready query out.
//!
//! [`ExpandedQuery`] can only be produced here, so a query interface never sees a hand-built
//! request body.

use std::time::Duration;

use reqwest::Client;
use serde_json::{Map, Value};

use crate::{BoxFuture, Error, Result};
use ranklab_domain::{endpoint::BackendType, rules::ActiveRule};

const PLACEHOLDER_OPEN: &str = "#$";
const PLACEHOLDER_CLOSE: &str = "##";
const QUERY_PLACEHOLDER: &str = "query";
const DEFAULT_SOLR_HANDLER: &str = "/select";

pub trait QueryExpander
where
	Self: Send + Sync,
{
	fn expand<'a>(
		&'a self,
		request: &'a ExpansionRequest<'a>,
	) -> BoxFuture<'a, Result<ExpandedQuery>>;
}

pub struct ExpansionRequest<'a> {
	pub backend: BackendType,
	pub template: &'a str,
	/// Enabled rules with only their enabled instructions.
	pub rules: &'a [ActiveRule],
	pub knobs: &'a Value,
	pub ltr_model: Option<&'a str>,
	pub phrase: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedQuery {
	inner: Expanded,
}
impl ExpandedQuery {
	pub fn backend(&self) -> BackendType {
		match &self.inner {
			Expanded::Json { backend, .. } => *backend,
			Expanded::Solr(_) => BackendType::Solr,
		}
	}

	/// Rendering used for previews and logs.
	pub fn to_json(&self) -> Value {
		match &self.inner {
			Expanded::Json { body, .. } => body.clone(),
			Expanded::Solr(query) => {
				// Pairs, since Solr parameters such as `fq` may repeat.
				let params: Vec<Value> = query
					.params
					.iter()
					.map(|(key, value)| serde_json::json!([key, value]))
					.collect();

				serde_json::json!({ "handler": query.handler, "params": params })
			},
		}
	}

	pub(crate) fn json_body(&self) -> Option<&Value> {
		match &self.inner {
			Expanded::Json { body, .. } => Some(body),
			Expanded::Solr(_) => None,
		}
	}

	pub(crate) fn solr(&self) -> Option<&SolrQuery> {
		match &self.inner {
			Expanded::Solr(query) => Some(query),
			Expanded::Json { .. } => None,
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
enum Expanded {
	Json { backend: BackendType, body: Value },
	Solr(SolrQuery),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SolrQuery {
	pub(crate) handler: String,
	pub(crate) params: Vec<(String, String)>,
}

/// Expands Solr templates locally and posts Elasticsearch and OpenSearch templates to the
/// configured expansion service.
pub struct DefaultExpander {
	client: Client,
	url: String,
}
impl DefaultExpander {
	pub fn new(cfg: &ranklab_config::Expander) -> Result<Self> {
		let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;

		Ok(Self { client, url: format!("{}{}", cfg.api_base, cfg.path) })
	}

	async fn expand_remote(&self, request: &ExpansionRequest<'_>) -> Result<ExpandedQuery> {
		let rules: Vec<&ranklab_domain::rules::Rule> =
			request.rules.iter().map(ActiveRule::rule).collect();
		let body = serde_json::json!({
			"type": request.backend,
			"query_template": request.template,
			"rules": rules,
			"knobs": request.knobs,
			"ltr_model": request.ltr_model,
			"search_phrase": request.phrase,
		});
		let response = self.client.post(&self.url).json(&body).send().await?;
		let status = response.status();
		let text = response.text().await?;

		if !status.is_success() {
			return Err(Error::Expansion { message: text });
		}

		let json: Value = serde_json::from_str(&text)
			.map_err(|err| Error::Expansion { message: format!("{err}: {text}") })?;
		let query = json
			.get("query")
			.filter(|query| query.is_object())
			.cloned()
			.ok_or_else(|| Error::Expansion { message: text.clone() })?;

		Ok(ExpandedQuery { inner: Expanded::Json { backend: request.backend, body: query } })
	}
}
impl QueryExpander for DefaultExpander {
	fn expand<'a>(
		&'a self,
		request: &'a ExpansionRequest<'a>,
	) -> BoxFuture<'a, Result<ExpandedQuery>> {
		Box::pin(async move {
			match request.backend {
				BackendType::Elasticsearch | BackendType::OpenSearch =>
					self.expand_remote(request).await,
				BackendType::Solr => expand_solr(request),
				backend @ (BackendType::Vespa | BackendType::RedisSearch) =>
					Err(Error::Unimplemented { backend }),
			}
		})
	}
}

/// Substitutes `#$query##` and `#$<knob>##` inside a Solr query-string template.
///
/// A template may start with a request handler path (`/browse?q=...`); `/select` is used
/// otherwise. Substitution happens on decoded parameter values, so the phrase is sent verbatim.
pub fn expand_solr(request: &ExpansionRequest<'_>) -> Result<ExpandedQuery> {
	let template = request.template.trim();
	let (handler, query_string) = match template.strip_prefix('/') {
		Some(_) => match template.split_once('?') {
			Some((handler, rest)) => (handler.to_string(), rest),
			None => (template.to_string(), ""),
		},
		None => (DEFAULT_SOLR_HANDLER.to_string(), template.trim_start_matches('?')),
	};
	let knobs = match request.knobs {
		Value::Object(map) => map.clone(),
		Value::Null => Map::new(),
		_ => return Err(Error::invalid_template("Knobs must be a JSON object.")),
	};
	let mut params = Vec::new();

	for (key, value) in url::form_urlencoded::parse(query_string.as_bytes()) {
		params.push((key.into_owned(), substitute(&value, request.phrase, &knobs)?));
	}

	if !params.iter().any(|(key, _)| key == "q") {
		return Err(Error::invalid_template("Solr template must set the `q` parameter."));
	}
	if let Some(model) = request.ltr_model {
		params.push(("rq".to_string(), format!("{{!ltr model={model}}}")));
	}
	if !request.rules.is_empty() {
		tracing::debug!(
			rule_count = request.rules.len(),
			"Solr expansion leaves rule handling to the backend."
		);
	}

	Ok(ExpandedQuery { inner: Expanded::Solr(SolrQuery { handler, params }) })
}

fn substitute(value: &str, phrase: &str, knobs: &Map<String, Value>) -> Result<String> {
	let mut out = String::with_capacity(value.len() + phrase.len());
	let mut rest = value;

	while let Some(start) = rest.find(PLACEHOLDER_OPEN) {
		out.push_str(&rest[..start]);

		let after = &rest[start + PLACEHOLDER_OPEN.len()..];
		let Some(end) = after.find(PLACEHOLDER_CLOSE) else {
			return Err(Error::invalid_template(format!("Unterminated placeholder in `{value}`.")));
		};
		let name = &after[..end];

		if name == QUERY_PLACEHOLDER {
			out.push_str(phrase);
		} else {
			out.push_str(&knob_value(knobs, name)?);
		}

		rest = &after[end + PLACEHOLDER_CLOSE.len()..];
	}

	out.push_str(rest);

	Ok(out)
}

fn knob_value(knobs: &Map<String, Value>, name: &str) -> Result<String> {
	match knobs.get(name) {
		Some(Value::String(raw)) => Ok(raw.clone()),
		Some(Value::Number(number)) => Ok(number.to_string()),
		Some(Value::Bool(flag)) => Ok(flag.to_string()),
		Some(_) => Err(Error::invalid_template(format!("Knob `{name}` must be a scalar."))),
		None => Err(Error::invalid_template(format!("Knob `{name}` is not set."))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn solr_request<'a>(
		template: &'a str,
		knobs: &'a Value,
		phrase: &'a str,
	) -> ExpansionRequest<'a> {
		ExpansionRequest {
			backend: BackendType::Solr,
			template,
			rules: &[],
			knobs,
			ltr_model: None,
			phrase,
		}
	}

	#[test]
	fn substitutes_phrase_and_knobs() {
		let knobs = serde_json::json!({ "qf": "title^2 body", "rows": 10 });
		let query = expand_solr(&solr_request(
			"q=#$query##&defType=edismax&qf=#$qf##&rows=#$rows##",
			&knobs,
			"bluetooth & speaker",
		))
		.expect("Failed to expand.");
		let solr = query.solr().expect("Expected a Solr query.");

		assert_eq!(solr.handler, "/select");
		assert_eq!(
			solr.params,
			vec![
				("q".to_string(), "bluetooth & speaker".to_string()),
				("defType".to_string(), "edismax".to_string()),
				("qf".to_string(), "title^2 body".to_string()),
				("rows".to_string(), "10".to_string()),
			]
		);
	}

	#[test]
	fn leading_handler_path_is_kept() {
		let query = expand_solr(&solr_request("/browse?q=#$query##", &Value::Null, "speaker"))
			.expect("Failed to expand.");

		assert_eq!(query.solr().map(|solr| solr.handler.as_str()), Some("/browse"));
		assert_eq!(query.to_json()["params"][0], serde_json::json!(["q", "speaker"]));
	}

	#[test]
	fn missing_knob_is_rejected() {
		let err = expand_solr(&solr_request("q=#$query##&mm=#$mm##", &Value::Null, "x"))
			.expect_err("Expected missing knob.");

		assert!(matches!(err, Error::InvalidTemplate { .. }));
	}

	#[test]
	fn ltr_model_adds_rerank_query() {
		let mut request = solr_request("q=#$query##", &Value::Null, "x");

		request.ltr_model = Some("products_v2");

		let query = expand_solr(&request).expect("Failed to expand.");

		assert_eq!(
			query.to_json()["params"][1],
			serde_json::json!(["rq", "{!ltr model=products_v2}"])
		);
	}
}
