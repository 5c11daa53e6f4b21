use std::collections::BTreeMap;

use serde_json::Value;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use ranklab_domain::{percentile::LatencySummary, rules::RulesetVersion};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SearchEndpointRow {
	pub search_endpoint_id: Uuid,
	pub name: String,
	pub endpoint_type: String,
	pub url: String,
	pub index_name: String,
	pub verify_tls: bool,
	/// Sealed `username:password`, see `ranklab_domain::credentials`.
	pub credentials: Option<String>,
}

/// Everything an execution run needs, resolved from one search configuration.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
	pub search_configuration_id: Uuid,
	pub project_id: Uuid,
	pub endpoint: SearchEndpointRow,
	pub template: String,
	/// Defaults carried by the query template.
	pub template_knobs: Value,
	pub knobs: Value,
	pub ltr_model: Option<String>,
	pub ruleset_versions: Vec<RulesetVersion>,
}

#[derive(Debug, Clone)]
pub struct NewExecution {
	pub execution_id: Uuid,
	pub search_configuration_id: Uuid,
	pub project_id: Uuid,
	pub meta: LatencySummary,
	pub combined_score: Option<f64>,
	pub all_scores: BTreeMap<String, f64>,
	/// Stored in this order; the position is kept on each row.
	pub phrases: Vec<NewSearchPhraseExecution>,
}

#[derive(Debug, Clone)]
pub struct NewSearchPhraseExecution {
	pub search_phrase_execution_id: Uuid,
	pub phrase: String,
	pub took_ms: i64,
	pub total_results: i64,
	pub results: Value,
	pub error: Option<String>,
	pub combined_score: Option<f64>,
	pub all_scores: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExecutionRow {
	pub execution_id: Uuid,
	pub search_configuration_id: Uuid,
	pub project_id: Uuid,
	pub meta: Json<LatencySummary>,
	pub combined_score: Option<f64>,
	pub all_scores: Json<BTreeMap<String, f64>>,
	pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SearchPhraseExecutionRow {
	pub search_phrase_execution_id: Uuid,
	pub execution_id: Uuid,
	pub position: i32,
	pub phrase: String,
	pub took_ms: i64,
	pub total_results: i64,
	pub results: Value,
	pub error: Option<String>,
	pub combined_score: Option<f64>,
	pub all_scores: Option<Json<BTreeMap<String, f64>>>,
}

#[derive(Debug, Clone)]
pub struct ExecutionRecord {
	pub execution: ExecutionRow,
	pub phrases: Vec<SearchPhraseExecutionRow>,
}
