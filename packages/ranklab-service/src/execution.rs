//! Execution runs: score one search configuration against its combined judgements.
//!
//! A run walks `Init -> ConnectionVerified -> SmokeTested -> PhrasesProcessed -> Persisted`. A
//! failed connection test or smoke test ends the run before anything is written.

use std::{collections::BTreeMap, fmt, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, RanklabService, Result};
use ranklab_backends::{ExpansionRequest, QueryExpander, QueryInterface, QueryResult, SearchHit};
use ranklab_domain::{
	endpoint::BackendType,
	judgement::CombinedJudgementPhrase,
	percentile::LatencySummary,
	rules::{self, ActiveRule},
	scorers::{self, PhraseScores},
};
use ranklab_storage::{
	models::{ExecutionRecord, NewExecution, NewSearchPhraseExecution, SearchPhraseExecutionRow},
	queries,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
	Init,
	ConnectionVerified,
	SmokeTested,
	PhrasesProcessed,
	Persisted,
	ConnectionFailed,
	SmokeTestFailed,
}
impl ExecutionState {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Init => "init",
			Self::ConnectionVerified => "connection_verified",
			Self::SmokeTested => "smoke_tested",
			Self::PhrasesProcessed => "phrases_processed",
			Self::Persisted => "persisted",
			Self::ConnectionFailed => "connection_failed",
			Self::SmokeTestFailed => "smoke_test_failed",
		}
	}

	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Persisted | Self::ConnectionFailed | Self::SmokeTestFailed)
	}
}
impl fmt::Display for ExecutionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Per-phrase retry budget with linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Total attempts, the first one included.
	pub max_attempts: u32,
	pub backoff: Duration,
}
impl RetryPolicy {
	pub fn from_config(cfg: &ranklab_config::Execution) -> Self {
		Self {
			max_attempts: cfg.max_attempts,
			backoff: Duration::from_millis(cfg.retry_backoff_ms),
		}
	}

	/// Sleep after failed attempt number `attempt` (1-based).
	pub fn delay_after(&self, attempt: u32) -> Duration {
		self.backoff.saturating_mul(attempt)
	}
}

/// Everything one run needs once the search configuration has been resolved.
pub struct RunInput<'a> {
	pub search_configuration_id: Uuid,
	pub backend: BackendType,
	pub template: &'a str,
	pub rules: &'a [ActiveRule],
	pub knobs: &'a Value,
	pub ltr_model: Option<&'a str>,
	pub smoke_test_phrase: &'a str,
	/// Phrases run in this order.
	pub judgements: &'a [CombinedJudgementPhrase],
}
impl RunInput<'_> {
	fn expansion<'a>(&'a self, phrase: &'a str) -> ExpansionRequest<'a> {
		ExpansionRequest {
			backend: self.backend,
			template: self.template,
			rules: self.rules,
			knobs: self.knobs,
			ltr_model: self.ltr_model,
			phrase,
		}
	}
}

#[derive(Debug, Clone)]
pub struct PhraseOutcome {
	pub phrase: String,
	pub took_ms: i64,
	pub total_results: i64,
	pub results: Vec<SearchHit>,
	/// Last failure message once every attempt failed.
	pub error: Option<String>,
	/// Present when the phrase ran and has at least one judged document.
	pub scores: Option<PhraseScores>,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
	pub phrases: Vec<PhraseOutcome>,
	pub meta: LatencySummary,
	pub combined_score: Option<f64>,
	pub all_scores: BTreeMap<String, f64>,
}
impl RunOutcome {
	fn into_new_execution(
		self,
		execution_id: Uuid,
		search_configuration_id: Uuid,
		project_id: Uuid,
	) -> NewExecution {
		let phrases = self
			.phrases
			.into_iter()
			.map(|phrase| {
				let results: Vec<Value> = phrase
					.results
					.iter()
					.map(|hit| serde_json::json!({ "id": hit.id, "explanation": hit.explanation }))
					.collect();
				let (combined_score, all_scores) = match phrase.scores {
					Some(scores) => (Some(scores.combined_score), Some(scores.all_scores)),
					None => (None, None),
				};

				NewSearchPhraseExecution {
					search_phrase_execution_id: Uuid::new_v4(),
					phrase: phrase.phrase,
					took_ms: phrase.took_ms,
					total_results: phrase.total_results,
					results: Value::Array(results),
					error: phrase.error,
					combined_score,
					all_scores,
				}
			})
			.collect();

		NewExecution {
			execution_id,
			search_configuration_id,
			project_id,
			meta: self.meta,
			combined_score: self.combined_score,
			all_scores: self.all_scores,
			phrases,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateExecutionRequest {
	pub search_configuration_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetExecutionRequest {
	pub execution_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
	pub execution_id: Uuid,
	pub search_configuration_id: Uuid,
	pub project_id: Uuid,
	pub meta: LatencySummary,
	pub combined_score: Option<f64>,
	pub all_scores: BTreeMap<String, f64>,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	pub search_phrase_executions: Vec<SearchPhraseExecution>,
}
impl From<ExecutionRecord> for Execution {
	fn from(record: ExecutionRecord) -> Self {
		let execution = record.execution;

		Self {
			execution_id: execution.execution_id,
			search_configuration_id: execution.search_configuration_id,
			project_id: execution.project_id,
			meta: execution.meta.0,
			combined_score: execution.combined_score,
			all_scores: execution.all_scores.0,
			created_at: execution.created_at,
			search_phrase_executions: record.phrases.into_iter().map(Into::into).collect(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchPhraseExecution {
	pub search_phrase_execution_id: Uuid,
	pub execution_id: Uuid,
	pub phrase: String,
	pub took_ms: i64,
	pub total_results: i64,
	pub results: Value,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	pub combined_score: Option<f64>,
	pub all_scores: Option<BTreeMap<String, f64>>,
}
impl From<SearchPhraseExecutionRow> for SearchPhraseExecution {
	fn from(row: SearchPhraseExecutionRow) -> Self {
		Self {
			search_phrase_execution_id: row.search_phrase_execution_id,
			execution_id: row.execution_id,
			phrase: row.phrase,
			took_ms: row.took_ms,
			total_results: row.total_results,
			results: row.results,
			error: row.error,
			combined_score: row.combined_score,
			all_scores: row.all_scores.map(|scores| scores.0),
		}
	}
}

impl RanklabService {
	pub async fn create_execution(&self, req: CreateExecutionRequest) -> Result<Execution> {
		let plan = queries::load_execution_plan(&self.db, req.search_configuration_id).await?;
		let endpoint = self.resolve_endpoint(&plan.endpoint)?;
		let interface = self.backends.interfaces.build(&endpoint)?;
		let rules = rules::active_rules(&plan.ruleset_versions);
		let knobs = crate::merge_knobs(&plan.template_knobs, &plan.knobs);
		let judgements =
			queries::combined_judgements(&self.db, plan.search_configuration_id).await?;
		let input = RunInput {
			search_configuration_id: plan.search_configuration_id,
			backend: endpoint.backend,
			template: &plan.template,
			rules: &rules,
			knobs: &knobs,
			ltr_model: plan.ltr_model.as_deref(),
			smoke_test_phrase: &self.cfg.execution.smoke_test_phrase,
			judgements: &judgements,
		};
		let retry = RetryPolicy::from_config(&self.cfg.execution);
		let outcome =
			run_phrases(&input, interface.as_ref(), self.backends.expander.as_ref(), &retry).await?;
		let execution_id = Uuid::new_v4();
		let new_execution =
			outcome.into_new_execution(execution_id, plan.search_configuration_id, plan.project_id);

		queries::insert_execution(&self.db, &new_execution).await?;
		log_state(plan.search_configuration_id, ExecutionState::Persisted);
		tracing::info!(
			execution_id = %execution_id,
			combined_score = ?new_execution.combined_score,
			phrase_count = new_execution.phrases.len(),
			"Execution stored."
		);

		self.get_execution(GetExecutionRequest { execution_id }).await
	}

	pub async fn get_execution(&self, req: GetExecutionRequest) -> Result<Execution> {
		let record = queries::get_execution(&self.db, req.execution_id).await?;

		Ok(record.into())
	}
}

/// Runs the connection test, the smoke test and every judged phrase, then aggregates the scores.
///
/// Phrases run one after another. A phrase that fails every attempt is kept with its last error
/// and no results.
pub async fn run_phrases(
	input: &RunInput<'_>,
	interface: &dyn QueryInterface,
	expander: &dyn QueryExpander,
	retry: &RetryPolicy,
) -> Result<RunOutcome> {
	let id = input.search_configuration_id;

	log_state(id, ExecutionState::Init);

	let status = interface.test_connection().await;

	if !status.success {
		log_state(id, ExecutionState::ConnectionFailed);

		return Err(Error::ConnectionFailed {
			message: status
				.message
				.unwrap_or_else(|| "Search endpoint did not accept the connection.".to_string()),
			errno: status.errno,
		});
	}

	log_state(id, ExecutionState::ConnectionVerified);

	if let Err(err) = expand_and_execute(input, input.smoke_test_phrase, interface, expander).await
	{
		log_state(id, ExecutionState::SmokeTestFailed);

		return Err(Error::SmokeTestFailed { message: err.to_string(), errno: err.errno() });
	}

	log_state(id, ExecutionState::SmokeTested);

	let mut phrases = Vec::with_capacity(input.judgements.len());

	for judgement in input.judgements {
		phrases.push(run_phrase(input, judgement, interface, expander, retry).await);
	}

	log_state(id, ExecutionState::PhrasesProcessed);

	Ok(aggregate(phrases))
}

async fn run_phrase(
	input: &RunInput<'_>,
	judgement: &CombinedJudgementPhrase,
	interface: &dyn QueryInterface,
	expander: &dyn QueryExpander,
	retry: &RetryPolicy,
) -> PhraseOutcome {
	match execute_with_retry(input, &judgement.phrase, interface, expander, retry).await {
		Ok(result) => {
			let scores = (!judgement.results.is_empty())
				.then(|| scorers::score_phrase(&result.ids(), &judgement.results));

			PhraseOutcome {
				phrase: judgement.phrase.clone(),
				took_ms: result.took_ms,
				total_results: result.total_results,
				results: result.results,
				error: None,
				scores,
			}
		},
		Err(message) => PhraseOutcome {
			phrase: judgement.phrase.clone(),
			took_ms: 0,
			total_results: 0,
			results: Vec::new(),
			error: Some(message),
			scores: None,
		},
	}
}

async fn execute_with_retry(
	input: &RunInput<'_>,
	phrase: &str,
	interface: &dyn QueryInterface,
	expander: &dyn QueryExpander,
	retry: &RetryPolicy,
) -> std::result::Result<QueryResult, String> {
	let max_attempts = retry.max_attempts.max(1);
	let mut attempt = 0;

	loop {
		attempt += 1;

		match expand_and_execute(input, phrase, interface, expander).await {
			Ok(result) => return Ok(result),
			Err(err) if attempt >= max_attempts => {
				tracing::warn!(
					search_configuration_id = %input.search_configuration_id,
					phrase,
					attempts = attempt,
					error = %err,
					"Phrase failed on every attempt."
				);

				return Err(err.to_string());
			},
			Err(err) => {
				let delay = retry.delay_after(attempt);

				tracing::warn!(
					search_configuration_id = %input.search_configuration_id,
					phrase,
					attempt,
					delay_ms = delay.as_millis() as u64,
					error = %err,
					"Phrase attempt failed. Retrying."
				);

				if !delay.is_zero() {
					tokio::time::sleep(delay).await;
				}
			},
		}
	}
}

async fn expand_and_execute(
	input: &RunInput<'_>,
	phrase: &str,
	interface: &dyn QueryInterface,
	expander: &dyn QueryExpander,
) -> ranklab_backends::Result<QueryResult> {
	let request = input.expansion(phrase);
	let query = expander.expand(&request).await?;

	interface.execute_query(&query).await
}

fn aggregate(phrases: Vec<PhraseOutcome>) -> RunOutcome {
	let scored: Vec<(&PhraseOutcome, &PhraseScores)> = phrases
		.iter()
		.filter_map(|phrase| phrase.scores.as_ref().map(|scores| (phrase, scores)))
		.collect();
	let took: Vec<f64> = scored.iter().map(|(phrase, _)| phrase.took_ms as f64).collect();
	let meta = LatencySummary::from_samples(&took);
	let combined_score = if scored.is_empty() {
		None
	} else {
		let total: f64 = scored.iter().map(|(_, scores)| scores.combined_score).sum();

		Some(total / scored.len() as f64)
	};
	let mut all_scores = BTreeMap::new();

	if !scored.is_empty() {
		for scorer in &scorers::SCORERS {
			let total: f64 = scored
				.iter()
				.filter_map(|(_, scores)| scores.all_scores.get(scorer.name))
				.sum();

			all_scores.insert(scorer.name.to_string(), total / scored.len() as f64);
		}
	}

	RunOutcome { phrases, meta, combined_score, all_scores }
}

fn log_state(search_configuration_id: Uuid, state: ExecutionState) {
	if state.is_terminal() && state != ExecutionState::Persisted {
		tracing::warn!(
			search_configuration_id = %search_configuration_id,
			state = %state,
			"Execution aborted."
		);
	} else {
		tracing::info!(
			search_configuration_id = %search_configuration_id,
			state = %state,
			"Execution state changed."
		);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn outcome(phrase: &str, took_ms: i64, scores: Option<PhraseScores>) -> PhraseOutcome {
		PhraseOutcome {
			phrase: phrase.to_string(),
			took_ms,
			total_results: 1,
			results: Vec::new(),
			error: None,
			scores,
		}
	}

	fn judged(ids: &[&str], judgements: &[(&str, f64)]) -> PhraseScores {
		let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
		let judgements: Vec<(String, f64)> =
			judgements.iter().map(|(id, score)| (id.to_string(), *score)).collect();

		scorers::score_phrase(&ids, &judgements)
	}

	#[test]
	fn backoff_grows_linearly_with_the_attempt() {
		let retry = RetryPolicy { max_attempts: 4, backoff: Duration::from_millis(1_000) };

		assert_eq!(retry.delay_after(1), Duration::from_millis(1_000));
		assert_eq!(retry.delay_after(3), Duration::from_millis(3_000));
	}

	#[test]
	fn aggregate_ignores_phrases_without_scores() {
		let perfect = judged(&["docA"], &[("docA", 3.0)]);
		let miss = judged(&["docZ"], &[("docA", 3.0)]);
		let outcome = aggregate(vec![
			outcome("bluetooth speaker", 10, Some(perfect)),
			outcome("anker", 500, None),
			outcome("usb cable", 30, Some(miss)),
		]);

		assert_eq!(outcome.phrases.len(), 3);
		assert_eq!(outcome.meta.took_p50, 20.0);
		assert_eq!(outcome.all_scores[scorers::NDCG_AT_10], 0.5);
		assert_eq!(outcome.all_scores[scorers::RECIPROCAL_RANK_AT_10], 0.5);
		assert_eq!(outcome.combined_score, Some(0.5));
	}

	#[test]
	fn aggregate_without_scored_phrases_has_no_combined_score() {
		let outcome = aggregate(vec![outcome("anker", 5, None)]);

		assert_eq!(outcome.combined_score, None);
		assert!(outcome.all_scores.is_empty());
		assert_eq!(outcome.meta, LatencySummary { took_p50: 0.0, took_p95: 0.0, took_p99: 0.0 });
	}
}
