use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{Error, RanklabService, Result};
use ranklab_backends::{ExpansionRequest, QueryResult};
use ranklab_domain::{judgement::CombinedJudgementPhrase, rules, scorers};
use ranklab_storage::queries;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewRequest {
	pub search_configuration_id: Uuid,
	pub phrase: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewResponse {
	pub search_configuration_id: Uuid,
	pub phrase: String,
	pub expanded_query: Value,
	pub matched_rule_ids: Vec<String>,
	pub took_ms: i64,
	pub total_results: i64,
	pub results: Vec<PreviewHit>,
	pub combined_score: Option<f64>,
	pub all_scores: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewHit {
	pub id: String,
	pub explanation: Value,
	/// Combined judgement score, if any linked judgement voted on the document.
	pub judgement: Option<f64>,
}

impl RanklabService {
	/// Runs one phrase against a search configuration without storing anything.
	pub async fn preview_phrase(&self, req: PreviewRequest) -> Result<PreviewResponse> {
		let phrase = req.phrase.trim();

		if phrase.is_empty() {
			return Err(Error::InvalidRequest { message: "phrase must be non-empty.".to_string() });
		}

		let plan = queries::load_execution_plan(&self.db, req.search_configuration_id).await?;
		let endpoint = self.resolve_endpoint(&plan.endpoint)?;
		let interface = self.backends.interfaces.build(&endpoint)?;
		let active = rules::active_rules(&plan.ruleset_versions);
		let knobs = crate::merge_knobs(&plan.template_knobs, &plan.knobs);
		let request = ExpansionRequest {
			backend: endpoint.backend,
			template: &plan.template,
			rules: &active,
			knobs: &knobs,
			ltr_model: plan.ltr_model.as_deref(),
			phrase,
		};
		let query = self.backends.expander.expand(&request).await?;
		let result = interface.execute_query(&query).await?;
		let judgements =
			queries::combined_judgements_for_phrase(&self.db, plan.search_configuration_id, phrase)
				.await?;
		let matched_rule_ids = active
			.iter()
			.filter(|rule| rule.matches(phrase))
			.map(|rule| rule.rule().id.clone())
			.collect();
		let (results, scores) = judge_results(&result, &judgements);

		tracing::debug!(
			search_configuration_id = %plan.search_configuration_id,
			phrase,
			total_results = result.total_results,
			"Preview executed."
		);

		Ok(PreviewResponse {
			search_configuration_id: plan.search_configuration_id,
			phrase: phrase.to_string(),
			expanded_query: query.to_json(),
			matched_rule_ids,
			took_ms: result.took_ms,
			total_results: result.total_results,
			results,
			combined_score: scores.as_ref().map(|scores| scores.combined_score),
			all_scores: scores.map(|scores| scores.all_scores),
		})
	}
}

/// Scores the ranking against every judged document of the phrase, ranked or not.
fn judge_results(
	result: &QueryResult,
	judgements: &CombinedJudgementPhrase,
) -> (Vec<PreviewHit>, Option<scorers::PhraseScores>) {
	let hits = result
		.results
		.iter()
		.map(|hit| PreviewHit {
			id: hit.id.clone(),
			explanation: hit.explanation.clone(),
			judgement: judgements.score_of(&hit.id),
		})
		.collect();
	let scores = (!judgements.results.is_empty())
		.then(|| scorers::score_phrase(&result.ids(), &judgements.results));

	(hits, scores)
}
