use serde_json::Value;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Error, Result,
	db::Db,
	models::{
		ExecutionPlan, ExecutionRecord, ExecutionRow, NewExecution, SearchEndpointRow,
		SearchPhraseExecutionRow,
	},
};
use ranklab_domain::{
	judgement::{self, CombinedJudgementPhrase, WeightedVoteRow},
	rules::{Rule, RulesetVersion},
};

#[derive(sqlx::FromRow)]
struct PlanRow {
	search_configuration_id: Uuid,
	project_id: Uuid,
	search_endpoint_id: Uuid,
	template: String,
	template_knobs: Value,
	knobs: Value,
	ltr_model: Option<String>,
}

pub async fn load_search_endpoint(db: &Db, search_endpoint_id: Uuid) -> Result<SearchEndpointRow> {
	sqlx::query_as::<_, SearchEndpointRow>(
		"\
SELECT
	search_endpoint_id,
	name,
	endpoint_type,
	url,
	index_name,
	verify_tls,
	credentials
FROM search_endpoints
WHERE search_endpoint_id = $1",
	)
	.bind(search_endpoint_id)
	.fetch_optional(&db.pool)
	.await?
	.ok_or_else(|| Error::NotFound(format!("search endpoint {search_endpoint_id}")))
}

pub async fn load_execution_plan(db: &Db, search_configuration_id: Uuid) -> Result<ExecutionPlan> {
	let plan = sqlx::query_as::<_, PlanRow>(
		"\
SELECT
	sc.search_configuration_id,
	sc.project_id,
	p.search_endpoint_id,
	qt.template,
	qt.knobs AS template_knobs,
	sc.knobs,
	sc.ltr_model
FROM search_configurations sc
JOIN query_templates qt ON qt.query_template_id = sc.query_template_id
JOIN projects p ON p.project_id = sc.project_id
WHERE sc.search_configuration_id = $1",
	)
	.bind(search_configuration_id)
	.fetch_optional(&db.pool)
	.await?
	.ok_or_else(|| Error::NotFound(format!("search configuration {search_configuration_id}")))?;
	let endpoint = load_search_endpoint(db, plan.search_endpoint_id).await?;
	let ruleset_versions = load_ruleset_versions(db, search_configuration_id).await?;

	Ok(ExecutionPlan {
		search_configuration_id: plan.search_configuration_id,
		project_id: plan.project_id,
		endpoint,
		template: plan.template,
		template_knobs: plan.template_knobs,
		knobs: plan.knobs,
		ltr_model: plan.ltr_model,
		ruleset_versions,
	})
}

async fn load_ruleset_versions(
	db: &Db,
	search_configuration_id: Uuid,
) -> Result<Vec<RulesetVersion>> {
	let rows: Vec<(Uuid, Uuid, Value)> = sqlx::query_as(
		"\
SELECT rv.ruleset_version_id, rv.ruleset_id, rv.rules
FROM search_configuration_rulesets scr
JOIN ruleset_versions rv ON rv.ruleset_version_id = scr.ruleset_version_id
WHERE scr.search_configuration_id = $1
ORDER BY rv.created_at, rv.ruleset_version_id",
	)
	.bind(search_configuration_id)
	.fetch_all(&db.pool)
	.await?;
	let mut versions = Vec::with_capacity(rows.len());

	for (ruleset_version_id, ruleset_id, rules) in rows {
		let rules: Vec<Rule> = serde_json::from_value(rules).map_err(|err| {
			Error::InvalidData(format!("ruleset version {ruleset_version_id} rules: {err}"))
		})?;

		versions.push(RulesetVersion { ruleset_version_id, ruleset_id, rules });
	}

	Ok(versions)
}

/// Weighted consensus per `(phrase, document)` over every judgement linked to the configuration.
pub async fn combined_judgements(
	db: &Db,
	search_configuration_id: Uuid,
) -> Result<Vec<CombinedJudgementPhrase>> {
	let rows: Vec<(String, Option<String>, f64, f64)> = sqlx::query_as(
		"\
SELECT
	jp.phrase,
	v.document_id,
	COALESCE(SUM(scj.weight * v.score), 0)::float8 AS weighted_sum,
	COALESCE(SUM(scj.weight) FILTER (WHERE v.vote_id IS NOT NULL), 0)::float8 AS weight_total
FROM search_configuration_judgements scj
JOIN judgement_phrases jp ON jp.judgement_id = scj.judgement_id
LEFT JOIN votes v ON v.judgement_phrase_id = jp.judgement_phrase_id
WHERE scj.search_configuration_id = $1
GROUP BY jp.phrase, v.document_id
ORDER BY jp.phrase, v.document_id NULLS FIRST",
	)
	.bind(search_configuration_id)
	.fetch_all(&db.pool)
	.await?;

	Ok(judgement::combine_rows(rows.into_iter().map(weighted_row)))
}

/// Same aggregate as [`combined_judgements`], restricted to one phrase.
///
/// Every judged document of the phrase is returned, including ones a query did not rank.
pub async fn combined_judgements_for_phrase(
	db: &Db,
	search_configuration_id: Uuid,
	phrase: &str,
) -> Result<CombinedJudgementPhrase> {
	let rows: Vec<(String, Option<String>, f64, f64)> = sqlx::query_as(
		"\
SELECT
	jp.phrase,
	v.document_id,
	COALESCE(SUM(scj.weight * v.score), 0)::float8 AS weighted_sum,
	COALESCE(SUM(scj.weight) FILTER (WHERE v.vote_id IS NOT NULL), 0)::float8 AS weight_total
FROM search_configuration_judgements scj
JOIN judgement_phrases jp ON jp.judgement_id = scj.judgement_id
LEFT JOIN votes v ON v.judgement_phrase_id = jp.judgement_phrase_id
WHERE scj.search_configuration_id = $1
	AND jp.phrase = $2
GROUP BY jp.phrase, v.document_id
ORDER BY v.document_id NULLS FIRST",
	)
	.bind(search_configuration_id)
	.bind(phrase)
	.fetch_all(&db.pool)
	.await?;
	let combined = judgement::combine_rows(rows.into_iter().map(weighted_row));

	Ok(combined.into_iter().next().unwrap_or_else(|| CombinedJudgementPhrase {
		phrase: phrase.to_string(),
		results: Vec::new(),
	}))
}

/// Writes the execution and all of its phrase rows in one transaction.
pub async fn insert_execution(db: &Db, execution: &NewExecution) -> Result<OffsetDateTime> {
	let mut tx = db.pool.begin().await?;
	let created_at: OffsetDateTime = sqlx::query_scalar(
		"\
INSERT INTO executions (
	execution_id,
	search_configuration_id,
	project_id,
	meta,
	combined_score,
	all_scores
)
VALUES ($1, $2, $3, $4, $5, $6)
RETURNING created_at",
	)
	.bind(execution.execution_id)
	.bind(execution.search_configuration_id)
	.bind(execution.project_id)
	.bind(Json(&execution.meta))
	.bind(execution.combined_score)
	.bind(Json(&execution.all_scores))
	.fetch_one(&mut *tx)
	.await?;

	for (position, phrase) in execution.phrases.iter().enumerate() {
		let position = i32::try_from(position)
			.map_err(|_| Error::InvalidArgument("too many phrases in one execution".to_string()))?;

		sqlx::query(
			"\
INSERT INTO search_phrase_executions (
	search_phrase_execution_id,
	execution_id,
	position,
	phrase,
	took_ms,
	total_results,
	results,
	error,
	combined_score,
	all_scores
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
		)
		.bind(phrase.search_phrase_execution_id)
		.bind(execution.execution_id)
		.bind(position)
		.bind(phrase.phrase.as_str())
		.bind(phrase.took_ms)
		.bind(phrase.total_results)
		.bind(&phrase.results)
		.bind(phrase.error.as_deref())
		.bind(phrase.combined_score)
		.bind(phrase.all_scores.as_ref().map(Json))
		.execute(&mut *tx)
		.await?;
	}

	tx.commit().await?;

	Ok(created_at)
}

pub async fn get_execution(db: &Db, execution_id: Uuid) -> Result<ExecutionRecord> {
	let execution = sqlx::query_as::<_, ExecutionRow>(
		"\
SELECT
	execution_id,
	search_configuration_id,
	project_id,
	meta,
	combined_score,
	all_scores,
	created_at
FROM executions
WHERE execution_id = $1",
	)
	.bind(execution_id)
	.fetch_optional(&db.pool)
	.await?
	.ok_or_else(|| Error::NotFound(format!("execution {execution_id}")))?;
	let phrases = sqlx::query_as::<_, SearchPhraseExecutionRow>(
		"\
SELECT
	search_phrase_execution_id,
	execution_id,
	position,
	phrase,
	took_ms,
	total_results,
	results,
	error,
	combined_score,
	all_scores
FROM search_phrase_executions
WHERE execution_id = $1
ORDER BY position",
	)
	.bind(execution_id)
	.fetch_all(&db.pool)
	.await?;

	Ok(ExecutionRecord { execution, phrases })
}

fn weighted_row(
	(phrase, document_id, weighted_sum, weight_total): (String, Option<String>, f64, f64),
) -> WeightedVoteRow {
	WeightedVoteRow { phrase, document_id, weighted_sum, weight_total }
}
