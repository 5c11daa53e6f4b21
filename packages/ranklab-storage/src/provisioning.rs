//! Inserts for the records an execution reads. Search configurations are append-only; there is
//! no update path for them here.

use serde_json::Value;
use sqlx::types::Json;
use uuid::Uuid;

use crate::{Error, Result, db::Db};
use ranklab_domain::{endpoint::BackendType, judgement::VoteScore, rules::RulesetVersion};

#[derive(Debug, Clone)]
pub struct NewSearchEndpoint {
	pub search_endpoint_id: Uuid,
	pub name: String,
	pub backend: BackendType,
	pub url: String,
	pub index_name: String,
	pub verify_tls: bool,
	/// Already sealed with `ranklab_domain::credentials::encrypt_credentials`.
	pub credentials: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewSearchConfiguration {
	pub search_configuration_id: Uuid,
	pub project_id: Uuid,
	pub parent_id: Option<Uuid>,
	pub query_template_id: Uuid,
	pub knobs: Value,
	pub ltr_model: Option<String>,
	pub ruleset_version_ids: Vec<Uuid>,
	/// `(judgement_id, weight)`
	pub judgements: Vec<(Uuid, f64)>,
}

pub async fn insert_search_endpoint(db: &Db, endpoint: &NewSearchEndpoint) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO search_endpoints (
	search_endpoint_id,
	name,
	endpoint_type,
	url,
	index_name,
	verify_tls,
	credentials
)
VALUES ($1, $2, $3, $4, $5, $6, $7)",
	)
	.bind(endpoint.search_endpoint_id)
	.bind(endpoint.name.as_str())
	.bind(endpoint.backend.as_str())
	.bind(endpoint.url.trim_end_matches('/'))
	.bind(endpoint.index_name.as_str())
	.bind(endpoint.verify_tls)
	.bind(endpoint.credentials.as_deref())
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn insert_project(
	db: &Db,
	project_id: Uuid,
	name: &str,
	search_endpoint_id: Uuid,
) -> Result<()> {
	sqlx::query("INSERT INTO projects (project_id, name, search_endpoint_id) VALUES ($1, $2, $3)")
		.bind(project_id)
		.bind(name)
		.bind(search_endpoint_id)
		.execute(&db.pool)
		.await?;

	Ok(())
}

pub async fn insert_query_template(
	db: &Db,
	query_template_id: Uuid,
	project_id: Uuid,
	parent_id: Option<Uuid>,
	template: &str,
	knobs: &Value,
) -> Result<()> {
	if template.trim().is_empty() {
		return Err(Error::InvalidArgument("query template must not be empty".to_string()));
	}

	sqlx::query(
		"\
INSERT INTO query_templates (query_template_id, project_id, parent_id, template, knobs)
VALUES ($1, $2, $3, $4, $5)",
	)
	.bind(query_template_id)
	.bind(project_id)
	.bind(parent_id)
	.bind(template)
	.bind(knobs)
	.execute(&db.pool)
	.await?;

	Ok(())
}

/// Stores a ruleset version, creating its ruleset on first use.
pub async fn insert_ruleset_version(
	db: &Db,
	project_id: Uuid,
	ruleset_name: &str,
	version: &RulesetVersion,
) -> Result<()> {
	let mut tx = db.pool.begin().await?;

	sqlx::query(
		"\
INSERT INTO rulesets (ruleset_id, project_id, name)
VALUES ($1, $2, $3)
ON CONFLICT (ruleset_id) DO NOTHING",
	)
	.bind(version.ruleset_id)
	.bind(project_id)
	.bind(ruleset_name)
	.execute(&mut *tx)
	.await?;
	sqlx::query(
		"INSERT INTO ruleset_versions (ruleset_version_id, ruleset_id, rules) VALUES ($1, $2, $3)",
	)
	.bind(version.ruleset_version_id)
	.bind(version.ruleset_id)
	.bind(Json(&version.rules))
	.execute(&mut *tx)
	.await?;

	tx.commit().await?;

	Ok(())
}

pub async fn insert_judgement(
	db: &Db,
	judgement_id: Uuid,
	project_id: Uuid,
	name: &str,
) -> Result<()> {
	sqlx::query("INSERT INTO judgements (judgement_id, project_id, name) VALUES ($1, $2, $3)")
		.bind(judgement_id)
		.bind(project_id)
		.bind(name)
		.execute(&db.pool)
		.await?;

	Ok(())
}

/// Returns the id of the judgement phrase, reusing an existing row for the same phrase.
pub async fn insert_judgement_phrase(db: &Db, judgement_id: Uuid, phrase: &str) -> Result<Uuid> {
	let phrase = phrase.trim();

	if phrase.is_empty() {
		return Err(Error::InvalidArgument("judgement phrase must not be empty".to_string()));
	}

	let id: Uuid = sqlx::query_scalar(
		"\
INSERT INTO judgement_phrases (judgement_phrase_id, judgement_id, phrase)
VALUES ($1, $2, $3)
ON CONFLICT (judgement_id, phrase) DO UPDATE SET phrase = EXCLUDED.phrase
RETURNING judgement_phrase_id",
	)
	.bind(Uuid::new_v4())
	.bind(judgement_id)
	.bind(phrase)
	.fetch_one(&db.pool)
	.await?;

	Ok(id)
}

pub async fn insert_vote(
	db: &Db,
	judgement_phrase_id: Uuid,
	document_id: &str,
	score: VoteScore,
) -> Result<Uuid> {
	let vote_id = Uuid::new_v4();

	sqlx::query(
		"\
INSERT INTO votes (vote_id, judgement_phrase_id, document_id, score)
VALUES ($1, $2, $3, $4)",
	)
	.bind(vote_id)
	.bind(judgement_phrase_id)
	.bind(document_id)
	.bind(score.get())
	.execute(&db.pool)
	.await?;

	Ok(vote_id)
}

pub async fn insert_search_configuration(
	db: &Db,
	configuration: &NewSearchConfiguration,
) -> Result<()> {
	if let Some((judgement_id, weight)) =
		configuration.judgements.iter().find(|(_, weight)| !weight.is_finite() || *weight < 0.0)
	{
		return Err(Error::InvalidArgument(format!(
			"judgement {judgement_id} weight must be a non-negative number, got {weight}"
		)));
	}

	let mut tx = db.pool.begin().await?;

	sqlx::query(
		"\
INSERT INTO search_configurations (
	search_configuration_id,
	project_id,
	parent_id,
	query_template_id,
	knobs,
	ltr_model
)
VALUES ($1, $2, $3, $4, $5, $6)",
	)
	.bind(configuration.search_configuration_id)
	.bind(configuration.project_id)
	.bind(configuration.parent_id)
	.bind(configuration.query_template_id)
	.bind(&configuration.knobs)
	.bind(configuration.ltr_model.as_deref())
	.execute(&mut *tx)
	.await?;

	for ruleset_version_id in &configuration.ruleset_version_ids {
		sqlx::query(
			"\
INSERT INTO search_configuration_rulesets (search_configuration_id, ruleset_version_id)
VALUES ($1, $2)",
		)
		.bind(configuration.search_configuration_id)
		.bind(ruleset_version_id)
		.execute(&mut *tx)
		.await?;
	}
	for (judgement_id, weight) in &configuration.judgements {
		sqlx::query(
			"\
INSERT INTO search_configuration_judgements (search_configuration_id, judgement_id, weight)
VALUES ($1, $2, $3)",
		)
		.bind(configuration.search_configuration_id)
		.bind(judgement_id)
		.bind(weight)
		.execute(&mut *tx)
		.await?;
	}

	tx.commit().await?;

	Ok(())
}
