use std::collections::BTreeMap;

use serde_json::json;
use uuid::Uuid;

use ranklab_config::Postgres;
use ranklab_domain::{
	endpoint::BackendType,
	judgement::VoteScore,
	percentile::LatencySummary,
	rules::{ExpressionType, Rule, RulesetVersion},
};
use ranklab_storage::{
	db::Db,
	models::{NewExecution, NewSearchPhraseExecution},
	provisioning::{self, NewSearchConfiguration, NewSearchEndpoint},
	queries,
};
use ranklab_testkit::TestDatabase;

struct Seeded {
	search_configuration_id: Uuid,
	project_id: Uuid,
	ruleset_version_id: Uuid,
}

fn vote(score: i32) -> VoteScore {
	VoteScore::try_from(score).expect("Vote score must be in range.")
}

async fn connect(dsn: &str) -> Db {
	let cfg = Postgres { dsn: dsn.to_string(), pool_max_conns: 2 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	db
}

// Judgement A (weight 2) votes docA = 3, judgement B (weight 1) votes docA = 0. "anker" has a
// judgement phrase but no votes.
async fn seed(db: &Db) -> Seeded {
	let search_endpoint_id = Uuid::new_v4();
	let project_id = Uuid::new_v4();
	let query_template_id = Uuid::new_v4();
	let judgement_a = Uuid::new_v4();
	let judgement_b = Uuid::new_v4();
	let ruleset_version = RulesetVersion {
		ruleset_version_id: Uuid::new_v4(),
		ruleset_id: Uuid::new_v4(),
		rules: vec![Rule {
			id: "speaker-synonyms".to_string(),
			expression: "speaker".to_string(),
			expression_type: ExpressionType::Contained,
			enabled: true,
			instructions: Vec::new(),
		}],
	};
	let search_configuration_id = Uuid::new_v4();

	provisioning::insert_search_endpoint(
		db,
		&NewSearchEndpoint {
			search_endpoint_id,
			name: "local solr".to_string(),
			backend: BackendType::Solr,
			url: "http://localhost:8983/".to_string(),
			index_name: "products".to_string(),
			verify_tls: true,
			credentials: None,
		},
	)
	.await
	.expect("Failed to insert search endpoint.");
	provisioning::insert_project(db, project_id, "shop", search_endpoint_id)
		.await
		.expect("Failed to insert project.");
	provisioning::insert_query_template(
		db,
		query_template_id,
		project_id,
		None,
		"q=#$query##&qf=#$qf##",
		&json!({ "qf": "title" }),
	)
	.await
	.expect("Failed to insert query template.");
	provisioning::insert_ruleset_version(db, project_id, "synonyms", &ruleset_version)
		.await
		.expect("Failed to insert ruleset version.");
	provisioning::insert_judgement(db, judgement_a, project_id, "experts")
		.await
		.expect("Failed to insert judgement.");
	provisioning::insert_judgement(db, judgement_b, project_id, "crowd")
		.await
		.expect("Failed to insert judgement.");

	let phrase_a = provisioning::insert_judgement_phrase(db, judgement_a, "bluetooth speaker")
		.await
		.expect("Failed to insert phrase.");
	let phrase_b = provisioning::insert_judgement_phrase(db, judgement_b, "bluetooth speaker")
		.await
		.expect("Failed to insert phrase.");

	provisioning::insert_judgement_phrase(db, judgement_a, "anker")
		.await
		.expect("Failed to insert phrase.");
	provisioning::insert_vote(db, phrase_a, "docA", vote(3)).await.expect("Failed to insert vote.");
	provisioning::insert_vote(db, phrase_b, "docA", vote(0)).await.expect("Failed to insert vote.");
	provisioning::insert_vote(db, phrase_a, "docB", vote(1)).await.expect("Failed to insert vote.");
	provisioning::insert_search_configuration(
		db,
		&NewSearchConfiguration {
			search_configuration_id,
			project_id,
			parent_id: None,
			query_template_id,
			knobs: json!({ "qf": "title^2" }),
			ltr_model: None,
			ruleset_version_ids: vec![ruleset_version.ruleset_version_id],
			judgements: vec![(judgement_a, 2.0), (judgement_b, 1.0)],
		},
	)
	.await
	.expect("Failed to insert search configuration.");

	Seeded {
		search_configuration_id,
		project_id,
		ruleset_version_id: ruleset_version.ruleset_version_id,
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RANKLAB_PG_DSN to run."]
async fn weighted_judgements_are_combined_per_document() {
	let Some(base_dsn) = ranklab_testkit::env_dsn() else {
		eprintln!(
			"Skipping weighted_judgements_are_combined_per_document; set RANKLAB_PG_DSN to run."
		);

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = connect(test_db.dsn()).await;
	let seeded = seed(&db).await;
	let combined = queries::combined_judgements(&db, seeded.search_configuration_id)
		.await
		.expect("Failed to combine judgements.");

	assert_eq!(combined.len(), 2);
	assert_eq!(combined[0].phrase, "anker");
	assert!(combined[0].results.is_empty());
	assert_eq!(combined[1].phrase, "bluetooth speaker");
	assert_eq!(combined[1].score_of("docA"), Some(2.0));
	// Only judgement A voted on docB.
	assert_eq!(combined[1].score_of("docB"), Some(1.0));

	let scoped = queries::combined_judgements_for_phrase(
		&db,
		seeded.search_configuration_id,
		"bluetooth speaker",
	)
	.await
	.expect("Failed to combine phrase judgements.");

	assert_eq!(scoped.results, combined[1].results);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RANKLAB_PG_DSN to run."]
async fn execution_plan_resolves_template_rules_and_endpoint() {
	let Some(base_dsn) = ranklab_testkit::env_dsn() else {
		eprintln!(
			"Skipping execution_plan_resolves_template_rules_and_endpoint; set RANKLAB_PG_DSN to run."
		);

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = connect(test_db.dsn()).await;
	let seeded = seed(&db).await;
	let plan = queries::load_execution_plan(&db, seeded.search_configuration_id)
		.await
		.expect("Failed to load execution plan.");

	assert_eq!(plan.project_id, seeded.project_id);
	assert_eq!(plan.endpoint.endpoint_type, "solr");
	assert_eq!(plan.endpoint.url, "http://localhost:8983");
	assert_eq!(plan.template, "q=#$query##&qf=#$qf##");
	assert_eq!(plan.template_knobs, json!({ "qf": "title" }));
	assert_eq!(plan.knobs, json!({ "qf": "title^2" }));
	assert_eq!(plan.ruleset_versions.len(), 1);
	assert_eq!(plan.ruleset_versions[0].ruleset_version_id, seeded.ruleset_version_id);
	assert_eq!(plan.ruleset_versions[0].rules[0].id, "speaker-synonyms");

	let missing = queries::load_execution_plan(&db, Uuid::new_v4()).await;

	assert!(matches!(missing, Err(ranklab_storage::Error::NotFound(_))));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RANKLAB_PG_DSN to run."]
async fn execution_is_stored_with_phrases_in_order() {
	let Some(base_dsn) = ranklab_testkit::env_dsn() else {
		eprintln!("Skipping execution_is_stored_with_phrases_in_order; set RANKLAB_PG_DSN to run.");

		return;
	};

	ranklab_testkit::with_test_db(&base_dsn, |test_db| {
		let dsn = test_db.dsn().to_string();

		async move {
			let db = connect(&dsn).await;
			let seeded = seed(&db).await;
			let execution_id = Uuid::new_v4();
			let scores = BTreeMap::from([("ndcg@10".to_string(), 1.0)]);
			let execution = NewExecution {
				execution_id,
				search_configuration_id: seeded.search_configuration_id,
				project_id: seeded.project_id,
				meta: LatencySummary { took_p50: 5.0, took_p95: 9.0, took_p99: 9.8 },
				combined_score: Some(1.0),
				all_scores: scores.clone(),
				phrases: vec![
					NewSearchPhraseExecution {
						search_phrase_execution_id: Uuid::new_v4(),
						phrase: "bluetooth speaker".to_string(),
						took_ms: 5,
						total_results: 2,
						results: json!([{ "id": "docA", "explanation": null }]),
						error: None,
						combined_score: Some(1.0),
						all_scores: Some(scores.clone()),
					},
					NewSearchPhraseExecution {
						search_phrase_execution_id: Uuid::new_v4(),
						phrase: "anker".to_string(),
						took_ms: 0,
						total_results: 0,
						results: json!([]),
						error: Some("Search backend returned status 500: boom".to_string()),
						combined_score: None,
						all_scores: None,
					},
				],
			};

			queries::insert_execution(&db, &execution).await.expect("Failed to insert execution.");

			let record = queries::get_execution(&db, execution_id)
				.await
				.expect("Failed to load execution.");

			assert_eq!(record.execution.meta.0.took_p95, 9.0);
			assert_eq!(record.execution.all_scores.0, scores);
			assert_eq!(record.phrases.len(), 2);
			assert_eq!(record.phrases[0].phrase, "bluetooth speaker");
			assert_eq!(
				record.phrases[1].error.as_deref(),
				Some("Search backend returned status 500: boom")
			);
			assert!(record.phrases[1].all_scores.is_none());

			Ok::<(), ranklab_testkit::Error>(())
		}
	})
	.await
	.expect("Test database scenario failed.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RANKLAB_PG_DSN to run."]
async fn vote_scores_outside_range_are_rejected_by_the_schema() {
	let Some(base_dsn) = ranklab_testkit::env_dsn() else {
		eprintln!(
			"Skipping vote_scores_outside_range_are_rejected_by_the_schema; set RANKLAB_PG_DSN to run."
		);

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = connect(test_db.dsn()).await;
	seed(&db).await;

	let phrase_id: Uuid = sqlx::query_scalar(
		"SELECT judgement_phrase_id FROM judgement_phrases WHERE phrase = 'anker' LIMIT 1",
	)
	.fetch_one(&db.pool)
	.await
	.expect("Failed to load phrase.");
	let result = sqlx::query(
		"\
INSERT INTO votes (vote_id, judgement_phrase_id, document_id, score)
VALUES ($1, $2, 'docA', 4)",
	)
	.bind(Uuid::new_v4())
	.bind(phrase_id)
	.execute(&db.pool)
	.await;

	assert!(result.is_err());

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
