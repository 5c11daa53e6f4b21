use ranklab_domain::{
	credentials::{self, CredentialKey},
	endpoint::Credentials,
	judgement::{self, WeightedVoteRow},
	percentile,
	rules::{self, ExpressionType, Instruction, InstructionKind, Rule, RulesetVersion},
	scorers,
};
use uuid::Uuid;

fn ids(count: usize) -> Vec<String> {
	(0..count).map(|idx| format!("doc-{idx}")).collect()
}

fn all_judged(ids: &[String], score: f64) -> Vec<(String, f64)> {
	ids.iter().map(|id| (id.clone(), score)).collect()
}

#[test]
fn ndcg_is_one_when_every_judged_document_is_in_the_window() {
	let ranked = ids(4);
	let judgements = all_judged(&ranked, 3.0);

	assert_eq!(scorers::ndcg_at_10(&ranked, &judgements), 1.0);
}

#[test]
fn zero_overlap_scores_zero() {
	let ranked = vec!["x".to_string(), "y".to_string()];
	let judgements = vec![("a".to_string(), 3.0), ("b".to_string(), 2.0)];

	assert_eq!(scorers::ndcg_at_10(&ranked, &judgements), 0.0);
	assert_eq!(scorers::recall_at_10(&ranked, &judgements), 0.0);
}

#[test]
fn average_precision_is_bounded_by_window_over_judged_total() {
	let ranked = ids(15);
	let judgements = all_judged(&ranked, 3.0);
	let at_5 = scorers::average_precision(&ranked, &judgements, 5);
	let at_10 = scorers::average_precision(&ranked, &judgements, 10);

	assert!((at_5 - 1.0 / 3.0).abs() < 1e-12, "ap@5 = {at_5}");
	assert!((at_10 - 2.0 / 3.0).abs() < 1e-12, "ap@10 = {at_10}");
}

#[test]
fn recall_without_qualifying_documents() {
	let judgements = vec![("a".to_string(), 1.0)];

	assert_eq!(scorers::recall_at_10(&["a".to_string()], &judgements), 0.0);
	assert_eq!(scorers::recall_at_10(&[], &judgements), 1.0);
}

#[test]
fn reciprocal_rank_of_single_qualifying_document() {
	let ranked = ids(6);
	let judgements = vec![(ranked[3].clone(), 3.0), (ranked[0].clone(), 2.0)];

	assert_eq!(scorers::reciprocal_rank_at_10(&ranked, &judgements), 0.25);
	assert_eq!(scorers::reciprocal_rank_at_10(&ranked, &[(ranked[0].clone(), 1.0)]), 0.0);
}

#[test]
fn percentiles_interpolate() {
	assert_eq!(
		percentile::percentiles(&[1.0, 2.0, 3.0, 4.0, 5.0], &[0.0, 0.5, 1.0]),
		vec![1.0, 3.0, 5.0]
	);
	assert_eq!(percentile::percentiles(&[1.0, 2.0, 3.0, 4.0], &[0.5]), vec![2.5]);
}

#[test]
fn weighted_votes_combine_across_judgements() {
	// Judgement A (weight 2) voted 3, judgement B (weight 1) voted 0.
	let row = WeightedVoteRow {
		phrase: "bluetooth speaker".to_string(),
		document_id: Some("docA".to_string()),
		weighted_sum: 2.0 * 3.0 + 1.0 * 0.0,
		weight_total: 3.0,
	};
	let combined = judgement::combine_rows([row]);

	assert_eq!(combined[0].score_of("docA"), Some(2.0));
}

#[test]
fn bluetooth_speaker_ranking_scores_perfect_ndcg() {
	let combined = judgement::combine_rows([
		WeightedVoteRow {
			phrase: "bluetooth speaker".to_string(),
			document_id: Some("docA".to_string()),
			weighted_sum: 3.0,
			weight_total: 1.0,
		},
		WeightedVoteRow {
			phrase: "bluetooth speaker".to_string(),
			document_id: Some("docB".to_string()),
			weighted_sum: 0.0,
			weight_total: 1.0,
		},
	]);
	let ranked = vec!["docA".to_string(), "docB".to_string()];
	let scores = scorers::score_phrase(&ranked, &combined[0].results);

	assert_eq!(scores.all_scores[scorers::NDCG_AT_10], 1.0);
	assert_eq!(scores.all_scores[scorers::RECIPROCAL_RANK_AT_10], 1.0);
}

#[test]
fn stored_credentials_decrypt_with_configured_key() {
	let key = CredentialKey::from_base64("AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=")
		.expect("Failed to parse key.");
	let credentials =
		Credentials { username: "solr".to_string(), password: "SolrRocks".to_string() };
	let stored = credentials::encrypt_credentials(&key, &credentials).expect("Failed to seal.");

	assert_ne!(stored, "solr:SolrRocks");
	assert_eq!(
		credentials::decrypt_credentials(&key, &stored).expect("Failed to open."),
		credentials
	);
}

#[test]
fn rules_from_several_versions_are_flattened() {
	let rule = |id: &str, expression: &str| Rule {
		id: id.to_string(),
		expression: expression.to_string(),
		expression_type: ExpressionType::Contained,
		enabled: true,
		instructions: vec![Instruction {
			kind: InstructionKind::Synonym,
			value: "loudspeaker".to_string(),
			field: None,
			weight: None,
			enabled: true,
		}],
	};
	let versions = [
		RulesetVersion {
			ruleset_version_id: Uuid::new_v4(),
			ruleset_id: Uuid::new_v4(),
			rules: vec![rule("a", "speaker")],
		},
		RulesetVersion {
			ruleset_version_id: Uuid::new_v4(),
			ruleset_id: Uuid::new_v4(),
			rules: vec![rule("b", "headphones")],
		},
	];
	let active = rules::active_rules(&versions);
	let matching: Vec<&str> = active
		.iter()
		.filter(|rule| rule.matches("Bluetooth Speaker"))
		.map(|rule| rule.rule().id.as_str())
		.collect();

	assert_eq!(active.len(), 2);
	assert_eq!(matching, vec!["a"]);
}
