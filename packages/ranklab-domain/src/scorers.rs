//! Relevance scorers over a ranked list of document ids and graded judgements.
//!
//! Every scorer is total: it never panics and always returns a value in `[0, 1]`. A document id
//! that appears more than once in the ranking only counts at its first position.

use std::collections::{BTreeMap, HashMap, HashSet};

pub const NDCG_AT_10: &str = "ndcg@10";
pub const AP_AT_10: &str = "ap@10";
pub const RECALL_AT_10: &str = "recall@10";
pub const RECIPROCAL_RANK_AT_10: &str = "reciprocal_rank@10";

pub const DEFAULT_WINDOW: usize = 10;
pub const DEFAULT_RELEVANCE_THRESHOLD: f64 = 3.0;

/// The scorers run for every judged phrase of an execution.
pub const SCORERS: [Scorer; 4] = [
	Scorer { name: NDCG_AT_10, score: ndcg_at_10 },
	Scorer { name: AP_AT_10, score: ap_at_10 },
	Scorer { name: RECALL_AT_10, score: recall_at_10 },
	Scorer { name: RECIPROCAL_RANK_AT_10, score: reciprocal_rank_at_10 },
];

#[derive(Clone, Copy)]
pub struct Scorer {
	pub name: &'static str,
	pub score: fn(&[String], &[(String, f64)]) -> f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhraseScores {
	pub all_scores: BTreeMap<String, f64>,
	/// Mean of `all_scores`.
	pub combined_score: f64,
}

pub fn score_phrase(ranked_ids: &[String], judgements: &[(String, f64)]) -> PhraseScores {
	let all_scores: BTreeMap<String, f64> = SCORERS
		.iter()
		.map(|scorer| (scorer.name.to_string(), (scorer.score)(ranked_ids, judgements)))
		.collect();
	let combined_score = all_scores.values().sum::<f64>() / all_scores.len().max(1) as f64;

	PhraseScores { all_scores, combined_score }
}

pub fn ndcg_at_10(ranked_ids: &[String], judgements: &[(String, f64)]) -> f64 {
	ndcg(ranked_ids, judgements, DEFAULT_WINDOW)
}

pub fn ap_at_10(ranked_ids: &[String], judgements: &[(String, f64)]) -> f64 {
	average_precision(ranked_ids, judgements, DEFAULT_WINDOW)
}

pub fn recall_at_10(ranked_ids: &[String], judgements: &[(String, f64)]) -> f64 {
	recall(ranked_ids, judgements, DEFAULT_WINDOW, DEFAULT_RELEVANCE_THRESHOLD)
}

pub fn reciprocal_rank_at_10(ranked_ids: &[String], judgements: &[(String, f64)]) -> f64 {
	reciprocal_rank(ranked_ids, judgements, DEFAULT_WINDOW, DEFAULT_RELEVANCE_THRESHOLD)
}

/// Normalized discounted cumulative gain with exponential gain `2^rel - 1`.
///
/// The ideal ranking is the judgement scores sorted descending and truncated to `k`. Returns 0
/// when the ideal DCG is 0.
pub fn ndcg(ranked_ids: &[String], judgements: &[(String, f64)], k: usize) -> f64 {
	let grades = grade_lookup(judgements);
	let dcg: f64 = first_occurrences(ranked_ids, k)
		.map(|(rank, id)| gain(grades.get(id).copied().unwrap_or(0.0)) / discount(rank))
		.sum();
	let mut ideal: Vec<f64> = grades.values().copied().collect();

	ideal.sort_by(|a, b| b.total_cmp(a));

	let idcg: f64 =
		ideal.iter().take(k).enumerate().map(|(idx, rel)| gain(*rel) / discount(idx + 1)).sum();

	if idcg <= 0.0 {
		return 0.0;
	}

	clamp_unit(dcg / idcg)
}

/// Average precision over the top `k` results with binary relevance (`score > 0`).
///
/// Recall is measured against every judged relevant document, not only the ones that fit in the
/// window. With no relevant judgements the score is 1 for a non-empty window and 0 otherwise.
pub fn average_precision(ranked_ids: &[String], judgements: &[(String, f64)], k: usize) -> f64 {
	let relevant: HashSet<&str> = grade_lookup(judgements)
		.into_iter()
		.filter(|(_, score)| *score > 0.0)
		.map(|(id, _)| id)
		.collect();

	if relevant.is_empty() {
		return if k > 0 && !ranked_ids.is_empty() { 1.0 } else { 0.0 };
	}

	let total = relevant.len() as f64;
	let mut hits = 0usize;
	let mut sum = 0.0_f64;

	for (rank, id) in first_occurrences(ranked_ids, k) {
		if relevant.contains(id) {
			hits += 1;
			// precision(rank) * (recall(rank) - recall(rank - 1))
			sum += (hits as f64 / rank as f64) * (1.0 / total);
		}
	}

	clamp_unit(sum)
}

/// Fraction of documents judged at or above `threshold` found in the top `k`.
///
/// With no qualifying judgements the score is 1 when the backend returned nothing and 0
/// otherwise.
pub fn recall(
	ranked_ids: &[String],
	judgements: &[(String, f64)],
	k: usize,
	threshold: f64,
) -> f64 {
	let qualifying: HashSet<&str> = grade_lookup(judgements)
		.into_iter()
		.filter(|(_, score)| *score >= threshold)
		.map(|(id, _)| id)
		.collect();

	if qualifying.is_empty() {
		return if ranked_ids.is_empty() { 1.0 } else { 0.0 };
	}

	let found = first_occurrences(ranked_ids, k).filter(|(_, id)| qualifying.contains(id)).count();

	clamp_unit(found as f64 / qualifying.len() as f64)
}

/// `1 / rank` of the highest judged qualifying document inside the top `k`.
///
/// The best score wins over the earliest rank; equal scores fall back to the earliest rank.
pub fn reciprocal_rank(
	ranked_ids: &[String],
	judgements: &[(String, f64)],
	k: usize,
	threshold: f64,
) -> f64 {
	let grades = grade_lookup(judgements);
	let mut best: Option<(f64, usize)> = None;

	for (rank, id) in first_occurrences(ranked_ids, k) {
		let Some(score) = grades.get(id).copied() else {
			continue;
		};

		if score < threshold {
			continue;
		}
		if best.map(|(best_score, _)| score > best_score).unwrap_or(true) {
			best = Some((score, rank));
		}
	}

	match best {
		Some((_, rank)) => clamp_unit(1.0 / rank as f64),
		None => 0.0,
	}
}

fn grade_lookup(judgements: &[(String, f64)]) -> HashMap<&str, f64> {
	judgements
		.iter()
		.map(|(id, score)| (id.as_str(), if score.is_finite() { score.max(0.0) } else { 0.0 }))
		.collect()
}

/// Yields `(1-indexed rank, id)` for the first occurrence of each id within the top `k`.
fn first_occurrences(ranked_ids: &[String], k: usize) -> impl Iterator<Item = (usize, &str)> {
	let mut seen = HashSet::new();

	ranked_ids
		.iter()
		.take(k)
		.enumerate()
		.filter_map(move |(idx, id)| seen.insert(id.as_str()).then_some((idx + 1, id.as_str())))
}

fn gain(rel: f64) -> f64 {
	2_f64.powf(rel) - 1.0
}

fn discount(rank: usize) -> f64 {
	(rank as f64 + 1.0).log2()
}

fn clamp_unit(value: f64) -> f64 {
	if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 }
}

#[cfg(test)]
mod tests {
	use super::*;

	fn ids(raw: &[&str]) -> Vec<String> {
		raw.iter().map(|id| id.to_string()).collect()
	}

	fn judged(raw: &[(&str, f64)]) -> Vec<(String, f64)> {
		raw.iter().map(|(id, score)| (id.to_string(), *score)).collect()
	}

	#[test]
	fn ndcg_penalizes_relevant_document_at_second_rank() {
		let score = ndcg(&ids(&["b", "a"]), &judged(&[("a", 3.0), ("b", 0.0)]), 10);
		// DCG = 7 / log2(3); IDCG = 7.
		let expected = 1.0 / 3_f64.log2();

		assert!((score - expected).abs() < 1e-12, "ndcg = {score}");
	}

	#[test]
	fn ndcg_ignores_repeated_ids() {
		let score = ndcg(&ids(&["a", "a", "a"]), &judged(&[("a", 3.0)]), 10);

		assert_eq!(score, 1.0);
	}

	#[test]
	fn ndcg_is_zero_when_all_judgements_are_irrelevant() {
		assert_eq!(ndcg(&ids(&["a"]), &judged(&[("a", 0.0)]), 10), 0.0);
		assert_eq!(ndcg(&[], &[], 10), 0.0);
	}

	#[test]
	fn average_precision_without_relevant_judgements_depends_on_window() {
		assert_eq!(average_precision(&ids(&["a"]), &judged(&[("a", 0.0)]), 10), 1.0);
		assert_eq!(average_precision(&[], &judged(&[("a", 0.0)]), 10), 0.0);
	}

	#[test]
	fn average_precision_interleaved_hits() {
		// Hits at ranks 1 and 3 out of 2 relevant: (1/1 + 2/3) / 2.
		let score =
			average_precision(&ids(&["a", "x", "b"]), &judged(&[("a", 2.0), ("b", 1.0)]), 10);

		assert!((score - (1.0 + 2.0 / 3.0) / 2.0).abs() < 1e-12);
	}

	#[test]
	fn reciprocal_rank_prefers_highest_score_over_earliest_rank() {
		let score = reciprocal_rank(
			&ids(&["a", "b"]),
			&judged(&[("a", 3.0), ("b", 3.5)]),
			10,
			DEFAULT_RELEVANCE_THRESHOLD,
		);

		assert_eq!(score, 0.5);
	}

	#[test]
	fn reciprocal_rank_respects_window() {
		let mut ranked: Vec<String> = (0..12).map(|idx| format!("filler-{idx}")).collect();

		ranked[11] = "hit".to_string();

		assert_eq!(reciprocal_rank(&ranked, &judged(&[("hit", 3.0)]), 10, 3.0), 0.0);
		assert_eq!(reciprocal_rank(&ranked, &judged(&[("hit", 3.0)]), 12, 3.0), 1.0 / 12.0);
	}

	#[test]
	fn recall_counts_distinct_documents() {
		let score = recall(&ids(&["a", "a", "b"]), &judged(&[("a", 3.0), ("c", 3.0)]), 10, 3.0);

		assert_eq!(score, 0.5);
	}

	#[test]
	fn non_finite_scores_are_treated_as_irrelevant() {
		let judgements = judged(&[("a", f64::NAN), ("b", f64::INFINITY)]);
		let ranked = ids(&["a", "b"]);

		for scorer in SCORERS {
			let value = (scorer.score)(&ranked, &judgements);

			assert!((0.0..=1.0).contains(&value), "{} = {value}", scorer.name);
		}
	}

	#[test]
	fn combined_score_is_mean_of_registered_scorers() {
		let scores = score_phrase(&ids(&["a"]), &judged(&[("a", 3.0)]));

		assert_eq!(scores.all_scores.len(), 4);
		assert_eq!(scores.combined_score, 1.0);
	}
}
