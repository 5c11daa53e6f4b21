use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const VOTE_MIN: i16 = 0;
pub const VOTE_MAX: i16 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Vote score {0} is outside {VOTE_MIN}..={VOTE_MAX}.")]
pub struct VoteOutOfRange(pub i32);

/// A single grader's relevance score for one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct VoteScore(i16);
impl VoteScore {
	pub fn get(self) -> i16 {
		self.0
	}
}
impl TryFrom<i32> for VoteScore {
	type Error = VoteOutOfRange;

	fn try_from(value: i32) -> Result<Self, Self::Error> {
		if (i32::from(VOTE_MIN)..=i32::from(VOTE_MAX)).contains(&value) {
			Ok(Self(value as i16))
		} else {
			Err(VoteOutOfRange(value))
		}
	}
}
impl From<VoteScore> for i32 {
	fn from(score: VoteScore) -> Self {
		i32::from(score.0)
	}
}

/// One row of the grouped `(phrase, document)` aggregate over weighted judgements.
///
/// `document_id` is `None` for a phrase that exists in a judgement but has no votes yet.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedVoteRow {
	pub phrase: String,
	pub document_id: Option<String>,
	/// `Σ weight_i * vote_i`
	pub weighted_sum: f64,
	/// `Σ weight_i`
	pub weight_total: f64,
}

/// Consensus judgement for one phrase across every judgement of a search configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedJudgementPhrase {
	pub phrase: String,
	/// `(document_id, combined score)` pairs, empty when nobody voted on the phrase.
	pub results: Vec<(String, f64)>,
}
impl CombinedJudgementPhrase {
	pub fn score_of(&self, document_id: &str) -> Option<f64> {
		self.results.iter().find(|(id, _)| id == document_id).map(|(_, score)| *score)
	}
}

pub fn weighted_average(weighted_sum: f64, weight_total: f64) -> Option<f64> {
	if !weighted_sum.is_finite() || !weight_total.is_finite() || weight_total <= 0.0 {
		return None;
	}

	Some(weighted_sum / weight_total)
}

/// Folds grouped aggregate rows into one entry per phrase, keeping the order in which phrases
/// first appear.
///
/// Phrases whose rows carry no document are kept with an empty result list. Documents whose
/// weights sum to zero have no defined average and are left out.
pub fn combine_rows<I>(rows: I) -> Vec<CombinedJudgementPhrase>
where
	I: IntoIterator<Item = WeightedVoteRow>,
{
	let mut phrases: Vec<CombinedJudgementPhrase> = Vec::new();
	let mut index: HashMap<String, usize> = HashMap::new();

	for row in rows {
		let slot = match index.get(&row.phrase) {
			Some(slot) => *slot,
			None => {
				index.insert(row.phrase.clone(), phrases.len());
				phrases.push(CombinedJudgementPhrase {
					phrase: row.phrase.clone(),
					results: Vec::new(),
				});

				phrases.len() - 1
			},
		};
		let Some(document_id) = row.document_id else {
			continue;
		};
		let Some(score) = weighted_average(row.weighted_sum, row.weight_total) else {
			tracing::warn!(
				phrase = %row.phrase,
				document_id = %document_id,
				"Skipping judged document with zero total weight."
			);

			continue;
		};

		phrases[slot].results.push((document_id, score));
	}

	phrases
}
