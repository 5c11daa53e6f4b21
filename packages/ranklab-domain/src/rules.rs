use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionType {
	/// Case-insensitive literal substring of the phrase.
	Contained,
	Regex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionKind {
	Synonym,
	UpBoost,
	DownBoost,
	Filter,
	FacetFilter,
	Delete,
	Substitute,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
	#[serde(rename = "type")]
	pub kind: InstructionKind,
	pub value: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub field: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub weight: Option<f64>,
	#[serde(default = "enabled_by_default")]
	pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
	pub id: String,
	pub expression: String,
	pub expression_type: ExpressionType,
	#[serde(default = "enabled_by_default")]
	pub enabled: bool,
	#[serde(default)]
	pub instructions: Vec<Instruction>,
}

/// Immutable snapshot of the rules of one ruleset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesetVersion {
	pub ruleset_version_id: Uuid,
	pub ruleset_id: Uuid,
	pub rules: Vec<Rule>,
}

#[derive(Debug, Clone)]
pub struct ActiveRule {
	rule: Rule,
	matcher: Matcher,
}
impl ActiveRule {
	pub fn rule(&self) -> &Rule {
		&self.rule
	}

	pub fn matches(&self, phrase: &str) -> bool {
		match &self.matcher {
			Matcher::Contained(needle) => phrase.to_lowercase().contains(needle.as_str()),
			Matcher::Regex(regex) => regex.is_match(phrase),
		}
	}
}

#[derive(Debug, Clone)]
enum Matcher {
	Contained(String),
	Regex(Regex),
}

/// Flattens ruleset versions into the rules handed to query expansion.
///
/// Disabled rules are dropped, disabled instructions are stripped from the remaining rules, and
/// regex rules whose expression does not compile are dropped with a warning.
pub fn active_rules(versions: &[RulesetVersion]) -> Vec<ActiveRule> {
	let mut active = Vec::new();

	for version in versions {
		for rule in version.rules.iter().filter(|rule| rule.enabled) {
			let matcher = match rule.expression_type {
				ExpressionType::Contained =>
					Matcher::Contained(rule.expression.trim().to_lowercase()),
				ExpressionType::Regex =>
					match RegexBuilder::new(&rule.expression).case_insensitive(true).build() {
						Ok(regex) => Matcher::Regex(regex),
						Err(err) => {
							tracing::warn!(
								ruleset_version_id = %version.ruleset_version_id,
								rule_id = %rule.id,
								error = %err,
								"Dropping rule with an invalid regex expression."
							);

							continue;
						},
					},
			};
			let mut rule = rule.clone();

			rule.instructions.retain(|instruction| instruction.enabled);
			active.push(ActiveRule { rule, matcher });
		}
	}

	active
}

fn enabled_by_default() -> bool {
	true
}
