use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
	Elasticsearch,
	OpenSearch,
	Solr,
	Vespa,
	RedisSearch,
}
impl BackendType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Elasticsearch => "elasticsearch",
			Self::OpenSearch => "opensearch",
			Self::Solr => "solr",
			Self::Vespa => "vespa",
			Self::RedisSearch => "redissearch",
		}
	}
}
impl fmt::Display for BackendType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for BackendType {
	type Err = UnknownBackendType;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"elasticsearch" => Ok(Self::Elasticsearch),
			"opensearch" => Ok(Self::OpenSearch),
			"solr" => Ok(Self::Solr),
			"vespa" => Ok(Self::Vespa),
			"redissearch" => Ok(Self::RedisSearch),
			_ => Err(UnknownBackendType(raw.to_string())),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown search endpoint type {0:?}.")]
pub struct UnknownBackendType(pub String);

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
	pub username: String,
	pub password: String,
}
impl fmt::Debug for Credentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Credentials")
			.field("username", &self.username)
			.field("password", &"<redacted>")
			.finish()
	}
}

/// A search backend as the query interfaces see it, with credentials already decrypted.
#[derive(Debug, Clone)]
pub struct SearchEndpoint {
	pub search_endpoint_id: Uuid,
	pub backend: BackendType,
	/// Base URL without a trailing slash.
	pub url: String,
	/// Index, collection or core name.
	pub index: String,
	pub verify_tls: bool,
	pub credentials: Option<Credentials>,
}
impl SearchEndpoint {
	pub fn base_url(&self) -> &str {
		self.url.trim_end_matches('/')
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_backend_types_case_insensitively() {
		assert_eq!("OpenSearch".parse::<BackendType>(), Ok(BackendType::OpenSearch));
		assert_eq!(" solr ".parse::<BackendType>(), Ok(BackendType::Solr));
		assert!("lucene".parse::<BackendType>().is_err());
	}

	#[test]
	fn credentials_debug_hides_password() {
		let credentials =
			Credentials { username: "elastic".to_string(), password: "hunter2".to_string() };
		let rendered = format!("{credentials:?}");

		assert!(rendered.contains("elastic"));
		assert!(!rendered.contains("hunter2"));
	}
}
