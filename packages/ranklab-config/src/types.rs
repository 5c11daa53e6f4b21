use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	#[serde(default)]
	pub backends: Backends,
	pub expander: Expander,
	#[serde(default)]
	pub execution: Execution,
	pub security: Security,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

/// HTTP settings shared by every search backend client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Backends {
	pub timeout_ms: u64,
}
impl Default for Backends {
	fn default() -> Self {
		Self { timeout_ms: 30_000 }
	}
}

/// Remote query expansion service used for Elasticsearch and OpenSearch templates.
#[derive(Debug, Clone, Deserialize)]
pub struct Expander {
	pub api_base: String,
	#[serde(default = "default_expander_path")]
	pub path: String,
	#[serde(default = "default_expander_timeout_ms")]
	pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Execution {
	/// Throwaway phrase sent through expand and execute before any judged phrase.
	pub smoke_test_phrase: String,
	/// Total attempts per judged phrase, the first one included.
	pub max_attempts: u32,
	/// Sleep before attempt `n + 1` is `n * retry_backoff_ms`.
	pub retry_backoff_ms: u64,
}
impl Default for Execution {
	fn default() -> Self {
		Self {
			smoke_test_phrase: "testing test".to_string(),
			max_attempts: 4,
			retry_backoff_ms: 1_000,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Security {
	pub bind_localhost_only: bool,
	/// Base64 encoded 32 byte key for search endpoint credentials.
	pub credentials_key: String,
	pub api_auth_token: Option<String>,
}

fn default_expander_path() -> String {
	"/expand".to_string()
}

fn default_expander_timeout_ms() -> u64 {
	10_000
}
