mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Backends, Config, Execution, Expander, Postgres, Security, Service, Storage};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);
	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::invalid("service.http_bind", "must be non-empty."));
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::invalid("storage.postgres.dsn", "must be non-empty."));
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::invalid("storage.postgres.pool_max_conns", "must be greater than zero."));
	}
	if cfg.backends.timeout_ms == 0 {
		return Err(Error::invalid("backends.timeout_ms", "must be greater than zero."));
	}

	let api_base = cfg.expander.api_base.trim();

	if !(api_base.starts_with("http://") || api_base.starts_with("https://")) {
		return Err(Error::invalid("expander.api_base", "must be an http or https URL."));
	}
	if !cfg.expander.path.starts_with('/') {
		return Err(Error::invalid("expander.path", "must start with '/'."));
	}
	if cfg.expander.timeout_ms == 0 {
		return Err(Error::invalid("expander.timeout_ms", "must be greater than zero."));
	}
	if cfg.execution.smoke_test_phrase.trim().is_empty() {
		return Err(Error::invalid("execution.smoke_test_phrase", "must be non-empty."));
	}
	if cfg.execution.max_attempts == 0 {
		return Err(Error::invalid("execution.max_attempts", "must be greater than zero."));
	}
	if cfg.execution.max_attempts > 10 {
		return Err(Error::invalid("execution.max_attempts", "must be 10 or less."));
	}
	if cfg.security.credentials_key.trim().is_empty() {
		return Err(Error::invalid("security.credentials_key", "must be non-empty."));
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.expander.api_base = cfg.expander.api_base.trim().trim_end_matches('/').to_string();

	if cfg.security.api_auth_token.as_deref().map(|token| token.trim().is_empty()).unwrap_or(false)
	{
		cfg.security.api_auth_token = None;
	}
}
