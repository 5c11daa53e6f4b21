pub mod endpoints;
pub mod execution;
pub mod preview;
pub mod time_serde;

mod error;

pub use endpoints::{
	ConnectionTestRequest, DocumentsRequest, DocumentsResponse, FieldValuesRequest,
	FieldValuesResponse, FieldsRequest, FieldsResponse,
};
pub use error::{Error, Result};
pub use execution::{
	CreateExecutionRequest, Execution, ExecutionState, GetExecutionRequest, PhraseOutcome,
	RetryPolicy, RunInput, RunOutcome, SearchPhraseExecution,
};
pub use preview::{PreviewHit, PreviewRequest, PreviewResponse};

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use ranklab_backends::{
	DefaultExpander, HttpQueryInterfaceFactory, QueryExpander, QueryInterface,
	QueryInterfaceFactory,
};
use ranklab_config::Config;
use ranklab_domain::{
	credentials::{self, CredentialKey},
	endpoint::{BackendType, SearchEndpoint},
};
use ranklab_storage::{db::Db, models::SearchEndpointRow, queries};

/// Query interface factory and expander used by every operation that reaches a search backend.
#[derive(Clone)]
pub struct Backends {
	pub interfaces: Arc<dyn QueryInterfaceFactory>,
	pub expander: Arc<dyn QueryExpander>,
}
impl Backends {
	pub fn new(
		interfaces: Arc<dyn QueryInterfaceFactory>,
		expander: Arc<dyn QueryExpander>,
	) -> Self {
		Self { interfaces, expander }
	}

	pub fn from_config(cfg: &Config) -> Result<Self> {
		let expander = DefaultExpander::new(&cfg.expander)?;

		Ok(Self {
			interfaces: Arc::new(HttpQueryInterfaceFactory::new(&cfg.backends)),
			expander: Arc::new(expander),
		})
	}
}

pub struct RanklabService {
	pub cfg: Config,
	pub db: Db,
	pub backends: Backends,
	credential_key: CredentialKey,
}
impl RanklabService {
	pub fn new(cfg: Config, db: Db) -> Result<Self> {
		let backends = Backends::from_config(&cfg)?;

		Self::with_backends(cfg, db, backends)
	}

	pub fn with_backends(cfg: Config, db: Db, backends: Backends) -> Result<Self> {
		let credential_key = CredentialKey::from_base64(&cfg.security.credentials_key)?;

		Ok(Self { cfg, db, backends, credential_key })
	}

	/// Turns a stored endpoint row into the descriptor the query interfaces use, decrypting its
	/// credentials.
	pub(crate) fn resolve_endpoint(&self, row: &SearchEndpointRow) -> Result<SearchEndpoint> {
		let backend: BackendType = row
			.endpoint_type
			.parse()
			.map_err(|err: ranklab_domain::endpoint::UnknownBackendType| Error::Storage {
				message: format!("search endpoint {}: {err}", row.search_endpoint_id),
			})?;
		let credentials = row
			.credentials
			.as_deref()
			.map(|sealed| credentials::decrypt_credentials(&self.credential_key, sealed))
			.transpose()?;

		Ok(SearchEndpoint {
			search_endpoint_id: row.search_endpoint_id,
			backend,
			url: row.url.clone(),
			index: row.index_name.clone(),
			verify_tls: row.verify_tls,
			credentials,
		})
	}

	pub(crate) async fn interface_for(
		&self,
		search_endpoint_id: Uuid,
	) -> Result<Arc<dyn QueryInterface>> {
		let row = queries::load_search_endpoint(&self.db, search_endpoint_id).await?;
		let endpoint = self.resolve_endpoint(&row)?;

		Ok(self.backends.interfaces.build(&endpoint)?)
	}
}

/// Overlays search configuration knobs on the defaults carried by the query template.
///
/// Only top-level keys are merged. A `null` override removes the default.
pub fn merge_knobs(defaults: &Value, overrides: &Value) -> Value {
	let mut merged = match defaults {
		Value::Object(map) => map.clone(),
		_ => serde_json::Map::new(),
	};

	if let Value::Object(map) = overrides {
		for (key, value) in map {
			if value.is_null() {
				merged.remove(key);
			} else {
				merged.insert(key.clone(), value.clone());
			}
		}
	}

	Value::Object(merged)
}
