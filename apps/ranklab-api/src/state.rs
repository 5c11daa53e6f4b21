use std::sync::Arc;

use ranklab_service::RanklabService;
use ranklab_storage::db::Db;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<RanklabService>,
	/// Bearer token required on `/v1` routes, when configured.
	pub auth_token: Option<Arc<str>>,
}
impl AppState {
	pub async fn new(config: ranklab_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let service = RanklabService::new(config, db)?;

		Ok(Self::with_service(service))
	}

	pub fn with_service(service: RanklabService) -> Self {
		let auth_token = service.cfg.security.api_auth_token.as_deref().map(Arc::from);

		Self { service: Arc::new(service), auth_token }
	}
}
