use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::{Result, schema};

const SCHEMA_LOCK_ID: i64 = 7_261_525;

pub struct Db {
	pub pool: PgPool,
}
impl Db {
	pub async fn connect(cfg: &ranklab_config::Postgres) -> Result<Self> {
		let pool =
			PgPoolOptions::new().max_connections(cfg.pool_max_conns).connect(&cfg.dsn).await?;

		Ok(Self { pool })
	}

	/// Builds the pool without opening a connection; the first query connects.
	pub fn connect_lazy(cfg: &ranklab_config::Postgres) -> Result<Self> {
		let pool = PgPoolOptions::new().max_connections(cfg.pool_max_conns).connect_lazy(&cfg.dsn)?;

		Ok(Self { pool })
	}

	/// Creates missing tables. Safe to call from several processes at once.
	pub async fn ensure_schema(&self) -> Result<()> {
		let sql = schema::render_schema();
		// The advisory lock is transaction scoped, so it is released on commit or rollback.
		let mut tx = self.pool.begin().await?;

		sqlx::query("SELECT pg_advisory_xact_lock($1)")
			.bind(SCHEMA_LOCK_ID)
			.execute(&mut *tx)
			.await?;

		for statement in sql.split(';') {
			let trimmed = statement.trim();

			if trimmed.is_empty() {
				continue;
			}

			sqlx::query(trimmed).execute(&mut *tx).await?;
		}

		tx.commit().await?;

		Ok(())
	}
}
