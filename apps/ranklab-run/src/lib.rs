use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use ranklab_service::{CreateExecutionRequest, GetExecutionRequest, RanklabService};
use ranklab_storage::db::Db;

/// Runs one execution for a search configuration and prints the stored result as JSON.
#[derive(Debug, Parser)]
#[command(
	version = ranklab_cli::VERSION,
	about = ranklab_cli::ABOUT,
	rename_all = "kebab",
	styles = ranklab_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[arg(long, value_name = "UUID", required_unless_present = "execution_id")]
	pub search_configuration_id: Option<Uuid>,
	/// Print a stored execution instead of running a new one.
	#[arg(long, value_name = "UUID", conflicts_with = "search_configuration_id")]
	pub execution_id: Option<Uuid>,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = ranklab_config::load(&args.config)?;
	// Logs go to stderr so stdout carries only the JSON document.
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let service = RanklabService::new(config, db)?;
	let execution = match (args.execution_id, args.search_configuration_id) {
		(Some(execution_id), _) =>
			service.get_execution(GetExecutionRequest { execution_id }).await?,
		(None, Some(search_configuration_id)) => {
			tracing::info!(%search_configuration_id, "Starting execution.");

			service.create_execution(CreateExecutionRequest { search_configuration_id }).await?
		},
		(None, None) =>
			return Err(color_eyre::eyre::eyre!(
				"--search-configuration-id or --execution-id is required."
			)),
	};
	let json = serde_json::to_string_pretty(&execution)?;

	println!("{json}");

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn search_configuration_or_execution_id_is_required() {
		let id = Uuid::new_v4().to_string();

		assert!(Args::try_parse_from(["ranklab-run", "--config", "ranklab.toml"]).is_err());
		assert!(
			Args::try_parse_from([
				"ranklab-run",
				"--config",
				"ranklab.toml",
				"--search-configuration-id",
				id.as_str(),
				"--execution-id",
				id.as_str(),
			])
			.is_err()
		);

		let args = Args::try_parse_from([
			"ranklab-run",
			"-c",
			"ranklab.toml",
			"--search-configuration-id",
			id.as_str(),
		])
		.expect("Failed to parse arguments.");

		assert_eq!(args.search_configuration_id.map(|id| id.to_string()), Some(id));
		assert_eq!(args.execution_id, None);
	}

	#[test]
	fn malformed_ids_are_rejected() {
		assert!(
			Args::try_parse_from([
				"ranklab-run",
				"--config",
				"ranklab.toml",
				"--search-configuration-id",
				"not-a-uuid",
			])
			.is_err()
		);
	}
}
