use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	ranklab_run::run(ranklab_run::Args::parse()).await
}
