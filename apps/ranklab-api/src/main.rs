use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	ranklab_api::run(ranklab_api::Args::parse()).await
}
