use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = anl_api::Args::parse();

	anl_api::run(args).await
}
