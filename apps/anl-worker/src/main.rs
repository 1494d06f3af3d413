use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = anl_worker::Args::parse();

	anl_worker::run(args).await
}
