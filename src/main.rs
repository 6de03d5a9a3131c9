use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::error;
use wishcard::config::{Config, setup_logging};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let cli = wishcard::cli::CliOptions::parse();

    if let Err(err) = setup_logging(cli.debug) {
        eprintln!("Failed to set up logging: {err}");
        return ExitCode::FAILURE;
    }

    let config = match Config::from_cli(&cli) {
        Ok(config) => config,
        Err(err) => {
            error!("Configuration error: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let generator = match config.image_client() {
        Ok(client) => client,
        Err(err) => {
            error!("Failed to set up the image client: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let rasterizer = match config.rasterizer() {
        Ok(rasterizer) => rasterizer,
        Err(err) => {
            error!("Failed to load card fonts: {}", err);
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = wishcard::web::setup_server(
        &cli.listen_address,
        cli.port,
        Arc::new(generator),
        Arc::new(rasterizer),
    )
    .await
    {
        error!("Application error: {}", err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
