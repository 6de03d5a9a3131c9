//! Config handling

use std::path::PathBuf;

use tracing::log::LevelFilter;
use tracing::{info, warn};
use url::Url;

use crate::cli::CliOptions;
use crate::constants::API_KEY_ENV;
use crate::error::ConfigError;
use crate::generator::{ApiKey, ImagenClient};
use crate::raster::{FontRasterizer, FontSet, discover_body_font};

/// Sets up logging based on the debug flag
pub fn setup_logging(debug: bool) -> Result<(), Box<std::io::Error>> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut logger = simple_logger::SimpleLogger::new().with_level(level);
    if !debug {
        logger = logger
            .with_module_level("tracing", LevelFilter::Warn)
            .with_module_level("rustls", LevelFilter::Info)
            .with_module_level("hyper_util", LevelFilter::Info)
            .with_module_level("reqwest", LevelFilter::Info)
            .with_module_level("tower_sessions", LevelFilter::Warn)
            .with_module_level("h2", LevelFilter::Info);
    }
    logger.init().map_err(|err| {
        eprintln!("Failed to initialize logger: {}", err);
        Box::new(std::io::Error::other(err))
    })
}

/// Validated runtime configuration.
#[derive(Debug)]
pub struct Config {
    /// Image service credential
    pub api_key: ApiKey,
    /// Imagen model name
    pub image_model: String,
    /// Base URL of the image service
    pub api_base_url: Url,
    /// Body font, explicit or discovered
    pub font_path: Option<PathBuf>,
    /// Display font, if configured
    pub display_font_path: Option<PathBuf>,
}

impl Config {
    /// Checks the CLI options. A missing credential is fatal here, before
    /// anything is served.
    pub fn from_cli(cli: &CliOptions) -> Result<Self, ConfigError> {
        let api_key = cli
            .api_key
            .clone()
            .and_then(ApiKey::new)
            .ok_or(ConfigError::MissingCredential(API_KEY_ENV))?;
        let api_base_url = Url::parse(&cli.api_base_url)?;
        let font_path = cli.font_path.clone().or_else(discover_body_font);

        Ok(Self {
            api_key,
            image_model: cli.image_model.clone(),
            api_base_url,
            font_path,
            display_font_path: cli.display_font_path.clone(),
        })
    }

    /// Builds the image service client.
    pub fn image_client(&self) -> Result<ImagenClient, ConfigError> {
        let client = ImagenClient::new(
            Some(self.api_key.clone()),
            &self.api_base_url,
            &self.image_model,
        )?;
        info!("Using image service at {}", client.endpoint());
        Ok(client)
    }

    /// Loads fonts and builds the rasterizer. Without any font the server
    /// still starts, but downloads fail.
    pub fn rasterizer(&self) -> Result<FontRasterizer, ConfigError> {
        let Some(body) = &self.font_path else {
            warn!("No font configured or found; set WISHCARD_FONT_PATH");
            return Ok(FontRasterizer::new(None));
        };
        let fonts = FontSet::load(body, self.display_font_path.as_deref())?;
        info!("Loaded card font {}", body.display());
        Ok(FontRasterizer::new(Some(fonts)))
    }
}
