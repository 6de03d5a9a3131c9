//! CLI parser
use clap::Parser;
use std::num::NonZeroU16;
use std::path::PathBuf;

use crate::constants::{DEFAULT_API_BASE_URL, DEFAULT_IMAGE_MODEL};

#[derive(Parser, Debug)]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "WISHCARD_DEBUG")]
    /// Enable debug logging. Env: WISHCARD_DEBUG
    pub debug: bool,
    #[clap(long, short, default_value = "9000", env = "WISHCARD_PORT")]
    /// http listener, defaults to `9000`.
    /// Env: WISHCARD_PORT
    pub port: NonZeroU16,
    #[clap(
        long,
        short,
        default_value = "127.0.0.1",
        env = "WISHCARD_LISTEN_ADDRESS"
    )]
    /// Listen address, defaults to `127.0.0.1`.
    /// Env: WISHCARD_LISTEN_ADDRESS
    pub listen_address: String,

    #[clap(long, env = "API_KEY", hide_env_values = true)]
    /// Image service API key. Required.
    /// Env: API_KEY
    pub api_key: Option<String>,

    #[clap(long, default_value = DEFAULT_IMAGE_MODEL, env = "WISHCARD_IMAGE_MODEL")]
    /// Imagen model used for card backgrounds.
    /// Env: WISHCARD_IMAGE_MODEL
    pub image_model: String,

    #[clap(long, default_value = DEFAULT_API_BASE_URL, env = "WISHCARD_API_BASE_URL")]
    /// Base URL of the Generative Language API.
    /// Env: WISHCARD_API_BASE_URL
    pub api_base_url: String,

    #[clap(long, env = "WISHCARD_FONT_PATH")]
    /// TrueType font for the card text, eg `/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf`.
    /// Falls back to a well-known system font.
    /// Env: WISHCARD_FONT_PATH
    pub font_path: Option<PathBuf>,

    #[clap(long, env = "WISHCARD_DISPLAY_FONT_PATH")]
    /// Decorative font for the greeting, name and label. Defaults to the body font.
    /// Env: WISHCARD_DISPLAY_FONT_PATH
    pub display_font_path: Option<PathBuf>,
}
