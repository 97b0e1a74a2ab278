//! Environment-backed configuration.
//!
//! Values are read once at startup with env > default priority; the
//! `.env` file (if any) is loaded by `dotenvy` in `main` before this
//! runs. Only `DATABASE_URL` and `GEOCODER_API_KEY` have no usable
//! default.

use std::env;

use crate::error::{Error, Result};

/// Model ids the NLP pool may be switched to at runtime.
pub const AVAILABLE_MODELS: [&str; 2] = ["gemma3:1b", "gemma3:4b"];

/// Accepted NLP fan-out widths.
pub const AVAILABLE_CONCURRENCY: [usize; 5] = [1, 2, 4, 6, 8];

/// Runtime configuration for the engine and its HTTP surface.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Base URL of the chat-completion endpoint (Ollama-compatible).
    pub model_base_url: String,
    /// Initial model id; must be one of [`AVAILABLE_MODELS`].
    pub model_id: String,
    /// Initial NLP fan-out width; must be one of [`AVAILABLE_CONCURRENCY`].
    pub nlp_concurrency: usize,
    /// Hard cap on tickets processed per upload.
    pub max_batch: usize,
    /// Base URL of the geocoding endpoint.
    pub geocoder_base_url: String,
    /// Geocoder API key.
    pub geocoder_api_key: String,
    /// Allowed CORS origin for the frontend.
    pub frontend_origin: String,
    /// Listen address for the HTTP server.
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            database_url: require("DATABASE_URL")?,
            model_base_url: var_or("MODEL_BASE_URL", "http://localhost:11434"),
            model_id: var_or("MODEL_ID", "gemma3:1b"),
            nlp_concurrency: parse_var_or("NLP_CONCURRENCY", 6)?,
            max_batch: parse_var_or("MAX_BATCH", 50)?,
            geocoder_base_url: var_or(
                "GEOCODER_BASE_URL",
                "https://catalog.api.2gis.com/3.0/items/geocode",
            ),
            geocoder_api_key: require("GEOCODER_API_KEY")?,
            frontend_origin: var_or("FRONTEND_ORIGIN", "http://localhost:5173"),
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:8000"),
        };

        if !AVAILABLE_MODELS.contains(&config.model_id.as_str()) {
            return Err(Error::Config(format!(
                "MODEL_ID '{}' not in {:?}",
                config.model_id, AVAILABLE_MODELS
            )));
        }
        if !AVAILABLE_CONCURRENCY.contains(&config.nlp_concurrency) {
            return Err(Error::Config(format!(
                "NLP_CONCURRENCY {} not in {:?}",
                config.nlp_concurrency, AVAILABLE_CONCURRENCY
            )));
        }

        Ok(config)
    }
}

fn require(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("{name} is not set")))
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("{name} is not a valid number: '{raw}'"))),
        Err(_) => Ok(default),
    }
}
