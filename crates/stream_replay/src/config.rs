//! Configuration parsing for stream replay.

use anyhow::{Context, Result};
use point_stream::SessionConfig;
use serde::Deserialize;
use std::path::Path;

/// Root configuration for a replay run.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
	/// Bytes handed to the session per submission.
	pub fragment_size: Option<usize>,
	/// Camera position used for the final LOD query.
	pub camera: Option<[f32; 3]>,
	/// Session tuning, same layout as the library's `SessionConfig`.
	pub session: SessionConfig,
}

impl Config {
	/// Load configuration from a TOML file.
	pub fn load(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path)
			.with_context(|| format!("Failed to read config file: {}", path.display()))?;
		let config: Config =
			toml::from_str(&content).with_context(|| "Failed to parse config TOML")?;

		if config.fragment_size == Some(0) {
			anyhow::bail!("fragment_size must be at least 1");
		}
		config
			.session
			.validate()
			.context("Invalid [session] configuration")?;

		Ok(config)
	}
}
