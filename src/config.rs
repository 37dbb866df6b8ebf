use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::plan::DuplicatePolicy;

const MAX_TIME_PRECISION: usize = 6;

/// Knobs for plan assembly and filter-graph lowering.
///
/// Every field has a default, so an empty YAML document is a valid config.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    pub duplicates: DuplicatePolicy,
    /// Decimal places for seek and duration directives.
    pub time_precision: usize,
    pub mp4: Mp4Profile,
    pub gif: GifProfile,
    pub portrait: PortraitTarget,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Mp4Profile {
    pub video_codec: String,
    pub audio_codec: String,
    pub preset: String,
    pub pixel_format: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct GifProfile {
    pub fps: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PortraitTarget {
    pub width: u32,
    pub height: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive (e.g. "warn", "cutplan=debug").
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            duplicates: DuplicatePolicy::First,
            time_precision: 2,
            mp4: Mp4Profile::default(),
            gif: GifProfile::default(),
            portrait: PortraitTarget::default(),
        }
    }
}

impl Default for Mp4Profile {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_owned(),
            audio_codec: "aac".to_owned(),
            preset: "veryfast".to_owned(),
            pixel_format: "yuv420p".to_owned(),
        }
    }
}

impl Default for GifProfile {
    fn default() -> Self {
        Self { fps: 10 }
    }
}

impl Default for PortraitTarget {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_owned(),
            json: false,
        }
    }
}

impl CompilerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.time_precision > MAX_TIME_PRECISION {
            bail!(
                "time_precision must be <= {MAX_TIME_PRECISION}, got {}",
                self.time_precision
            );
        }
        if self.gif.fps == 0 {
            bail!("gif.fps must be > 0");
        }
        let PortraitTarget { width, height } = self.portrait;
        if width == 0 || height == 0 {
            bail!("portrait target must be positive, got {width}x{height}");
        }
        if width % 2 != 0 || height % 2 != 0 {
            bail!("portrait target must have even dimensions for yuv420p, got {width}x{height}");
        }
        for (label, value) in [
            ("mp4.video_codec", &self.mp4.video_codec),
            ("mp4.audio_codec", &self.mp4.audio_codec),
            ("mp4.preset", &self.mp4.preset),
            ("mp4.pixel_format", &self.mp4.pixel_format),
        ] {
            if value.trim().is_empty() {
                bail!("{label} must not be empty");
            }
            if value.chars().any(char::is_whitespace) {
                bail!("{label} must be a single token, got '{value}'");
            }
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<CompilerConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = parse_config(&contents).with_context(|| {
        format!("invalid config {}", path.display())
    })?;
    Ok(config)
}

pub fn parse_config(contents: &str) -> Result<CompilerConfig> {
    if contents.trim().is_empty() {
        return Ok(CompilerConfig::default());
    }
    let config: CompilerConfig = serde_yaml::from_str(contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!("failed to parse yaml at {}: {}", location, error)
    })?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = parse_config("").expect("empty config should parse");
        assert_eq!(config, CompilerConfig::default());
        assert_eq!(config.mp4.video_codec, "libx264");
        assert_eq!(config.gif.fps, 10);
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let config = parse_config(
            r#"
duplicates: last
gif:
  fps: 12
portrait: { width: 720, height: 1280 }
"#,
        )
        .expect("config should parse");
        assert_eq!(config.duplicates, DuplicatePolicy::Last);
        assert_eq!(config.gif.fps, 12);
        assert_eq!(config.portrait.width, 720);
        assert_eq!(config.time_precision, 2);
        assert_eq!(config.mp4.preset, "veryfast");
    }

    #[test]
    fn unknown_fields_are_rejected_with_location() {
        let error = parse_config("gif:\n  fps: 10\n  loop: 3\n").expect_err("should fail");
        let message = format!("{error:#}");
        assert!(message.contains("line"), "message: {message}");
        assert!(message.contains("loop"), "message: {message}");
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(parse_config("gif: { fps: 0 }").is_err());
        assert!(parse_config("portrait: { width: 1081, height: 1920 }").is_err());
        assert!(parse_config("time_precision: 9").is_err());
        assert!(parse_config("mp4: { preset: 'very fast' }").is_err());
    }
}
