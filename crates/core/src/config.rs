use crate::aspect::AspectRatio;
use crate::error::{AppError, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default JPEG quality for rendered crops.
pub const DEFAULT_JPEG_QUALITY: u8 = 92;
/// Default growth applied to a detected face box.
pub const DEFAULT_FACE_MARGIN: f64 = 1.5;
/// Default upper bound on how long face detection may take.
pub const DEFAULT_DETECTION_TIMEOUT: Duration = Duration::from_millis(5000);
/// Default download filename.
pub const DEFAULT_OUTPUT_FILENAME: &str = "cropped-image.jpeg";

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub jpeg_quality: u8,
    pub face_margin: f64,
    pub detection_timeout: Duration,
    pub default_aspect: AspectRatio,
    pub output_filename: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            face_margin: DEFAULT_FACE_MARGIN,
            detection_timeout: DEFAULT_DETECTION_TIMEOUT,
            default_aspect: AspectRatio::default(),
            output_filename: DEFAULT_OUTPUT_FILENAME.to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from `CROPPER_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn load() -> Result<Self> {
        // Load .env file if it exists, ignore if it doesn't
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut builder = Self::builder();

        if let Some(raw) = lookup("CROPPER_JPEG_QUALITY") {
            builder = builder.with_jpeg_quality(parse_var("CROPPER_JPEG_QUALITY", &raw)?);
        }
        if let Some(raw) = lookup("CROPPER_FACE_MARGIN") {
            builder = builder.with_face_margin(parse_var("CROPPER_FACE_MARGIN", &raw)?);
        }
        if let Some(raw) = lookup("CROPPER_DETECTION_TIMEOUT_MS") {
            let millis: u64 = parse_var("CROPPER_DETECTION_TIMEOUT_MS", &raw)?;
            builder = builder.with_detection_timeout(Duration::from_millis(millis));
        }
        if let Some(raw) = lookup("CROPPER_DEFAULT_ASPECT") {
            builder = builder.with_default_aspect(raw.parse()?);
        }
        if let Some(raw) = lookup("CROPPER_OUTPUT_FILENAME") {
            builder = builder.with_output_filename(raw);
        }

        builder.build()
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            config: Config::default(),
        }
    }
}

fn parse_var<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::config(format!("{key} has an invalid value: '{raw}'")))
}

/// Programmatic overrides on top of [`Config::default`].
#[derive(Clone, Debug)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality;
        self
    }

    pub fn with_face_margin(mut self, margin: f64) -> Self {
        self.config.face_margin = margin;
        self
    }

    pub fn with_detection_timeout(mut self, timeout: Duration) -> Self {
        self.config.detection_timeout = timeout;
        self
    }

    pub fn with_default_aspect(mut self, aspect: AspectRatio) -> Self {
        self.config.default_aspect = aspect;
        self
    }

    pub fn with_output_filename(mut self, filename: impl Into<String>) -> Self {
        self.config.output_filename = filename.into();
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<Config> {
        let config = self.config;
        if !(1..=100).contains(&config.jpeg_quality) {
            return Err(AppError::config(format!(
                "JPEG quality must be between 1 and 100, got {}",
                config.jpeg_quality
            )));
        }
        if !(config.face_margin.is_finite() && config.face_margin > 0.0) {
            return Err(AppError::config(format!(
                "face margin must be a positive number, got {}",
                config.face_margin
            )));
        }
        if config.output_filename.trim().is_empty() {
            return Err(AppError::config("output filename must not be empty"));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.default_aspect, AspectRatio::Portrait);
        assert_eq!(config.output_filename, "cropped-image.jpeg");
    }

    #[test]
    fn reads_every_variable() {
        let config = Config::from_lookup(lookup(&[
            ("CROPPER_JPEG_QUALITY", "75"),
            ("CROPPER_FACE_MARGIN", "2.0"),
            ("CROPPER_DETECTION_TIMEOUT_MS", "250"),
            ("CROPPER_DEFAULT_ASPECT", "16:9"),
            ("CROPPER_OUTPUT_FILENAME", "out.jpeg"),
        ]))
        .unwrap();
        assert_eq!(config.jpeg_quality, 75);
        assert_eq!(config.face_margin, 2.0);
        assert_eq!(config.detection_timeout, Duration::from_millis(250));
        assert_eq!(config.default_aspect, AspectRatio::Landscape);
        assert_eq!(config.output_filename, "out.jpeg");
    }

    #[test]
    fn rejects_garbage() {
        assert!(Config::from_lookup(lookup(&[("CROPPER_JPEG_QUALITY", "high")])).is_err());
        assert!(Config::from_lookup(lookup(&[("CROPPER_JPEG_QUALITY", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("CROPPER_FACE_MARGIN", "-1")])).is_err());
        assert!(Config::from_lookup(lookup(&[("CROPPER_DEFAULT_ASPECT", "3:2")])).is_err());
        assert!(Config::from_lookup(lookup(&[("CROPPER_OUTPUT_FILENAME", "  ")])).is_err());
    }
}
