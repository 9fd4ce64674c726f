//! Runtime configuration for the EcoMap core.
//!
//! Loaded from a TOML file when one exists, otherwise from the embedded
//! defaults, then patched from `ECOMAP_*` environment variables and validated.

use crate::escrow::DEFAULT_CREDITS_PER_POST;
use crate::report_gate::{GateParams, DEFAULT_COOLDOWN_HOURS, DEFAULT_RADIUS_METERS};
use anyhow::{Context, Result};
use ecomap_economics::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

const EMBEDDED_DEFAULTS: &str = include_str!("../config/default.toml");

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct EcoConfig {
    #[serde(default)]
    pub report_gate: ReportGateConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ReportGateConfig {
    pub cooldown_hours: u32,
    pub radius_meters: f64,
}

impl Default for ReportGateConfig {
    fn default() -> Self {
        Self {
            cooldown_hours: DEFAULT_COOLDOWN_HOURS,
            radius_meters: DEFAULT_RADIUS_METERS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JobsConfig {
    pub credits_per_post: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            credits_per_post: DEFAULT_CREDITS_PER_POST,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 50,
            max_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty`, `compact` or `json`.
    pub format: String,
    #[serde(default)]
    pub file_output: Option<String>,
    #[serde(default)]
    pub module_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_output: None,
            module_filters: HashMap::new(),
        }
    }
}

impl EcoConfig {
    /// Loads `path` if given and present, else the embedded defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let contents = match path {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "⚙️ Loading configuration from file");
                std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?
            }
            _ => {
                info!("⚙️ Configuration file not found, using embedded defaults");
                EMBEDDED_DEFAULTS.to_string()
            }
        };

        let mut config = Self::from_toml_str(&contents)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        info!(
            cooldown_hours = config.report_gate.cooldown_hours,
            radius_meters = config.report_gate.radius_meters,
            credits_per_post = config.jobs.credits_per_post,
            "Configuration loaded successfully"
        );
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse EcoMap configuration")
    }

    /// Applies `ECOMAP_*` overrides read through `lookup`. Unparseable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(hours) = lookup("ECOMAP_COOLDOWN_HOURS").and_then(|v| v.parse::<u32>().ok()) {
            info!(
                old = self.report_gate.cooldown_hours,
                new = hours,
                "Overriding cooldown hours from environment"
            );
            self.report_gate.cooldown_hours = hours;
        }

        if let Some(radius) = lookup("ECOMAP_RADIUS_METERS").and_then(|v| v.parse::<f64>().ok()) {
            info!(
                old = self.report_gate.radius_meters,
                new = radius,
                "Overriding geofence radius from environment"
            );
            self.report_gate.radius_meters = radius;
        }

        if let Some(level) = lookup("ECOMAP_LOG_LEVEL") {
            info!(old = %self.logging.level, new = %level, "Overriding log level from environment");
            self.logging.level = level;
        }

        if let Some(format) = lookup("ECOMAP_LOG_FORMAT") {
            info!(old = %self.logging.format, new = %format, "Overriding log format from environment");
            self.logging.format = format;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.report_gate.cooldown_hours == 0 {
            anyhow::bail!("report_gate.cooldown_hours must be > 0");
        }
        if !self.report_gate.radius_meters.is_finite() || self.report_gate.radius_meters <= 0.0 {
            anyhow::bail!(
                "report_gate.radius_meters must be a positive number, got {}",
                self.report_gate.radius_meters
            );
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be >= 1");
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            anyhow::bail!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms,
                self.retry.max_delay_ms
            );
        }
        match self.logging.format.as_str() {
            "pretty" | "compact" | "json" => {}
            other => anyhow::bail!(
                "Invalid logging.format '{}'. Valid options: pretty, compact, json",
                other
            ),
        }
        Ok(())
    }

    pub fn gate_params(&self) -> GateParams {
        GateParams {
            cooldown_hours: self.report_gate.cooldown_hours,
            radius_meters: self.report_gate.radius_meters,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }
}
