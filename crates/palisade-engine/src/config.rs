//! Engine configuration, immutable after process start.

use crate::error::{ServiceError, ServiceResult};
use palisade_core::{ProfileTemplate, RiskProfile};
use serde::Deserialize;
use std::time::Duration;

/// Top-level engine configuration.
///
/// Assembled from defaults and an optional TOML overlay at startup;
/// never mutated afterwards.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Risk-profile template applied to users without a stored profile.
    pub default_profile: ProfileTemplate,
    /// Months of history for factor regression.
    pub analysis_window_months: u32,
    /// Result-cache TTL.
    pub cache_ttl: Duration,
    /// Price-fetch pool width.
    pub fetch_concurrency: usize,
    /// Per-request deadline for provider fetches.
    pub provider_deadline: Duration,
    /// Annual risk-free rate.
    pub risk_free_annual: f64,
    /// Small-base threshold for combined performance.
    pub small_base_threshold: f64,
    /// Trade-preview TTL.
    pub preview_ttl: Duration,
    /// Relative cost drift that triggers a warning on execute.
    pub preview_drift_tolerance: f64,
    /// Asset classes eligible for the rate factor.
    pub rate_factor_classes: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_profile: ProfileTemplate::Balanced,
            analysis_window_months: 36,
            cache_ttl: Duration::from_secs(300),
            fetch_concurrency: 16,
            provider_deadline: Duration::from_secs(30),
            risk_free_annual: 0.04,
            small_base_threshold: 500.0,
            preview_ttl: Duration::from_secs(900),
            preview_drift_tolerance: 0.01,
            rate_factor_classes: vec!["bond".to_string(), "real_estate".to_string()],
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    default_profile: Option<String>,
    analysis_window_months: Option<u32>,
    cache_ttl_secs: Option<u64>,
    fetch_concurrency: Option<usize>,
    provider_deadline_secs: Option<u64>,
    risk_free_annual: Option<f64>,
    small_base_threshold: Option<f64>,
    preview_ttl_secs: Option<u64>,
    preview_drift_tolerance: Option<f64>,
    rate_factor_classes: Option<Vec<String>>,
}

impl EngineConfig {
    /// Overlays settings parsed from a TOML document.
    ///
    /// # Errors
    ///
    /// Fails on unparseable TOML or an unknown profile template.
    pub fn with_toml(mut self, document: &str) -> ServiceResult<Self> {
        let parsed: ConfigFile = toml::from_str(document)
            .map_err(|e| ServiceError::validation(format!("config parse: {e}")))?;

        if let Some(template) = parsed.default_profile {
            self.default_profile = template
                .parse()
                .map_err(|e: palisade_core::CoreError| ServiceError::validation(e.to_string()))?;
        }
        if let Some(v) = parsed.analysis_window_months {
            self.analysis_window_months = v.max(1);
        }
        if let Some(v) = parsed.cache_ttl_secs {
            self.cache_ttl = Duration::from_secs(v);
        }
        if let Some(v) = parsed.fetch_concurrency {
            self.fetch_concurrency = v.max(1);
        }
        if let Some(v) = parsed.provider_deadline_secs {
            self.provider_deadline = Duration::from_secs(v.max(1));
        }
        if let Some(v) = parsed.risk_free_annual {
            self.risk_free_annual = v;
        }
        if let Some(v) = parsed.small_base_threshold {
            self.small_base_threshold = v;
        }
        if let Some(v) = parsed.preview_ttl_secs {
            self.preview_ttl = Duration::from_secs(v);
        }
        if let Some(v) = parsed.preview_drift_tolerance {
            self.preview_drift_tolerance = v;
        }
        if let Some(v) = parsed.rate_factor_classes {
            self.rate_factor_classes = v;
        }
        Ok(self)
    }

    /// The default risk profile for users with no stored override.
    #[must_use]
    pub fn default_risk_profile(&self) -> RiskProfile {
        RiskProfile::from_template(self.default_profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_overlay() {
        let config = EngineConfig::default()
            .with_toml(
                r#"
                default_profile = "trading"
                analysis_window_months = 48
                cache_ttl_secs = 60
                rate_factor_classes = ["bond"]
                "#,
            )
            .unwrap();
        assert_eq!(config.default_profile, ProfileTemplate::Trading);
        assert_eq!(config.analysis_window_months, 48);
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.rate_factor_classes, vec!["bond".to_string()]);
    }

    #[test]
    fn test_bad_template_rejected() {
        assert!(EngineConfig::default()
            .with_toml(r#"default_profile = "yolo""#)
            .is_err());
    }
}
