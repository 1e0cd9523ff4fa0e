mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .validate()
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./reelfetch.toml",
        "~/.config/reelfetch/config.toml",
        "/etc/reelfetch/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

impl Config {
    /// Check invariants that engine construction relies on.
    pub fn validate(&self) -> reelfetch_common::Result<()> {
        use reelfetch_common::Error;

        if self.endpoints.is_empty() {
            return Err(Error::NoEndpoints);
        }

        if self.cache.max_cache_size == 0 {
            return Err(Error::invalid_config("cache.max_cache_size must be at least 1"));
        }
        if self.cache.cleanup_interval_secs == 0 {
            return Err(Error::invalid_config(
                "cache.cleanup_interval_secs must be at least 1",
            ));
        }

        let (min, max) = self.scheduler.concurrency_bounds;
        if min == 0 {
            return Err(Error::invalid_config(
                "scheduler.concurrency_bounds minimum must be at least 1",
            ));
        }
        if min > max {
            return Err(Error::invalid_config(format!(
                "scheduler.concurrency_bounds [{min}, {max}] has min above max"
            )));
        }
        if self.scheduler.max_queue_size == 0 {
            return Err(Error::invalid_config(
                "scheduler.max_queue_size must be at least 1",
            ));
        }
        if self.scheduler.window_size == 0 {
            return Err(Error::invalid_config("scheduler.window_size must be at least 1"));
        }

        let retry = &self.retry;
        if retry.backoff_factor < 1.0 {
            return Err(Error::invalid_config("retry.backoff_factor must be >= 1.0"));
        }
        let (jmin, jmax) = retry.jitter;
        if jmin < 0.0 || jmin > jmax {
            return Err(Error::invalid_config(format!(
                "retry.jitter [{jmin}, {jmax}] must satisfy 0 <= min <= max"
            )));
        }
        if retry.attempt_timeout_secs == 0 {
            return Err(Error::invalid_config("retry.attempt_timeout_secs must be positive"));
        }

        let health = &self.health;
        if health.consecutive_failure_threshold == 0 {
            return Err(Error::invalid_config(
                "health.consecutive_failure_threshold must be at least 1",
            ));
        }
        if health.latency_cutoff_ms == 0 {
            return Err(Error::invalid_config("health.latency_cutoff_ms must be positive"));
        }
        if !(health.latency_alpha > 0.0 && health.latency_alpha <= 1.0) {
            return Err(Error::invalid_config("health.latency_alpha must be in (0, 1]"));
        }
        if health.probe_concurrency == 0 {
            return Err(Error::invalid_config("health.probe_concurrency must be at least 1"));
        }

        if self.rate_limit.fast_threshold_ms > self.rate_limit.slow_threshold_ms {
            return Err(Error::invalid_config(
                "rate_limit.fast_threshold_ms must not exceed slow_threshold_ms",
            ));
        }

        if self.http.user_agents.is_empty() {
            tracing::warn!("No user agents configured; requests will use the client default");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use reelfetch_common::Error;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.max_cache_size, 1000);
        assert_eq!(config.scheduler.concurrency_bounds, (1, 20));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.rate_limit.rate_limit_interval_ms, 200);
        assert_eq!(config.endpoints.candidates().len(), 4);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [cache]
            max_cache_size = 10

            [scheduler]
            concurrency_bounds = [2, 4]
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.max_cache_size, 10);
        assert_eq!(config.cache.default_ttl_secs, 1800);
        assert_eq!(config.scheduler.min_workers(), 2);
        assert_eq!(config.scheduler.max_workers(), 4);
        assert_eq!(config.health.probe_path, "w185/test.jpg");
    }

    #[test]
    fn test_empty_endpoints_rejected() {
        let mut config = Config::default();
        config.endpoints.primary.clear();
        config.endpoints.fallback.clear();
        assert_matches!(config.validate(), Err(Error::NoEndpoints));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let mut config = Config::default();
        config.scheduler.concurrency_bounds = (5, 2);
        assert_matches!(config.validate(), Err(Error::InvalidConfig(_)));

        config.scheduler.concurrency_bounds = (0, 2);
        assert_matches!(config.validate(), Err(Error::InvalidConfig(_)));
    }

    #[test]
    fn test_emergency_endpoint_falls_back_to_first_primary() {
        let mut endpoints = EndpointsConfig::default();
        assert_eq!(
            endpoints.emergency_endpoint().as_deref(),
            Some("https://image.tmdb.org/t/p/")
        );

        endpoints.emergency = Some("https://backup.example/".to_string());
        assert_eq!(
            endpoints.emergency_endpoint().as_deref(),
            Some("https://backup.example/")
        );
    }

    #[test]
    fn test_tiered_preserves_order() {
        let endpoints = EndpointsConfig {
            primary: vec!["a".into()],
            fallback: vec!["b".into()],
            regional: vec!["c".into()],
            emergency: None,
        };
        let tiers: Vec<_> = endpoints.tiered().into_iter().map(|(_, t)| t).collect();
        assert_eq!(
            tiers,
            vec![
                reelfetch_common::EndpointTier::Primary,
                reelfetch_common::EndpointTier::Fallback,
                reelfetch_common::EndpointTier::Regional,
            ]
        );
    }
}
