use std::env;
use std::time::Duration;

use fedi_relationships::FollowSettings;

/// CLI configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// API root of the local node, e.g. `http://localhost:8000/api/`
    pub api_base: String,
    pub viewer_id: Option<String>,
    pub reconcile_delay: Duration,
    pub cache_window: Duration,
    pub http_timeout: Duration,
}

impl Config {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let api_base = lookup("FEDI_API_BASE")
            .unwrap_or_else(|| "http://localhost:8000/api/".to_string());

        let viewer_id = lookup("FEDI_VIEWER_ID").filter(|id| !id.trim().is_empty());

        let reconcile_delay = lookup("FEDI_RECONCILE_DELAY_MS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(3000));

        let cache_window = lookup("FEDI_CACHE_WINDOW_SECS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        let http_timeout = lookup("FEDI_HTTP_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        Self {
            api_base,
            viewer_id,
            reconcile_delay,
            cache_window,
            http_timeout,
        }
    }

    pub fn follow_settings(&self) -> FollowSettings {
        FollowSettings {
            reconcile_delay: self.reconcile_delay,
            cache_window: self.cache_window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config.api_base, "http://localhost:8000/api/");
        assert_eq!(config.viewer_id, None);
        assert_eq!(config.reconcile_delay, Duration::from_millis(3000));
        assert_eq!(config.cache_window, Duration::from_secs(30));
        assert_eq!(config.http_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("FEDI_API_BASE", "https://nodeA.example/api/"),
            ("FEDI_VIEWER_ID", "11111111-1111-1111-1111-111111111111"),
            ("FEDI_RECONCILE_DELAY_MS", "500"),
            ("FEDI_CACHE_WINDOW_SECS", "5"),
        ]);
        assert_eq!(config.api_base, "https://nodeA.example/api/");
        assert_eq!(
            config.viewer_id.as_deref(),
            Some("11111111-1111-1111-1111-111111111111")
        );
        let settings = config.follow_settings();
        assert_eq!(settings.reconcile_delay, Duration::from_millis(500));
        assert_eq!(settings.cache_window, Duration::from_secs(5));
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = config(&[("FEDI_RECONCILE_DELAY_MS", "soon"), ("FEDI_VIEWER_ID", " ")]);
        assert_eq!(config.reconcile_delay, Duration::from_millis(3000));
        assert_eq!(config.viewer_id, None);
    }
}
