use std::time::Duration;

/// Process-wide configuration. A database DSN is the only required value
/// (spec §6, "Environment/config"); everything else has the default the
/// spec calls out.
#[derive(Debug, Clone)]
pub struct CognisConfig {
    pub database_url: String,
    pub pool_min_size: u32,
    pub pool_max_size: u32,
    pub notify_channel: String,
    pub retention_decay_rate: f64,
    pub retention_cleanup_interval: Duration,
    pub retention_cleanup_threshold: f64,
    pub retention_min_age_days: i64,
    pub context_max_tokens: usize,
    pub context_system_ratio: f64,
    pub context_facts_ratio: f64,
    pub context_memories_ratio: f64,
    pub context_history_ratio: f64,
    pub retrieval_l0_limit: usize,
    pub retrieval_l1_limit: usize,
    pub retrieval_ef_search: u32,
    pub heartbeat_interval: Duration,
}

impl CognisConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            pool_min_size: 2,
            pool_max_size: 10,
            notify_channel: "event_stream".to_string(),
            retention_decay_rate: 0.1,
            retention_cleanup_interval: Duration::from_secs(24 * 60 * 60),
            retention_cleanup_threshold: 0.1,
            retention_min_age_days: 7,
            context_max_tokens: 8000,
            context_system_ratio: 0.1,
            context_facts_ratio: 0.2,
            context_memories_ratio: 0.3,
            context_history_ratio: 0.4,
            retrieval_l0_limit: 50,
            retrieval_l1_limit: 10,
            retrieval_ef_search: 200,
            heartbeat_interval: Duration::from_secs(30),
        }
    }

    /// Builds a config from environment variables, falling back to the
    /// defaults above for anything unset. Mirrors the way the ADK's
    /// `ServerConfig` layers env vars over builder defaults.
    pub fn from_env() -> crate::Result<Self> {
        let database_url = std::env::var("COGNIS_DATABASE_URL").map_err(|_| {
            crate::CognisError::Validation("COGNIS_DATABASE_URL is required".to_string())
        })?;

        let mut config = Self::new(database_url);

        if let Ok(v) = std::env::var("COGNIS_POOL_MIN_SIZE") {
            config.pool_min_size = v.parse().unwrap_or(config.pool_min_size);
        }
        if let Ok(v) = std::env::var("COGNIS_POOL_MAX_SIZE") {
            config.pool_max_size = v.parse().unwrap_or(config.pool_max_size);
        }
        if let Ok(v) = std::env::var("COGNIS_RETENTION_DECAY_RATE") {
            config.retention_decay_rate = v.parse().unwrap_or(config.retention_decay_rate);
        }
        if let Ok(v) = std::env::var("COGNIS_CONTEXT_MAX_TOKENS") {
            config.context_max_tokens = v.parse().unwrap_or(config.context_max_tokens);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CognisConfig::new("postgres://localhost/cognis");
        assert_eq!(config.pool_min_size, 2);
        assert_eq!(config.pool_max_size, 10);
        assert_eq!(config.retention_decay_rate, 0.1);
        assert_eq!(config.context_max_tokens, 8000);
        assert_eq!(config.notify_channel, "event_stream");
    }

    #[test]
    fn test_from_env_requires_dsn() {
        // SAFETY: test runs single-threaded w.r.t. this var via serial execution
        // within the process; we only assert on absence here.
        unsafe {
            std::env::remove_var("COGNIS_DATABASE_URL");
        }
        assert!(CognisConfig::from_env().is_err());
    }
}
