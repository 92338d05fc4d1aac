use anyhow::{Context, Result};

/// Connection settings for [`crate::postgres::PostgresStore`].
///
/// `url` may carry credentials and must not be logged.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
}

impl PostgresConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 5,
            connect_timeout_ms: 5_000,
            acquire_timeout_ms: 5_000,
        }
    }

    pub fn from_env() -> Result<Self> {
        let url = std::env::var("DOCSTORE_POSTGRES_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .with_context(|| "DOCSTORE_POSTGRES_URL or DATABASE_URL must be set")?;
        let mut config = Self::new(url);
        if let Ok(value) = std::env::var("DOCSTORE_POSTGRES_MAX_CONNECTIONS") {
            config.max_connections = value
                .parse()
                .with_context(|| "parse DOCSTORE_POSTGRES_MAX_CONNECTIONS")?;
        }
        if let Ok(value) = std::env::var("DOCSTORE_POSTGRES_CONNECT_TIMEOUT_MS") {
            config.connect_timeout_ms = value
                .parse()
                .with_context(|| "parse DOCSTORE_POSTGRES_CONNECT_TIMEOUT_MS")?;
        }
        if let Ok(value) = std::env::var("DOCSTORE_POSTGRES_ACQUIRE_TIMEOUT_MS") {
            config.acquire_timeout_ms = value
                .parse()
                .with_context(|| "parse DOCSTORE_POSTGRES_ACQUIRE_TIMEOUT_MS")?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bound_pool_and_timeouts() {
        let config = PostgresConfig::new("postgres://localhost/policies");
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.connect_timeout_ms, 5_000);
        assert_eq!(config.acquire_timeout_ms, 5_000);
    }
}
