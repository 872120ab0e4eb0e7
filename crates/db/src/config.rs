//! Connection settings.

use crate::DbError;

/// Default ceiling for the connection pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Schema that holds the custom types when none is configured.
pub const DEFAULT_TYPES_SCHEMA: &str = "public";

/// Everything needed to open a pool and register the custom types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Schema the `email` domain and its functions live in.
    pub types_schema: String,
}

impl DbConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            types_schema: DEFAULT_TYPES_SCHEMA.to_string(),
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_types_schema(mut self, schema: impl Into<String>) -> Self {
        self.types_schema = schema.into();
        self
    }

    /// Read `DATABASE_URL` (required), `DB_MAX_CONNECTIONS` and `DB_TYPES_SCHEMA`.
    pub fn from_env() -> Result<Self, DbError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), except that a given `database_url`
    /// wins over `DATABASE_URL`.
    pub fn from_env_with_url(database_url: Option<String>) -> Result<Self, DbError> {
        Self::from_lookup(with_url(database_url, |key| std::env::var(key).ok()))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DbError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| DbError::Config("DATABASE_URL is not set".to_string()))?;

        let mut config = Self::new(database_url);

        if let Some(raw) = lookup("DB_MAX_CONNECTIONS") {
            let max = raw.trim().parse::<u32>().map_err(|_| {
                DbError::Config(format!("DB_MAX_CONNECTIONS must be a positive integer, got '{raw}'"))
            })?;
            if max == 0 {
                return Err(DbError::Config("DB_MAX_CONNECTIONS must be at least 1".to_string()));
            }
            config.max_connections = max;
        }

        if let Some(schema) = lookup("DB_TYPES_SCHEMA").filter(|s| !s.trim().is_empty()) {
            config.types_schema = schema;
        }

        Ok(config)
    }
}

fn with_url(
    database_url: Option<String>,
    lookup: impl Fn(&str) -> Option<String>,
) -> impl Fn(&str) -> Option<String> {
    move |key| match (key, &database_url) {
        ("DATABASE_URL", Some(url)) => Some(url.clone()),
        _ => lookup(key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_url_is_set() {
        let config = DbConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/app")]))
            .expect("config");
        assert_eq!(config.database_url, "postgres://localhost/app");
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.types_schema, DEFAULT_TYPES_SCHEMA);
    }

    #[test]
    fn missing_url_is_a_config_error() {
        assert!(matches!(DbConfig::from_lookup(lookup(&[])), Err(DbError::Config(_))));
    }

    #[test]
    fn overrides_are_read() {
        let config = DbConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/app"),
            ("DB_MAX_CONNECTIONS", "12"),
            ("DB_TYPES_SCHEMA", "app_types"),
        ]))
        .expect("config");
        assert_eq!(config.max_connections, 12);
        assert_eq!(config.types_schema, "app_types");
    }

    #[test]
    fn explicit_url_wins_and_the_rest_still_comes_from_the_environment() {
        let env = lookup(&[("DATABASE_URL", "postgres://env/app"), ("DB_MAX_CONNECTIONS", "7")]);
        let config = DbConfig::from_lookup(with_url(Some("postgres://flag/app".to_string()), env))
            .expect("config");
        assert_eq!(config.database_url, "postgres://flag/app");
        assert_eq!(config.max_connections, 7);

        let env = lookup(&[("DATABASE_URL", "postgres://env/app")]);
        let config = DbConfig::from_lookup(with_url(None, env)).expect("config");
        assert_eq!(config.database_url, "postgres://env/app");

        assert!(matches!(
            DbConfig::from_lookup(with_url(None, lookup(&[]))),
            Err(DbError::Config(_))
        ));
    }

    #[test]
    fn bad_pool_size_is_rejected() {
        for raw in ["zero", "0", "-3"] {
            let result = DbConfig::from_lookup(lookup(&[
                ("DATABASE_URL", "postgres://db/app"),
                ("DB_MAX_CONNECTIONS", raw),
            ]));
            assert!(matches!(result, Err(DbError::Config(_))), "{raw} should be rejected");
        }
    }
}
