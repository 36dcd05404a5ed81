use std::{path::PathBuf, str::FromStr};

use anyhow::Context;
use derive_builder::Builder;

/// Runtime settings for the api server. Anything not set falls back to
/// [`Config::default`].
#[derive(Builder, Debug, Clone)]
#[builder(default, setter(into))]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub bind_address: String,
    pub port: u16,
    /// file served at `/`
    pub landing_page: PathBuf,
    pub static_dir: PathBuf,
    pub log_level: tracing::Level,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:database.sqlite".to_string(),
            database_max_connections: 5,
            bind_address: "127.0.0.1".to_string(),
            port: 3000,
            landing_page: PathBuf::from("pages/index.html"),
            static_dir: PathBuf::from("static"),
            log_level: tracing::Level::INFO,
        }
    }
}

impl Config {
    /// Read the config from process environment. Call `dotenvy::dotenv()`
    /// first if a `.env` file should be honoured.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = ConfigBuilder::default();

        if let Some(url) = lookup("DATABASE_URL") {
            builder.database_url(url);
        }
        if let Some(max) = parse_var::<u32, _>(&lookup, "DATABASE_MAX_CONNECTIONS")? {
            builder.database_max_connections(max);
        }
        if let Some(addr) = lookup("BIND_ADDRESS") {
            builder.bind_address(addr);
        }
        if let Some(port) = parse_var::<u16, _>(&lookup, "PORT")? {
            builder.port(port);
        }
        if let Some(page) = lookup("LANDING_PAGE") {
            builder.landing_page(page);
        }
        if let Some(dir) = lookup("STATIC_DIR") {
            builder.static_dir(dir);
        }
        if let Some(level) = parse_var::<tracing::Level, _>(&lookup, "LOG_LEVEL")? {
            builder.log_level(level);
        }

        Ok(builder.build()?)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("invalid value {raw:?} for {key}"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.database_url, "sqlite:database.sqlite");
        assert_eq!(config.port, 3000);
        assert_eq!(config.landing_page, PathBuf::from("pages/index.html"));
        assert_eq!(config.log_level, tracing::Level::INFO);
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "sqlite:/srv/food.sqlite"),
            ("PORT", "8080"),
            ("DATABASE_MAX_CONNECTIONS", "2"),
            ("LOG_LEVEL", "debug"),
        ]))
        .unwrap();
        assert_eq!(config.database_url, "sqlite:/srv/food.sqlite");
        assert_eq!(config.port, 8080);
        assert_eq!(config.database_max_connections, 2);
        assert_eq!(config.log_level, tracing::Level::DEBUG);
        assert_eq!(config.bind_address, "127.0.0.1");
    }

    #[test]
    fn bad_port_is_an_error() {
        let err = Config::from_lookup(lookup_from(&[("PORT", "http")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn builder_fills_unset_fields() {
        let config = ConfigBuilder::default()
            .database_url("sqlite::memory:")
            .build()
            .unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.static_dir, PathBuf::from("static"));
    }
}
