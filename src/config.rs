use std::str::FromStr;

use anyhow::{ensure, Context};

use crate::heatmap::MAX_WINDOW_MONTHS;

pub const DEFAULT_TEACHER: &str = "Rahul";
pub const DEFAULT_HEATMAP_MONTHS: u32 = 3;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub default_teacher: String,
    pub heatmap_months: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|value| !value.trim().is_empty())
            .context("DATABASE_URL must be set to the ledger's Postgres instance")?;

        let heatmap_months = parse_or(&lookup, "LEDGER_HEATMAP_MONTHS", DEFAULT_HEATMAP_MONTHS)?;
        ensure!(
            (1..=MAX_WINDOW_MONTHS).contains(&heatmap_months),
            "LEDGER_HEATMAP_MONTHS must be between 1 and {MAX_WINDOW_MONTHS}, got {heatmap_months}"
        );

        Ok(Self {
            database_url,
            max_connections: parse_or(&lookup, "LEDGER_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            default_teacher: lookup("LEDGER_DEFAULT_TEACHER")
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TEACHER.to_string()),
            heatmap_months,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a number, got {raw:?}")),
        None => Ok(default),
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
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn requires_database_url() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn fills_defaults() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/ledger")]))
            .unwrap();
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.default_teacher, DEFAULT_TEACHER);
        assert_eq!(config.heatmap_months, DEFAULT_HEATMAP_MONTHS);
    }

    #[test]
    fn reads_overrides_and_rejects_garbage() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/ledger"),
            ("LEDGER_MAX_CONNECTIONS", "12"),
            ("LEDGER_DEFAULT_TEACHER", "Priya"),
            ("LEDGER_HEATMAP_MONTHS", " 6 "),
        ]))
        .unwrap();
        assert_eq!(config.max_connections, 12);
        assert_eq!(config.default_teacher, "Priya");
        assert_eq!(config.heatmap_months, 6);

        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/ledger"),
            ("LEDGER_HEATMAP_MONTHS", "six"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("LEDGER_HEATMAP_MONTHS"));
    }

    #[test]
    fn heatmap_months_must_be_in_range() {
        for raw in ["0", "121", "4294967295"] {
            let err = Config::from_lookup(lookup(&[
                ("DATABASE_URL", "postgres://localhost/ledger"),
                ("LEDGER_HEATMAP_MONTHS", raw),
            ]))
            .unwrap_err();
            assert!(err.to_string().contains("between 1 and 120"), "{raw}: {err}");
        }

        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/ledger"),
            ("LEDGER_HEATMAP_MONTHS", "120"),
        ]))
        .unwrap();
        assert_eq!(config.heatmap_months, MAX_WINDOW_MONTHS);
    }
}
