use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};

use duet_crypto::HashCost;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub hash_cost: HashCost,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = HashCost::default();

        Ok(Self {
            db_path: PathBuf::from(get("DUET_DB_PATH").unwrap_or_else(|| "duet.db".into())),
            host: get("DUET_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&get, "DUET_PORT", 8000)?,
            hash_cost: HashCost {
                memory_kib: parse_or(&get, "DUET_ARGON2_MEMORY_KIB", defaults.memory_kib)?,
                iterations: parse_or(&get, "DUET_ARGON2_ITERATIONS", defaults.iterations)?,
                parallelism: parse_or(&get, "DUET_ARGON2_PARALLELISM", defaults.parallelism)?,
            },
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{} has invalid value {:?}", key, raw)),
        None => Ok(default),
    }
}
