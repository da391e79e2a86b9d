//! Environment helpers shared by the workspace's config loaders.
//!
//! Every key is read as `DOCBATCH_{KEY}`; empty values count as unset.

use std::env;
use std::str::FromStr;

/// Prefix applied to every environment key read through this module.
pub const ENV_PREFIX: &str = "DOCBATCH";

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn prefixed(key: &str) -> String {
    format!("{}_{}", ENV_PREFIX, key)
}

/// Read `DOCBATCH_{key}`, treating empty strings as unset.
pub fn env_opt(key: &str) -> Option<String> {
    env::var(prefixed(key)).ok().filter(|s| !s.trim().is_empty())
}

/// Read and parse `DOCBATCH_{key}`.
///
/// Unparseable values are logged and ignored so a typo in the environment
/// never takes the process down.
pub fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env_opt(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key = %prefixed(key), value = %raw, "ignoring unparseable env override");
            None
        }
    }
}

/// Overwrite `target` when `DOCBATCH_{key}` is set and parses.
pub fn override_from_env<T: FromStr>(target: &mut T, key: &str) {
    if let Some(v) = env_parse(key) {
        *target = v;
    }
}
