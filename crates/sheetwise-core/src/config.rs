//! Environment configuration shared by the service crates.
//!
//! Every setting is a `SHEETWISE_*` variable. Each crate extracts its own
//! serde struct from [`figment`]; unknown keys belong to the other crates and
//! are ignored.
//!
//! ```bash
//! SHEETWISE_PORT=9090
//! SHEETWISE_MODEL=gpt-4o
//! SHEETWISE_DATA_DIR=/var/lib/sheetwise
//! ```

use std::time::Duration;

use figment::Figment;
use figment::providers::Env;
use serde::{Deserialize, Deserializer};

pub const ENV_PREFIX: &str = "SHEETWISE_";

/// Layered environment sources, later merges winning.
///
/// `OPENAI_API_KEY` is accepted as a fallback for `SHEETWISE_API_KEY`.
pub fn figment() -> Figment {
    Figment::new()
        .merge(Env::raw().only(&["OPENAI_API_KEY"]).map(|_| "api_key".into()))
        .merge(Env::prefixed(ENV_PREFIX))
}

/// Scalars as the environment provider hands them over; `8080` arrives as a
/// number even when the field is a string.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Flag(bool),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Text(text) => text,
            Scalar::Unsigned(n) => n.to_string(),
            Scalar::Signed(n) => n.to_string(),
            Scalar::Float(n) => n.to_string(),
            Scalar::Flag(b) => b.to_string(),
        }
    }
}

/// Trimmed string; blank values count as unset.
pub fn optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Scalar>::deserialize(deserializer)?;
    Ok(value
        .map(|scalar| scalar.into_string().trim().to_string())
        .filter(|text| !text.is_empty()))
}

/// Whole seconds, as in `SHEETWISE_TIMEOUT_SECS=90`.
pub fn duration_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}

/// Whole milliseconds, as in `SHEETWISE_RETRY_BASE_MS=500`.
pub fn duration_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[derive(Debug, Deserialize, Default)]
    #[serde(default)]
    struct Settings {
        #[serde(deserialize_with = "optional_string")]
        api_key: Option<String>,
        #[serde(deserialize_with = "optional_string")]
        admin_token: Option<String>,
        #[serde(deserialize_with = "duration_secs")]
        timeout_secs: Duration,
        #[serde(deserialize_with = "duration_millis")]
        retry_base_ms: Duration,
    }

    #[test]
    fn test_prefixed_values_and_helpers() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("SHEETWISE_ADMIN_TOKEN", "12345");
            jail.set_env("SHEETWISE_TIMEOUT_SECS", "30");
            jail.set_env("SHEETWISE_RETRY_BASE_MS", "250");

            let settings: Settings = figment().extract()?;
            assert_eq!(settings.admin_token.as_deref(), Some("12345"));
            assert_eq!(settings.timeout_secs, Duration::from_secs(30));
            assert_eq!(settings.retry_base_ms, Duration::from_millis(250));
            assert_eq!(settings.api_key, None);
            Ok(())
        });
    }

    #[test]
    fn test_api_key_fallback_and_precedence() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("OPENAI_API_KEY", "sk-fallback");
            let settings: Settings = figment().extract()?;
            assert_eq!(settings.api_key.as_deref(), Some("sk-fallback"));

            jail.set_env("SHEETWISE_API_KEY", "sk-primary");
            let settings: Settings = figment().extract()?;
            assert_eq!(settings.api_key.as_deref(), Some("sk-primary"));
            Ok(())
        });
    }

    #[test]
    fn test_blank_strings_are_unset() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("SHEETWISE_ADMIN_TOKEN", "   ");
            let settings: Settings = figment().extract()?;
            assert_eq!(settings.admin_token, None);
            Ok(())
        });
    }
}
