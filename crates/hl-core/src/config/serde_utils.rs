//! Shared serialization/deserialization utilities for configuration

/// Helper module for Duration serialization as fractional seconds
///
/// Accepts both integers and floats (`interval = 1.1`, `reconnect_interval = 5`)
/// and always writes a float, which keeps sub-second values readable in
/// TOML configuration files.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Config {
///     #[serde(with = "hl_core::config::serde_utils::duration_secs_f64")]
///     interval: Duration,
/// }
/// ```
pub mod duration_secs_f64 {
    use serde::{self, de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize a Duration as seconds (f64)
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    /// Deserialize a Duration from seconds (integer or float)
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|_| D::Error::custom(format!("invalid duration: {} seconds", secs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct TestConfig {
        #[serde(with = "duration_secs_f64")]
        timeout: Duration,
    }

    #[test]
    fn test_duration_secs_serialize() {
        let config = TestConfig {
            timeout: Duration::from_millis(1500),
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"timeout":1.5}"#);
    }

    #[test]
    fn test_duration_secs_deserialize_integer() {
        let config: TestConfig = serde_json::from_str(r#"{"timeout":60}"#).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_duration_secs_deserialize_fraction() {
        let config: TestConfig = toml::from_str("timeout = 1.1").unwrap();
        assert_eq!(config.timeout, Duration::from_secs_f64(1.1));
    }

    #[test]
    fn test_negative_duration_rejected() {
        assert!(serde_json::from_str::<TestConfig>(r#"{"timeout":-1}"#).is_err());
    }
}
