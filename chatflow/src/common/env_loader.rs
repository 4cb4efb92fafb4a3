//! Prefixed environment variable loading

use std::env;
use std::str::FromStr;

/// Loads `<PREFIX>_<NAME>` variables with typed fallbacks
#[derive(Debug)]
pub struct EnvLoader {
    prefix: String,
}

impl EnvLoader {
    /// Create a new environment loader with the given prefix
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    /// Full variable name for a suffix
    pub fn key(&self, suffix: &str) -> String {
        format!("{}_{}", self.prefix, suffix)
    }

    fn raw(&self, suffix: &str) -> Option<String> {
        env::var(self.key(suffix))
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Load a parsed value, keeping `default` when unset or unparseable
    pub fn load_parsed<T>(&self, suffix: &str, default: T) -> T
    where
        T: FromStr,
    {
        self.load_optional(suffix).unwrap_or(default)
    }

    /// Load an optional value
    pub fn load_optional<T>(&self, suffix: &str) -> Option<T>
    where
        T: FromStr,
    {
        let value = self.raw(suffix)?;
        match value.parse() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                tracing::warn!(
                    variable = %self.key(suffix),
                    value = %value,
                    "Ignoring unparseable environment variable"
                );
                None
            }
        }
    }

    /// Load a boolean, also accepting `1`/`0`, `yes`/`no` and `on`/`off`
    pub fn load_flag(&self, suffix: &str, default: bool) -> bool {
        match self.raw(suffix).map(|v| v.to_ascii_lowercase()).as_deref() {
            Some("1" | "true" | "yes" | "on") => true,
            Some("0" | "false" | "no" | "off") => false,
            Some(other) => {
                tracing::warn!(
                    variable = %self.key(suffix),
                    value = other,
                    "Ignoring unparseable environment flag"
                );
                default
            }
            None => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_loader_parsed_and_optional() {
        let loader = EnvLoader::new("CHATFLOW_TEST");
        let key = loader.key("NUMBER");
        assert_eq!(key, "CHATFLOW_TEST_NUMBER");

        env::remove_var(&key);
        assert_eq!(loader.load_parsed::<u32>("NUMBER", 42), 42);
        assert_eq!(loader.load_optional::<u32>("NUMBER"), None);

        env::set_var(&key, " 123 ");
        assert_eq!(loader.load_parsed::<u32>("NUMBER", 42), 123);

        env::set_var(&key, "invalid");
        assert_eq!(loader.load_parsed::<u32>("NUMBER", 42), 42);

        env::set_var(&key, "");
        assert_eq!(loader.load_optional::<u32>("NUMBER"), None);

        env::remove_var(&key);
    }

    #[test]
    #[serial]
    fn test_env_loader_flag() {
        let loader = EnvLoader::new("CHATFLOW_TEST");
        let key = loader.key("FLAG");

        for (value, expected) in [("1", true), ("YES", true), ("off", false), ("false", false)] {
            env::set_var(&key, value);
            assert_eq!(loader.load_flag("FLAG", !expected), expected, "value {}", value);
        }

        env::set_var(&key, "maybe");
        assert!(loader.load_flag("FLAG", true));

        env::remove_var(&key);
        assert!(!loader.load_flag("FLAG", false));
    }
}
