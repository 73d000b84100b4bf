//! Configuration loading helpers
//!
//! Services describe their configuration as a plain `Deserialize` struct and
//! load it here from an optional JSON file merged with prefixed environment
//! variables (`PREFIX_SECTION__KEY`). Missing required keys surface as
//! configuration errors, which are fatal at startup only.

use std::path::Path;

use figment::{
    providers::{Env, Format, Json},
    Figment,
};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Load configuration from an optional JSON file plus environment overrides.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed, `__` separates sections)
/// 2. JSON config file
/// 3. `serde` defaults on the target struct
pub fn load_config<T>(path: Option<&Path>, env_prefix: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let mut figment = Figment::new();
    if let Some(path) = path {
        figment = figment.merge(Json::file(path));
    }
    figment = figment.merge(Env::prefixed(env_prefix).split("__"));

    figment
        .extract()
        .map_err(|e| Error::Config(format!("Failed to load configuration: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct DemoConfig {
        #[serde(default = "default_name")]
        name: String,
        #[serde(default)]
        retries: u32,
    }

    fn default_name() -> String {
        "demo".to_string()
    }

    #[test]
    fn test_defaults_without_sources() {
        let config: DemoConfig = load_config(None, "FIELDGATE_TEST_").expect("load");
        assert_eq!(config.name, "demo");
        assert_eq!(config.retries, 0);
    }

    #[test]
    fn test_json_file_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("config.json", r#"{ "name": "plant-7", "retries": 3 }"#)?;
            let config: DemoConfig =
                load_config(Some(Path::new("config.json")), "FIELDGATE_TEST_")
                    .expect("load from file");
            assert_eq!(config.name, "plant-7");
            assert_eq!(config.retries, 3);
            Ok(())
        });
    }
}
