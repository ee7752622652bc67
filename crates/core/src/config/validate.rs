use super::{types::Config, ConfigError};

/// Checks what serde cannot express.
///
/// Metric and item rules are already validated while deserializing.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let fail = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

    if config.library.sections.is_empty() {
        return fail("library.sections cannot be empty");
    }
    if config.library.url.trim().is_empty() {
        return fail("library.url cannot be empty");
    }
    if config.pools.transcoders == 0 {
        return fail("pools.transcoders must be at least 1");
    }
    if config.orchestrator.loop_interval_ms == 0 {
        return fail("orchestrator.loop_interval_ms cannot be 0");
    }
    if config.orchestrator.failed_codes.contains(&0) {
        return fail("orchestrator.failed_codes cannot contain 0 (success)");
    }
    if config.transcoder.cache_dir.as_os_str().is_empty() {
        return fail("transcoder.cache_dir cannot be empty");
    }
    if config.transcoder.engine.container.is_empty() {
        return fail("transcoder.engine.container cannot be empty");
    }
    for mapping in &config.path_mappings {
        if !mapping.remote.starts_with('/') || !mapping.local.is_absolute() {
            return Err(ConfigError::ValidationError(format!(
                "path mapping {} -> {} must use absolute paths",
                mapping.remote,
                mapping.local.display()
            )));
        }
    }
    if config.server.enabled && config.server.port == 0 {
        return fail("server.port cannot be 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;
    use crate::library::PathMapping;
    use std::path::PathBuf;

    fn valid() -> Config {
        load_config_from_str(
            r#"
[library]
url = "http://127.0.0.1:32400"
token = "t"
sections = ["1"]

[database]
path = "/tmp/library.db"

[transcoder]
cache_dir = "/tmp/cache"
"#,
        )
        .unwrap()
    }

    fn assert_invalid(config: &Config) {
        assert!(matches!(
            validate_config(config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_validate_empty_sections_fails() {
        let mut config = valid();
        config.library.sections.clear();
        assert_invalid(&config);
    }

    #[test]
    fn test_validate_zero_pool_fails() {
        let mut config = valid();
        config.pools.transcoders = 0;
        assert_invalid(&config);
    }

    #[test]
    fn test_validate_zero_interval_fails() {
        let mut config = valid();
        config.orchestrator.loop_interval_ms = 0;
        assert_invalid(&config);
    }

    #[test]
    fn test_validate_success_code_as_failure_fails() {
        let mut config = valid();
        config.orchestrator.failed_codes.push(0);
        assert_invalid(&config);
    }

    #[test]
    fn test_validate_empty_cache_dir_fails() {
        let mut config = valid();
        config.transcoder.cache_dir = PathBuf::new();
        assert_invalid(&config);
    }

    #[test]
    fn test_validate_relative_mapping_fails() {
        let mut config = valid();
        config.path_mappings.push(PathMapping {
            remote: "/data".to_string(),
            local: PathBuf::from("mnt/nas"),
        });
        assert_invalid(&config);
    }

    #[test]
    fn test_validate_port_zero_only_when_enabled() {
        let mut config = valid();
        config.server.port = 0;
        assert_invalid(&config);

        config.server.enabled = false;
        assert!(validate_config(&config).is_ok());
    }
}
