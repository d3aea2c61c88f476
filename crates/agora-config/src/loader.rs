use crate::AppConfig;
use agora_core::CoreError;
use config::{Config, Environment, File};
use std::path::{Path, PathBuf};

pub fn load_config(path: Option<&str>) -> Result<AppConfig, CoreError> {
    let mut builder = Config::builder();
    match path {
        Some(p) => {
            let pathbuf = PathBuf::from(p);
            if pathbuf.exists() {
                tracing::info!(path = %pathbuf.display(), "Loading configuration file");
                builder = builder.add_source(File::from(pathbuf));
            } else {
                tracing::warn!(path = %p, "Configuration file not found, using defaults");
            }
        }
        None => {
            // Try default root-level file
            let default_path = PathBuf::from("agora.toml");
            if default_path.exists() {
                tracing::info!(path = %default_path.display(), "Loading configuration file");
                builder = builder.add_source(File::from(default_path));
            }
        }
    }
    // Environment variable overrides, e.g., AGORA__REDIS__URL=redis://cache:6379
    builder = builder.add_source(
        Environment::with_prefix("AGORA")
            .try_parsing(true)
            .separator("__"),
    );
    let cfg = builder
        .build()
        .map_err(|e| CoreError::configuration(format!("config build error: {e}")))?;
    let merged: AppConfig = cfg
        .try_deserialize()
        .map_err(|e| CoreError::configuration(format!("config deserialize error: {e}")))?;
    merged.validate().map_err(CoreError::configuration)?;
    Ok(merged)
}

pub fn load_config_with_default_path<P: AsRef<Path>>(path: Option<P>) -> Result<AppConfig, CoreError> {
    let p = path
        .as_ref()
        .map(|p| p.as_ref().to_string_lossy().to_string());
    load_config(p.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let config = load_config(Some("/nonexistent/agora.toml")).unwrap();
        assert!(!config.redis.enabled);
        assert_eq!(config.session.ttl_secs, 86_400);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
[redis]
enabled = false
pool_size = 4

[session]
ttl_secs = 3600

[metering.tiers.free]
ai_interactions = 10
"#
        )
        .unwrap();

        let config = load_config(file.path().to_str()).unwrap();
        assert_eq!(config.redis.pool_size, 4);
        assert_eq!(config.session.ttl_secs, 3600);
        assert_eq!(
            config.metering.tiers["free"]["ai_interactions"],
            10
        );
    }

    #[test]
    fn test_load_config_rejects_invalid_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
[session]
ttl_secs = 0
"#
        )
        .unwrap();

        let err = load_config(file.path().to_str()).unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
        assert_eq!(err.category(), agora_core::ErrorCategory::Configuration);
    }
}
