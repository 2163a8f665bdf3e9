use std::path::Path;

use config::{Config, File, FileFormat};
use eyre::{Result, WrapErr};

use crate::config::models::DirectorsFile;

/// Load a directors file using the config crate.
/// Supports multiple formats: TOML, YAML, JSON, etc.
pub fn load_config(config_path: &str) -> Result<DirectorsFile> {
    let path = Path::new(config_path);

    // Determine file format based on extension
    let format = match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Toml,
    };

    let settings = Config::builder()
        .add_source(File::new(
            path.to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", path.display()))?,
            format,
        ))
        .build()
        .wrap_err_with(|| format!("Failed to build config from {}", path.display()))?;

    let directors: DirectorsFile = settings
        .try_deserialize()
        .wrap_err_with(|| format!("Failed to deserialize config from {}", path.display()))?;

    Ok(directors)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::config::models::{ShareScope, TtlSource};

    #[test]
    fn test_load_toml_config() {
        let toml_content = r#"
[directors.origin]
port = "8080"
share = "HOST"
ttl = 30.0

[directors.api]
ttl_from = "min"
whitelist = ["10.0.0.0/8"]

[dns]
parallel = 4
upstreams = ["192.0.2.53"]
"#;

        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let loaded = load_config(temp_file.path().to_str().unwrap()).unwrap();
        assert_eq!(loaded.directors.len(), 2);
        let origin = &loaded.directors["origin"];
        assert_eq!(origin.port, "8080");
        assert_eq!(origin.share, ShareScope::Host);
        assert_eq!(origin.ttl, 30.0);
        assert_eq!(loaded.directors["api"].ttl_from, TtlSource::Min);
        assert_eq!(loaded.dns.unwrap().parallel, 4);
    }

    #[test]
    fn test_load_yaml_config() {
        let yaml_content = r#"
directors:
  origin:
    port: "https"
    max_connections: 64
"#;

        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let loaded = load_config(temp_file.path().to_str().unwrap()).unwrap();
        assert_eq!(loaded.directors["origin"].port, "https");
        assert_eq!(loaded.directors["origin"].max_connections, 64);
        assert!(loaded.dns.is_none());
    }
}
