use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::core::error::{ImportError, ImportResult};
use crate::modules::adapters::SourceType;
use crate::modules::converters::phpbb;

/// Settings file describing one migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub pipeline: PipelineSettings,

    pub source_db: DatabaseConfig,

    #[serde(default)]
    pub phpbb: PhpBbSettings,

    #[serde(default)]
    pub intermediate_db: IntermediateConfig,

    pub destination_db: DatabaseConfig,

    #[serde(default)]
    pub steps: StepSelection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Source platform, e.g. "phpbb" or "discourse"
    pub converter: String,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(rename = "type")]
    pub db_type: String,

    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhpBbSettings {
    #[serde(default = "default_phpbb_prefix")]
    pub table_prefix: String,

    /// Directory holding phpBB's uploaded attachment files
    #[serde(default = "default_attachment_path")]
    pub attachment_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntermediateConfig {
    #[serde(default = "default_intermediate_path")]
    pub path: PathBuf,
}

/// Restricts a run to some steps, by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepSelection {
    #[serde(default)]
    pub only: Vec<String>,

    #[serde(default)]
    pub skip: Vec<String>,
}

impl StepSelection {
    pub fn includes(&self, name: &str) -> bool {
        let selected = self.only.is_empty() || self.only.iter().any(|n| n == name);
        selected && !self.skip.iter().any(|n| n == name)
    }
}

// Default value functions
fn default_batch_size() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_connections() -> u32 {
    4
}

fn default_phpbb_prefix() -> String {
    phpbb::DEFAULT_TABLE_PREFIX.to_string()
}

fn default_attachment_path() -> String {
    "files".to_string()
}

fn default_intermediate_path() -> PathBuf {
    PathBuf::from("intermediate.db")
}

impl Default for PhpBbSettings {
    fn default() -> Self {
        Self {
            table_prefix: default_phpbb_prefix(),
            attachment_path: default_attachment_path(),
        }
    }
}

impl Default for IntermediateConfig {
    fn default() -> Self {
        Self {
            path: default_intermediate_path(),
        }
    }
}

pub const CONVERTERS: [&str; 2] = ["phpbb", "discourse"];
pub const DESTINATION_TYPES: [&str; 2] = ["postgres", "sqlite"];

impl Settings {
    pub async fn from_file<P: AsRef<Path>>(path: P) -> ImportResult<Self> {
        let content = fs::read_to_string(path).await?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> ImportResult<Self> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> ImportResult<()> {
        if !CONVERTERS.contains(&self.pipeline.converter.as_str()) {
            return Err(ImportError::config(format!(
                "Unknown converter '{}'. Must be one of: {:?}",
                self.pipeline.converter, CONVERTERS
            )));
        }

        if self.pipeline.batch_size == 0 {
            return Err(ImportError::config("batch_size must be greater than 0"));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.pipeline.log_level.as_str()) {
            return Err(ImportError::config(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.pipeline.log_level, valid_log_levels
            )));
        }

        let source_type: SourceType = self.source_db.db_type.parse()?;
        if self.pipeline.converter == "discourse" && source_type != SourceType::Postgres {
            return Err(ImportError::config(
                "The discourse converter reads from a postgres source",
            ));
        }

        if !DESTINATION_TYPES.contains(&self.destination_db.db_type.as_str()) {
            return Err(ImportError::config(format!(
                "Unknown destination type '{}'. Must be one of: {:?}",
                self.destination_db.db_type, DESTINATION_TYPES
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
[pipeline]
converter = "phpbb"

[source_db]
type = "mysql"
url = "mysql://root@localhost/phpbb"

[phpbb]
table_prefix = "forum_"

[destination_db]
type = "postgres"
url = "postgres://discourse@localhost/discourse"

[steps]
skip = ["phpbb.uploads"]
"#;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::from_str(VALID).unwrap();
        assert_eq!(settings.pipeline.batch_size, 1000);
        assert_eq!(settings.pipeline.log_level, "info");
        assert_eq!(settings.source_db.max_connections, 4);
        assert_eq!(settings.phpbb.table_prefix, "forum_");
        assert_eq!(settings.phpbb.attachment_path, "files");
        assert_eq!(settings.intermediate_db.path, PathBuf::from("intermediate.db"));
    }

    #[test]
    fn test_step_selection() {
        let settings = Settings::from_str(VALID).unwrap();
        assert!(settings.steps.includes("phpbb.users"));
        assert!(!settings.steps.includes("phpbb.uploads"));

        let only = StepSelection {
            only: vec!["import.users".to_string()],
            skip: vec![],
        };
        assert!(only.includes("import.users"));
        assert!(!only.includes("import.groups"));
    }

    #[test]
    fn test_unknown_source_type_is_rejected() {
        let content = VALID.replace(r#"type = "mysql""#, r#"type = "oracle""#);
        assert!(matches!(
            Settings::from_str(&content),
            Err(ImportError::UnknownSourceType(_))
        ));
    }

    #[test]
    fn test_unknown_converter_is_rejected() {
        let content = VALID.replace(r#"converter = "phpbb""#, r#"converter = "vbulletin""#);
        assert!(matches!(
            Settings::from_str(&content),
            Err(ImportError::ConfigError(_))
        ));
    }

    #[test]
    fn test_discourse_converter_needs_postgres() {
        let content = VALID.replace(r#"converter = "phpbb""#, r#"converter = "discourse""#);
        assert!(Settings::from_str(&content).is_err());
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let content = VALID.replace(
            r#"converter = "phpbb""#,
            "converter = \"phpbb\"\nbatch_size = 0",
        );
        assert!(Settings::from_str(&content).is_err());
    }
}
