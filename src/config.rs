use std::path::Path;

use serde::Deserialize;

use crate::models::AssessmentKind;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub assessments: AssessmentConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Which assessments can satisfy the second gate in this deployment.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AssessmentConfig {
    pub active: Vec<AssessmentKind>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_entries: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://reclassification.db".into(),
        }
    }
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            active: AssessmentKind::OTHERS.to_vec(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_entries: 50 }
    }
}

impl Config {
    /// Load config from a TOML file. Falls back to defaults if the file is
    /// missing or unreadable.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("Config file {} not found, using defaults", path.display());
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => {
                    tracing::info!("Config loaded from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Parses a config file. A history cap below 1 would drop the entry
    /// just saved, so it is raised to 1.
    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(contents)?;
        if config.history.max_entries == 0 {
            tracing::warn!("[history].max_entries must be at least 1; using 1");
            config.history.max_entries = 1;
        }
        Ok(config)
    }

    /// Active second-gate assessments, without ELPAC and without repeats.
    pub fn active_others(&self) -> Vec<AssessmentKind> {
        let mut active = Vec::with_capacity(self.assessments.active.len());
        for &kind in &self.assessments.active {
            if kind == AssessmentKind::Elpac {
                tracing::warn!("elpac is the mandatory assessment; ignoring it in [assessments].active");
                continue;
            }
            if !active.contains(&kind) {
                active.push(kind);
            }
        }
        active
    }
}
