use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::try_exists;

use crate::autosave::DEBOUNCE_WINDOW;
use crate::command_processor::DEFAULT_TAB_WIDTH;
use crate::draft::Visibility;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub editor: EditorConfig,
    pub memo: MemoConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorConfig {
    pub tab_width: usize,
    pub autosave: bool,
    pub autosave_window_secs: u64,
    pub continue_editing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoConfig {
    pub default_visibility: Visibility,
    pub disable_public_memos: bool,
    pub role: UserRole,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Host,
    Admin,
    User,
}

impl UserRole {
    pub fn is_admin_or_host(&self) -> bool {
        matches!(self, UserRole::Host | UserRole::Admin)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            editor: EditorConfig {
                tab_width: DEFAULT_TAB_WIDTH,
                autosave: true,
                autosave_window_secs: DEBOUNCE_WINDOW.as_secs(),
                continue_editing: false,
            },
            memo: MemoConfig {
                default_visibility: Visibility::Private,
                disable_public_memos: false,
                role: UserRole::User,
            },
            storage: StorageConfig::default(),
        }
    }
}

impl EditorConfig {
    pub fn autosave_window(&self) -> Duration {
        Duration::from_secs(self.autosave_window_secs)
    }
}

impl Config {
    pub async fn load() -> Result<Self> {
        if let Some(config_path) = Self::config_path() {
            if try_exists(&config_path).await? {
                match tokio::fs::read_to_string(&config_path).await {
                    Ok(content) => {
                        if content.trim().is_empty() {
                            log::warn!("Config file is empty, creating new one");
                            let default_config = Self::default();
                            let _ = default_config.save().await;
                            return Ok(default_config);
                        }

                        match serde_json::from_str::<Self>(&content) {
                            Ok(mut config) => {
                                config.validate()?;
                                log::info!(
                                    "Successfully loaded config from: {}",
                                    config_path.display()
                                );
                                return Ok(config);
                            }
                            Err(json_err) => {
                                log::error!("Failed to parse config file: {}", json_err);

                                // Backup broken config
                                let backup_path = config_path.with_extension("bak");
                                if let Err(e) = tokio::fs::copy(&config_path, &backup_path).await {
                                    log::warn!("Failed to backup broken config: {}", e);
                                } else {
                                    log::info!(
                                        "Backed up broken config to: {}",
                                        backup_path.display()
                                    );
                                }

                                let default_config = Self::default();
                                let _ = default_config.save().await;
                                return Ok(default_config);
                            }
                        }
                    }
                    Err(io_err) => {
                        log::error!("Failed to read config file: {}", io_err);
                    }
                }
            } else {
                log::info!("Config file does not exist, creating default");
            }
        }

        let default_config = Self::default();
        let _ = default_config.save().await;
        Ok(default_config)
    }

    pub async fn save(&self) -> Result<()> {
        if let Some(config_path) = Self::config_path() {
            let mut config_to_save = self.clone();
            config_to_save.validate()?;

            if let Some(parent) = config_path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    anyhow::anyhow!(
                        "Failed to create config directory {}: {}",
                        parent.display(),
                        e
                    )
                })?;
            }

            let content = serde_json::to_string_pretty(&config_to_save)
                .map_err(|e| anyhow::anyhow!("Failed to serialize config: {}", e))?;
            tokio::fs::write(&config_path, content).await.map_err(|e| {
                anyhow::anyhow!(
                    "Failed to write config file {}: {}",
                    config_path.display(),
                    e
                )
            })?;
            log::info!("Successfully saved config to: {}", config_path.display());
        }
        Ok(())
    }

    /// Validate configuration values and fix invalid ones
    pub fn validate(&mut self) -> Result<()> {
        let mut has_issues = false;

        if self.editor.tab_width == 0 || self.editor.tab_width > 16 {
            log::warn!("Invalid tab width: {}, using default", self.editor.tab_width);
            self.editor.tab_width = DEFAULT_TAB_WIDTH;
            has_issues = true;
        }

        if self.editor.autosave_window_secs == 0 || self.editor.autosave_window_secs > 300 {
            log::warn!(
                "Invalid autosave window: {}s, using default",
                self.editor.autosave_window_secs
            );
            self.editor.autosave_window_secs = DEBOUNCE_WINDOW.as_secs();
            has_issues = true;
        }

        if self.memo.disable_public_memos && self.memo.default_visibility == Visibility::Public {
            log::warn!("Public memos are disabled, default visibility set to PRIVATE");
            self.memo.default_visibility = Visibility::Private;
            has_issues = true;
        }

        if has_issues {
            log::info!("Configuration validation completed with corrections");
        }

        Ok(())
    }

    /// Data directory override from the config, else the store default.
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.storage.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => crate::file_store::FileStore::default_data_dir(),
        }
    }

    fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("MEMO_EDITOR_CONFIG_PATH") {
            return Some(PathBuf::from(path));
        }

        if let Ok(dir) = std::env::var("MEMO_EDITOR_CONFIG_DIR") {
            return Some(PathBuf::from(dir).join("config.json"));
        }

        ProjectDirs::from("com", "memo-editor", "memo-editor")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }
}
