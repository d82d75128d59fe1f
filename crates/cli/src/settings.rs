use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use peng_stream::{DEFAULT_BASE_MODEL, DEFAULT_USER_NAME, ModelInfo, fallback_models};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000/chat";
pub const SETTINGS_DIRECTORY_NAME: &str = "peng-chat";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "PENG_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSettings {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_user_name")]
    pub user_name: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_base_model")]
    pub base_model: String,
    #[serde(default)]
    pub tools_name: Vec<String>,
    #[serde(default)]
    pub long_term_memory: Vec<String>,
    // Empty means the built-in fallback list.
    #[serde(default)]
    pub models: Vec<ModelInfo>,
    // JSON array of previously selected memories to preload.
    #[serde(default)]
    pub memory_file: Option<PathBuf>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            user_name: default_user_name(),
            token: String::new(),
            base_model: default_base_model(),
            tools_name: Vec::new(),
            long_term_memory: Vec::new(),
            models: Vec::new(),
            memory_file: None,
        }
    }
}

impl ChatSettings {
    pub fn token(&self) -> Option<String> {
        let token = self.token.trim();
        (!token.is_empty()).then(|| token.to_string())
    }

    pub fn catalog(&self) -> Vec<ModelInfo> {
        if self.models.is_empty() {
            fallback_models()
        } else {
            self.models.clone()
        }
    }

    pub fn normalized(mut self) -> Self {
        self.endpoint = if self.endpoint.trim().is_empty() {
            default_endpoint()
        } else {
            self.endpoint.trim().to_string()
        };
        self.user_name = if self.user_name.trim().is_empty() {
            default_user_name()
        } else {
            self.user_name.trim().to_string()
        };
        self.base_model = if self.base_model.trim().is_empty() {
            self.catalog()
                .first()
                .map(|model| model.model_name.clone())
                .unwrap_or_else(default_base_model)
        } else {
            self.base_model.trim().to_string()
        };
        self.token = self.token.trim().to_string();

        let mut tools = Vec::with_capacity(self.tools_name.len());
        for tool in self.tools_name {
            let tool = tool.trim().to_string();
            if !tool.is_empty() && !tools.contains(&tool) {
                tools.push(tool);
            }
        }
        self.tools_name = tools;

        self
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<ChatSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".peng-chat"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from(&config_path, Env::prefixed(ENV_PREFIX));
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<ChatSettings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: ChatSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    fn load_from(path: &Path, env: Env) -> ChatSettings {
        let mut figment = Figment::from(Serialized::defaults(ChatSettings::default()));
        if path.exists() {
            figment = figment.merge(Json::file(path));
        } else {
            tracing::info!("settings file not found at {:?}, using defaults", path);
        }

        match figment.merge(env).extract::<ChatSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                ChatSettings::default()
            }
        }
    }

    fn persist(&self, settings: &ChatSettings) -> Result<(), SettingsError> {
        let json = serde_json::to_vec_pretty(settings).context(EncodeSettingsSnafu {
            stage: "encode-chat-settings",
        })?;
        replace_file(&self.config_path, &json)?;
        tracing::info!(path = ?self.config_path, "chat settings saved");
        Ok(())
    }
}

/// Writes `contents` beside `path` and renames it over, so readers never see a torn file.
fn replace_file(path: &Path, contents: &[u8]) -> Result<(), SettingsError> {
    if let Some(directory) = path.parent() {
        std::fs::create_dir_all(directory).context(CreateSettingsDirSnafu {
            stage: "create-chat-settings-dir",
            directory,
        })?;
    }

    let staged = path.with_extension("json.tmp");
    std::fs::write(&staged, contents).context(StageSettingsSnafu {
        stage: "stage-chat-settings",
        path: &staged,
    })?;
    std::fs::rename(&staged, path).context(ReplaceSettingsSnafu {
        stage: "replace-chat-settings",
        path,
    })
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display(
        "cannot create chat settings directory {directory:?} on `{stage}`: {source}"
    ))]
    CreateSettingsDir {
        stage: &'static str,
        directory: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("cannot encode chat settings on `{stage}`: {source}"))]
    EncodeSettings {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("cannot stage chat settings at {path:?} on `{stage}`: {source}"))]
    StageSettings {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("cannot move staged chat settings to {path:?} on `{stage}`: {source}"))]
    ReplaceSettings {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_user_name() -> String {
    DEFAULT_USER_NAME.to_string()
}

fn default_base_model() -> String {
    DEFAULT_BASE_MODEL.to_string()
}
