use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::{env, fs, path::Path};

use crate::errors::ConfigError;

/// 默认的标签别名前缀
pub const DEFAULT_TAG_PREFIX: &str = "tag@";

// Environment overrides
const ENV_TAG_PREFIX: &str = "DIRIGENT_TAG_PREFIX";
const ENV_VALIDATE: &str = "DIRIGENT_VALIDATE";
const ENV_TRACE_RESOLUTIONS: &str = "DIRIGENT_TRACE_RESOLUTIONS";

/// 容器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// 标签别名前缀，`<prefix><tag>` 表示该标签下的全部服务
    pub tag_prefix: String,
    /// `set` 时是否做定义形状校验
    pub validate: bool,
    /// 每次解析都输出 trace 日志
    pub trace_resolutions: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            tag_prefix: DEFAULT_TAG_PREFIX.to_string(),
            validate: true,
            trace_resolutions: false,
        }
    }
}

impl ContainerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse(content, "<inline>")
    }

    /// 从 TOML 文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::FileRead(display.clone(), e))?;
        Self::parse(&content, &display)
    }

    fn parse(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::TomlParse(origin.to_string(), e))?;
        config.check()?;
        Ok(config)
    }

    /// 文件配置与环境变量合并，环境变量优先
    pub fn from_env_or_file(
        file_config: Option<Self>,
        env_map: &HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let mut config = file_config.unwrap_or_default();

        if let Some(prefix) = env_map.get(ENV_TAG_PREFIX) {
            config.tag_prefix = prefix.clone();
        }
        if let Some(value) = env_map.get(ENV_VALIDATE) {
            config.validate = parse_bool(ENV_VALIDATE, value)?;
        }
        if let Some(value) = env_map.get(ENV_TRACE_RESOLUTIONS) {
            config.trace_resolutions = parse_bool(ENV_TRACE_RESOLUTIONS, value)?;
        }

        config.check()?;
        Ok(config)
    }

    /// 读取进程环境变量
    pub fn from_env(file_config: Option<Self>) -> Result<Self, ConfigError> {
        let env_map: HashMap<String, String> = [ENV_TAG_PREFIX, ENV_VALIDATE, ENV_TRACE_RESOLUTIONS]
            .iter()
            .filter_map(|key| env::var(key).ok().map(|value| (key.to_string(), value)))
            .collect();
        Self::from_env_or_file(file_config, &env_map)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.tag_prefix.trim().is_empty() {
            return Err(ConfigError::FieldMissing("tag_prefix".to_string()));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
