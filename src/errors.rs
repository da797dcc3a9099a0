use thiserror::Error;

/// 容器操作的统一结果类型
pub type Result<T, E = ContainerError> = std::result::Result<T, E>;

/// 依赖注入容器错误
#[derive(Debug, Error)]
pub enum ContainerError {
    /// 注册输入不合法（空标识符、空标签、非 provider 等）
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// 既没有定义，也不是可实例化的类型
    #[error("No definition or instantiable type found for \"{id}\"")]
    NotFound { id: String },

    /// 构建过程中再次进入了正在构建的标识符
    #[error("Circular reference to \"{id}\" detected while building: {}", .chain.join(" -> "))]
    CircularReference { id: String, chain: Vec<String> },

    /// 类型已知但无法构造
    #[error("Can not instantiate \"{id}\": {reason}")]
    NotInstantiable { id: String, reason: String },

    /// 实例类型与调用方期望不符
    #[error("Type cast failed for \"{id}\": expected {expected}, found {actual}")]
    TypeCastFailed {
        id: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// 工厂返回了非容器错误
    #[error("Failed to create service '{service}': {source}")]
    CreationFailed {
        service: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ContainerError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ContainerError::InvalidConfiguration(message.into())
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        ContainerError::NotFound { id: id.into() }
    }

    pub fn creation_failed(service: impl Into<String>, source: anyhow::Error) -> Self {
        ContainerError::CreationFailed {
            service: service.into(),
            source: source.into(),
        }
    }

    /// 是否是指定标识符的 NotFound
    pub fn is_not_found_for(&self, id: &str) -> bool {
        matches!(self, ContainerError::NotFound { id: missing } if missing == id)
    }

    /// 循环引用链（其他错误返回 None）
    pub fn circular_chain(&self) -> Option<&[String]> {
        match self {
            ContainerError::CircularReference { chain, .. } => Some(chain),
            _ => None,
        }
    }
}

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read file '{0}': {1}")]
    FileRead(String, #[source] std::io::Error),
    #[error("Failed to parse TOML from '{0}': {1}")]
    TomlParse(String, #[source] toml::de::Error),
    #[error("Invalid value '{value}' for environment variable {key}")]
    InvalidEnvValue { key: String, value: String },
    #[error("Required configuration field '{0}' is missing or invalid")]
    FieldMissing(String),
}
