use thiserror::Error;

use crate::infrastructure::factory::FactoryError;

/// 配置读取与解析错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read file '{0}': {1}")]
    FileRead(String, #[source] std::io::Error),
    #[error("Failed to parse TOML from file '{0}': {1}")]
    TomlParse(String, #[source] toml::de::Error),
    #[error("Configuration node '{path}' is not a table")]
    NotATable { path: String },
    #[error("Configuration key '{key}' has an unexpected shape: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("Failed to convert configuration: {0}")]
    Conversion(#[from] serde_json::Error),
}

/// 服务管理器错误
#[derive(Debug, Error)]
pub enum ManagerError {
    /// 别名没有工厂映射，或其工厂已无法解析
    #[error("Alias ({alias}) is not registered and therefore cannot be resolved")]
    NotFound { alias: String },
    /// 工厂自身构建失败，保留原始错误
    #[error("{0}")]
    Construction(FactoryError),
    /// 获取工厂配置子树失败
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// 实例类型与请求的类型不符，`actual` 为构建它的工厂类型名
    #[error("Service '{alias}' built by {actual} cannot be used as {expected}")]
    TypeMismatch {
        alias: String,
        expected: &'static str,
        actual: &'static str,
    },
}

impl ManagerError {
    pub fn not_found(alias: impl Into<String>) -> Self {
        ManagerError::NotFound {
            alias: alias.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ManagerError::NotFound { .. })
    }

    /// 工厂或配置失败，调用方可以通过 `get_fresh` 重试
    pub fn is_construction_failure(&self) -> bool {
        matches!(self, ManagerError::Construction(_) | ManagerError::Config(_))
    }
}

pub type ManagerResult<T> = Result<T, ManagerError>;
