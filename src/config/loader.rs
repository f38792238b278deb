use std::{env, fs, path::{Path, PathBuf}};

use crate::errors::ConfigError;

use super::store::Config;

/// 指向配置文件的环境变量
pub const CONFIG_PATH_ENV: &str = "SERVICEHUB_CONFIG";

/// 默认配置文件名，相对于基础路径解析
pub const CONFIG_FILE_NAME: &str = "servicehub.toml";

/// 配置加载器 - 把 TOML 文件逐层读入 [`Config`]
pub struct ConfigLoader {
    base_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// 创建加载器，相对路径按当前工作目录解析
    pub fn new() -> Self {
        Self { base_path: None }
    }

    /// 使用自定义基础路径创建加载器（用于测试）
    pub fn with_base_path(base_path: PathBuf) -> Self {
        Self {
            base_path: Some(base_path),
        }
    }

    /// 加载单个 TOML 文件
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = self.resolve(path.as_ref());
        let content = fs::read_to_string(&path)
            .map_err(|e| ConfigError::FileRead(path.to_string_lossy().to_string(), e))?;

        let config = Config::from_toml_str(&content, &path.to_string_lossy())?;
        tracing::info!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// 按顺序加载多个文件，后面的层覆盖前面的层
    ///
    /// 每个文件都必须存在，缺失的文件返回 `ConfigError::FileRead`。
    pub fn load_layers<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Config, ConfigError> {
        let config = Config::new();
        for path in paths {
            let layer = self.load(path)?;
            config.merge(layer.snapshot().all().clone());
        }
        Ok(config)
    }

    /// 优先读取 `SERVICEHUB_CONFIG`，其次是基础路径下的 `servicehub.toml`，
    /// 两者都不存在时返回空配置
    pub fn load_default(&self) -> Result<Config, ConfigError> {
        if let Ok(path) = env::var(CONFIG_PATH_ENV) {
            return self.load(path);
        }

        let fallback = self.resolve(Path::new(CONFIG_FILE_NAME));
        if fallback.exists() {
            return self.load(fallback);
        }

        tracing::info!("No configuration file found, starting with an empty configuration");
        Ok(Config::new())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_path {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
