//! 层级配置存储
//!
//! 提供按 "维度路径" 取子树的能力：
//! - `Config` 是可共享、可修改的整棵配置树
//! - `ConfigView` 是某一时刻某棵子树的只读快照

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use super::merge::{canonical_json, merge_values};
use crate::errors::ConfigError;

/// 维度路径 - 定位配置子树的有序键序列
///
/// 反序列化时既接受字符串数组 `["db", "prefix"]`，也接受点分字符串 `"db.prefix"`。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawDimensionPath", into = "Vec<String>")]
pub struct DimensionPath(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDimensionPath {
    Dotted(String),
    Keys(Vec<String>),
}

impl From<RawDimensionPath> for DimensionPath {
    fn from(raw: RawDimensionPath) -> Self {
        match raw {
            RawDimensionPath::Dotted(path) => DimensionPath::parse(&path),
            RawDimensionPath::Keys(keys) => DimensionPath(keys),
        }
    }
}

impl From<DimensionPath> for Vec<String> {
    fn from(path: DimensionPath) -> Self {
        path.0
    }
}

impl DimensionPath {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DimensionPath(keys.into_iter().map(Into::into).collect())
    }

    /// 解析点分路径，忽略空段
    pub fn parse(dotted: &str) -> Self {
        DimensionPath(
            dotted
                .split('.')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn keys(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DimensionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// 可共享的配置树
///
/// 克隆开销很小，所有克隆共享同一棵树；修改对所有持有者立即可见。
#[derive(Clone)]
pub struct Config {
    root: Arc<RwLock<Value>>,
}

impl Config {
    /// 创建空配置
    pub fn new() -> Self {
        Self {
            root: Arc::new(RwLock::new(Value::Object(Map::new()))),
        }
    }

    /// 从 JSON 值创建，根节点必须是表
    pub fn from_value(root: Value) -> Result<Self, ConfigError> {
        if !root.is_object() {
            return Err(ConfigError::NotATable {
                path: String::new(),
            });
        }
        Ok(Self {
            root: Arc::new(RwLock::new(root)),
        })
    }

    /// 解析 TOML 文本，`origin` 仅用于错误信息
    pub fn from_toml_str(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let root: Value = toml::from_str(content)
            .map_err(|e| ConfigError::TomlParse(origin.to_string(), e))?;
        Self::from_value(root)
    }

    /// 读取顶层键
    pub fn get(&self, key: &str) -> Option<Value> {
        self.root.read().get(key).cloned()
    }

    /// 读取顶层键，不存在时返回默认值
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// 读取顶层键并反序列化为具体类型
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.get(key) {
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                ConfigError::InvalidValue {
                    key: key.to_string(),
                    reason: e.to_string(),
                }
            }),
            None => Ok(None),
        }
    }

    /// 取维度路径处的子树快照
    pub fn from_dimension(&self, path: &DimensionPath) -> Result<ConfigView, ConfigError> {
        let root = self.root.read();
        ConfigView::locate(&root, &[], path.keys())
    }

    /// 整棵树的快照
    pub fn snapshot(&self) -> ConfigView {
        ConfigView {
            path: Vec::new(),
            value: self.root.read().clone(),
        }
    }

    /// 在路径处写入值，自动创建中间表
    pub fn set(&self, path: &DimensionPath, value: Value) -> Result<(), ConfigError> {
        let mut root = self.root.write();
        let Some((last, parents)) = path.keys().split_last() else {
            if !value.is_object() {
                return Err(ConfigError::NotATable {
                    path: String::new(),
                });
            }
            *root = value;
            return Ok(());
        };

        let mut node = &mut *root;
        for (depth, key) in parents.iter().enumerate() {
            let map = node.as_object_mut().ok_or_else(|| ConfigError::NotATable {
                path: parents[..depth].join("."),
            })?;
            node = map
                .entry(key.clone())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        let map = node.as_object_mut().ok_or_else(|| ConfigError::NotATable {
            path: parents.join("."),
        })?;
        map.insert(last.clone(), value);
        Ok(())
    }

    /// 把另一棵树合并进来，后者优先
    pub fn merge(&self, overlay: Value) {
        merge_values(&mut self.root.write(), overlay);
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("root", &*self.root.read())
            .finish()
    }
}

/// 配置子树的只读快照
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigView {
    path: Vec<String>,
    value: Value,
}

impl ConfigView {
    pub fn empty() -> Self {
        Self {
            path: Vec::new(),
            value: Value::Object(Map::new()),
        }
    }

    /// 从 `node` 开始沿 `keys` 下行：缺失的键得到空表，穿过非表节点则报错
    fn locate(node: &Value, prefix: &[String], keys: &[String]) -> Result<Self, ConfigError> {
        let mut path = prefix.to_vec();
        let mut current = node;
        for key in keys {
            let map = current.as_object().ok_or_else(|| ConfigError::NotATable {
                path: path.join("."),
            })?;
            path.push(key.clone());
            match map.get(key) {
                Some(next) => current = next,
                None => {
                    return Ok(Self {
                        path,
                        value: Value::Object(Map::new()),
                    })
                }
            }
        }
        Ok(Self {
            path,
            value: current.clone(),
        })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.value.get(key)
    }

    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).cloned().unwrap_or(default)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.get(key) {
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
                ConfigError::InvalidValue {
                    key: key.to_string(),
                    reason: e.to_string(),
                }
            }),
            None => Ok(None),
        }
    }

    /// 整棵子树
    pub fn all(&self) -> &Value {
        &self.value
    }

    /// 反序列化整棵子树
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        Ok(serde_json::from_value(self.value.clone())?)
    }

    pub fn path(&self) -> DimensionPath {
        DimensionPath(self.path.clone())
    }

    pub fn is_empty(&self) -> bool {
        match &self.value {
            Value::Object(map) => map.is_empty(),
            Value::Null => true,
            _ => false,
        }
    }

    /// 相对当前子树再取下一层
    pub fn from_dimension(&self, path: &DimensionPath) -> Result<ConfigView, ConfigError> {
        Self::locate(&self.value, &self.path, path.keys())
    }

    /// 内容哈希：键排序后的 JSON 的 md5
    pub fn hash(&self) -> String {
        format!("{:x}", md5::compute(canonical_json(&self.value).as_bytes()))
    }
}

impl Default for ConfigView {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Config {
        Config::from_value(json!({
            "factories": { "db.prefix": "table_prefix" },
            "db": { "prefix": { "prefix": "a_", "prefix_namespaces": ["App"] } },
            "debug": true,
        }))
        .unwrap()
    }

    #[test]
    fn test_dimension_path_from_toml_forms() {
        #[derive(Deserialize)]
        struct Holder {
            dotted: DimensionPath,
            keys: DimensionPath,
        }
        let holder: Holder =
            toml::from_str("dotted = \"db.prefix\"\nkeys = [\"db\", \"prefix\"]\n").unwrap();
        assert_eq!(holder.dotted, holder.keys);
        assert_eq!(holder.keys.to_string(), "db.prefix");
    }

    #[test]
    fn test_top_level_get() {
        let config = sample();
        assert_eq!(config.get("debug"), Some(json!(true)));
        assert_eq!(config.get_or("missing", json!([])), json!([]));
        assert_eq!(config.get_as::<bool>("debug").unwrap(), Some(true));
        assert!(config.get_as::<u32>("debug").is_err());
    }

    #[test]
    fn test_from_dimension() {
        let config = sample();
        let view = config
            .from_dimension(&DimensionPath::new(["db", "prefix"]))
            .unwrap();
        assert_eq!(view.get_str("prefix"), Some("a_"));
        assert_eq!(view.path().to_string(), "db.prefix");
        assert_eq!(view.get_or("missing", json!("x")), json!("x"));
    }

    #[test]
    fn test_missing_dimension_is_empty() {
        let config = sample();
        let view = config
            .from_dimension(&DimensionPath::new(["cache", "redis"]))
            .unwrap();
        assert!(view.is_empty());
        assert_eq!(view.hash(), ConfigView::empty().hash());
    }

    #[test]
    fn test_dimension_through_scalar_fails() {
        let config = sample();
        let err = config
            .from_dimension(&DimensionPath::new(["debug", "level"]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotATable { path } if path == "debug"));
    }

    #[test]
    fn test_set_creates_tables_and_changes_hash() {
        let config = sample();
        let path = DimensionPath::new(["db", "prefix"]);
        let before = config.from_dimension(&path).unwrap().hash();

        config
            .set(&DimensionPath::new(["db", "prefix", "prefix"]), json!("b_"))
            .unwrap();
        let after = config.from_dimension(&path).unwrap().hash();
        assert_ne!(before, after);

        config
            .set(&DimensionPath::new(["tenant", "a", "name"]), json!("acme"))
            .unwrap();
        assert_eq!(
            config
                .from_dimension(&DimensionPath::parse("tenant.a"))
                .unwrap()
                .get_str("name"),
            Some("acme")
        );
    }

    #[test]
    fn test_snapshot_is_detached() {
        let config = sample();
        let view = config.snapshot();
        config.merge(json!({ "debug": false }));
        assert_eq!(view.get("debug"), Some(&json!(true)));
        assert_eq!(config.get("debug"), Some(json!(false)));
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        let err = Config::from_toml_str("factories = [", "inline").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(origin, _) if origin == "inline"));
    }
}
