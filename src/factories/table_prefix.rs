use serde::Serialize;
use std::sync::Arc;

use crate::config::ConfigView;
use crate::infrastructure::{ConfigSlot, ConfigurableFactory, Factory, FactoryError, Instance};

/// [`super::register_builtin`] 注册时使用的工厂名称
pub const TABLE_PREFIX_FACTORY: &str = "table_prefix";

/// 表名前缀规则：实体位于 `prefix_namespaces` 之一时给表名加上 `prefix`，
/// 未列出任何命名空间时对所有表生效
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TablePrefix {
    prefix: String,
    prefix_namespaces: Vec<String>,
}

impl TablePrefix {
    pub fn new(prefix: impl Into<String>, prefix_namespaces: Vec<String>) -> Self {
        Self {
            prefix: prefix.into(),
            prefix_namespaces,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn prefix_namespaces(&self) -> &[String] {
        &self.prefix_namespaces
    }

    pub fn applies_to(&self, entity: &str) -> bool {
        self.prefix_namespaces.is_empty()
            || self
                .prefix_namespaces
                .iter()
                .any(|namespace| entity.starts_with(namespace.as_str()))
    }

    /// `entity` 对应的 `table` 最终表名
    pub fn table_name(&self, entity: &str, table: &str) -> String {
        if self.applies_to(entity) && !table.starts_with(&self.prefix) {
            format!("{}{}", self.prefix, table)
        } else {
            table.to_string()
        }
    }
}

/// 可配置工厂 - 根据保留的配置子树构建 [`TablePrefix`]
/// （读取 `prefix` 与 `prefix_namespaces`）
#[derive(Default)]
pub struct TablePrefixFactory {
    config: ConfigSlot,
}

impl TablePrefixFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Factory for TablePrefixFactory {
    fn invoke(&self) -> Result<Instance, FactoryError> {
        let config = self.config.require("TablePrefixFactory")?;
        let prefix = config.get_str("prefix").unwrap_or_default();
        let prefix_namespaces = config
            .get_as::<Vec<String>>("prefix_namespaces")?
            .unwrap_or_default();

        Ok(Arc::new(TablePrefix::new(prefix, prefix_namespaces)))
    }

    fn as_configurable(&self) -> Option<&dyn ConfigurableFactory> {
        Some(self)
    }

    fn type_name(&self) -> &'static str {
        "TablePrefixFactory"
    }
}

impl ConfigurableFactory for TablePrefixFactory {
    fn configure(&self, config: ConfigView) {
        self.config.set(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DimensionPath};
    use serde_json::json;

    fn configured(subtree: serde_json::Value) -> TablePrefixFactory {
        let config = Config::from_value(json!({ "db": { "prefix": subtree } })).unwrap();
        let factory = TablePrefixFactory::new();
        factory.configure(
            config
                .from_dimension(&DimensionPath::new(["db", "prefix"]))
                .unwrap(),
        );
        factory
    }

    #[test]
    fn test_requires_configuration() {
        let err = TablePrefixFactory::new().invoke().unwrap_err();
        assert_eq!(
            err.to_string(),
            "TablePrefixFactory can't work without configuration"
        );
    }

    #[test]
    fn test_builds_from_subtree() {
        let factory = configured(json!({ "prefix": "a_", "prefix_namespaces": ["App\\Entity"] }));
        let prefix = factory.invoke().unwrap().downcast::<TablePrefix>().unwrap();

        assert_eq!(prefix.prefix(), "a_");
        assert_eq!(prefix.table_name("App\\Entity\\User", "users"), "a_users");
        assert_eq!(prefix.table_name("Vendor\\Log", "logs"), "logs");
        assert_eq!(prefix.table_name("App\\Entity\\User", "a_users"), "a_users");
    }

    #[test]
    fn test_defaults_when_keys_missing() {
        let factory = configured(json!({}));
        let prefix = factory.invoke().unwrap().downcast::<TablePrefix>().unwrap();

        assert_eq!(prefix.prefix(), "");
        assert!(prefix.prefix_namespaces().is_empty());
        assert!(prefix.applies_to("anything"));
    }

    #[test]
    fn test_rejects_malformed_namespaces() {
        let factory = configured(json!({ "prefix": "a_", "prefix_namespaces": "App" }));
        assert!(factory.invoke().is_err());
    }
}
