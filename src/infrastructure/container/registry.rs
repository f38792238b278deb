//! 底层工厂容器
//!
//! 按名称保存工厂对象，只负责 "名称 → 工厂" 的解析：
//! - 使用 DashMap 提供无全局锁的并发读
//! - 注册可随时替换或撤销，`has` 总是反映当前状态

use dashmap::DashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use thiserror::Error;

use crate::infrastructure::factory::{Factory, FactoryError, FnFactory};

/// 容器错误
#[derive(Debug, Error)]
pub enum ContainerError {
    /// 工厂未注册
    #[error(
        "Factory '{name}' is not registered{}{}",
        available_hint(.available),
        suggestion_hint(.suggestion)
    )]
    FactoryNotRegistered {
        name: String,
        available: Vec<String>,
        suggestion: Option<String>,
    },
}

fn available_hint(available: &[String]) -> String {
    if available.is_empty() {
        String::new()
    } else {
        format!(". Available factories: {}", available.join(", "))
    }
}

fn suggestion_hint(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|s| format!(". Did you mean: {}?", s))
        .unwrap_or_default()
}

/// 工厂容器 - 克隆后共享同一份注册表
#[derive(Clone, Default)]
pub struct FactoryContainer {
    factories: Arc<DashMap<String, Arc<dyn Factory>>>,
}

impl FactoryContainer {
    /// 创建新的容器实例
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工厂，同名注册会被替换
    pub fn register<F: Factory + 'static>(&self, name: impl Into<String>, factory: F) {
        self.register_shared(name, Arc::new(factory));
    }

    /// 注册已共享的工厂对象
    pub fn register_shared(&self, name: impl Into<String>, factory: Arc<dyn Factory>) {
        let name = name.into();
        tracing::debug!(factory = %name, type_name = factory.type_name(), "Registering factory");
        if self.factories.insert(name.clone(), factory).is_some() {
            tracing::debug!(factory = %name, "Replaced existing factory registration");
        }
    }

    /// 注册闭包工厂 - 便捷方法
    pub fn register_fn<T, F>(&self, name: impl Into<String>, factory_fn: F)
    where
        F: Fn() -> Result<T, FactoryError> + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.register(name, FnFactory::new(factory_fn));
    }

    /// 撤销注册，返回之前是否存在
    pub fn deregister(&self, name: &str) -> bool {
        let removed = self.factories.remove(name).is_some();
        if removed {
            tracing::debug!(factory = %name, "Deregistered factory");
        }
        removed
    }

    /// 检查工厂是否可解析
    pub fn has(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// 解析工厂对象
    pub fn get(&self, name: &str) -> Result<Arc<dyn Factory>, ContainerError> {
        if let Some(factory) = self.factories.get(name) {
            return Ok(factory.value().clone());
        }

        let available = self.names();
        let needle = name.to_lowercase();
        let suggestion = available
            .iter()
            .find(|candidate| {
                let candidate = candidate.to_lowercase();
                candidate.contains(&needle) || needle.contains(&candidate)
            })
            .cloned();

        Err(ContainerError::FactoryNotRegistered {
            name: name.to_string(),
            available,
            suggestion,
        })
    }

    /// 已注册的工厂名称（排序后）
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// 弱引用句柄，注入给容器感知工厂，避免 容器 → 工厂 → 容器 的引用环
    pub fn handle(&self) -> ContainerHandle {
        ContainerHandle {
            factories: Arc::downgrade(&self.factories),
        }
    }
}

/// 容器的弱引用句柄
#[derive(Clone)]
pub struct ContainerHandle {
    factories: Weak<DashMap<String, Arc<dyn Factory>>>,
}

impl ContainerHandle {
    /// 容器仍存活时返回它
    pub fn upgrade(&self) -> Option<FactoryContainer> {
        self.factories
            .upgrade()
            .map(|factories| FactoryContainer { factories })
    }
}

impl fmt::Debug for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerHandle")
            .field("alive", &(self.factories.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Mailer;

    #[test]
    fn test_register_and_resolve() {
        let container = FactoryContainer::new();
        container.register_fn("mail_factory", || Ok(Mailer));

        assert!(container.has("mail_factory"));
        assert_eq!(container.len(), 1);
        let factory = container.get("mail_factory").unwrap();
        assert!(factory.invoke().unwrap().downcast::<Mailer>().is_ok());
    }

    #[test]
    fn test_missing_factory_suggests_close_name() {
        let container = FactoryContainer::new();
        container.register_fn("mail_factory", || Ok(Mailer));
        container.register_fn("table_prefix", || Ok(Mailer));

        let err = container.get("mail").err().unwrap();
        match &err {
            ContainerError::FactoryNotRegistered {
                name,
                available,
                suggestion,
            } => {
                assert_eq!(name, "mail");
                assert_eq!(available, &vec!["mail_factory".to_string(), "table_prefix".to_string()]);
                assert_eq!(suggestion.as_deref(), Some("mail_factory"));
            }
        }
        assert_eq!(
            err.to_string(),
            "Factory 'mail' is not registered. Available factories: mail_factory, table_prefix. Did you mean: mail_factory?"
        );
    }

    #[test]
    fn test_missing_factory_in_empty_container() {
        let err = FactoryContainer::new().get("mail").err().unwrap();
        assert_eq!(err.to_string(), "Factory 'mail' is not registered");
    }

    #[test]
    fn test_deregister() {
        let container = FactoryContainer::new();
        container.register_fn("mail_factory", || Ok(Mailer));

        assert!(container.deregister("mail_factory"));
        assert!(!container.deregister("mail_factory"));
        assert!(!container.has("mail_factory"));
        assert!(container.is_empty());
    }

    #[test]
    fn test_handle_does_not_keep_container_alive() {
        let container = FactoryContainer::new();
        let handle = container.handle();
        assert!(handle.upgrade().is_some());

        drop(container);
        assert!(handle.upgrade().is_none());
    }
}
