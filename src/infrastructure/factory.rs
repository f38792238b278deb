//! 工厂能力定义
//!
//! 每个工厂都必须能被无参调用并产出一个实例；
//! 此外可以按需声明两种可选能力：
//! - 可配置：构建前接收并保留一棵配置子树
//! - 容器感知：构建前接收底层容器的引用
//!
//! 服务管理器在构建时通过 `as_configurable` / `as_container_aware` 探测能力，
//! 而不是依赖带空钩子的公共基类。

use parking_lot::RwLock;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use super::container::ContainerHandle;
use crate::config::ConfigView;

/// 工厂产出的类型擦除实例
pub type Instance = Arc<dyn Any + Send + Sync>;

/// 工厂调用失败时的原始错误
pub type FactoryError = Box<dyn std::error::Error + Send + Sync>;

/// 服务工厂 - 无参调用产出实例
pub trait Factory: Send + Sync {
    /// 构建一个新实例
    fn invoke(&self) -> Result<Instance, FactoryError>;

    /// 可配置能力
    fn as_configurable(&self) -> Option<&dyn ConfigurableFactory> {
        None
    }

    /// 容器感知能力
    fn as_container_aware(&self) -> Option<&dyn ContainerAware> {
        None
    }

    /// 类型名称（用于日志和错误信息）
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// 可配置工厂 - 保留配置子树供下一次调用使用
pub trait ConfigurableFactory: Send + Sync {
    fn configure(&self, config: ConfigView);
}

/// 容器感知工厂
pub trait ContainerAware: Send + Sync {
    fn set_container(&self, container: ContainerHandle);
}

/// 函数式工厂 - 包装不需要配置的闭包
pub struct FnFactory<F, T> {
    factory_fn: F,
    type_name: &'static str,
    _phantom: PhantomData<fn() -> T>,
}

impl<F, T> FnFactory<F, T>
where
    F: Fn() -> Result<T, FactoryError> + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    pub fn new(factory_fn: F) -> Self {
        Self {
            factory_fn,
            type_name: std::any::type_name::<T>(),
            _phantom: PhantomData,
        }
    }
}

impl<F, T> Factory for FnFactory<F, T>
where
    F: Fn() -> Result<T, FactoryError> + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    fn invoke(&self) -> Result<Instance, FactoryError> {
        let service = (self.factory_fn)()?;
        Ok(Arc::new(service))
    }

    fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// 配置槽 - 可配置工厂保存最近一次收到的配置
#[derive(Default)]
pub struct ConfigSlot {
    config: RwLock<Option<ConfigView>>,
}

impl ConfigSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, config: ConfigView) {
        *self.config.write() = Some(config);
    }

    pub fn get(&self) -> Option<ConfigView> {
        self.config.read().clone()
    }

    /// 取出配置，未配置时返回错误
    pub fn require(&self, owner: &str) -> Result<ConfigView, FactoryError> {
        self.get()
            .ok_or_else(|| format!("{owner} can't work without configuration").into())
    }
}

/// 容器槽 - 容器感知工厂保存注入的容器句柄
#[derive(Default)]
pub struct ContainerSlot {
    container: RwLock<Option<ContainerHandle>>,
}

impl ContainerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, container: ContainerHandle) {
        *self.container.write() = Some(container);
    }

    pub fn get(&self) -> Option<ContainerHandle> {
        self.container.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq)]
    struct Mailer {
        from: String,
    }

    struct GreetingFactory {
        config: ConfigSlot,
    }

    impl Factory for GreetingFactory {
        fn invoke(&self) -> Result<Instance, FactoryError> {
            let config = self.config.require("GreetingFactory")?;
            Ok(Arc::new(config.get_or("greeting", json!("hi")).to_string()))
        }

        fn as_configurable(&self) -> Option<&dyn ConfigurableFactory> {
            Some(self)
        }
    }

    impl ConfigurableFactory for GreetingFactory {
        fn configure(&self, config: ConfigView) {
            self.config.set(config);
        }
    }

    #[test]
    fn test_fn_factory_invoke() {
        let factory = FnFactory::new(|| {
            Ok(Mailer {
                from: "noreply@example.com".to_string(),
            })
        });

        let instance = factory.invoke().unwrap();
        let mailer = instance.downcast::<Mailer>().unwrap();
        assert_eq!(mailer.from, "noreply@example.com");
        assert!(factory.type_name().ends_with("Mailer"));
        assert!(factory.as_configurable().is_none());
        assert!(factory.as_container_aware().is_none());
    }

    #[test]
    fn test_fn_factory_error_passes_through() {
        let factory = FnFactory::new(|| -> Result<Mailer, FactoryError> { Err("smtp down".into()) });
        let err = factory.invoke().unwrap_err();
        assert_eq!(err.to_string(), "smtp down");
    }

    #[test]
    fn test_config_slot_requires_configuration() {
        let factory = GreetingFactory {
            config: ConfigSlot::new(),
        };
        let err = factory.invoke().unwrap_err();
        assert_eq!(err.to_string(), "GreetingFactory can't work without configuration");

        factory
            .as_configurable()
            .unwrap()
            .configure(ConfigView::empty());
        assert!(factory.invoke().is_ok());
    }
}
