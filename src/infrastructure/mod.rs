//! 基础设施层
//!
//! 提供服务管理器及其协作者：
//! - 底层工厂容器
//! - 工厂能力定义
//! - 按别名和配置缓存实例的服务管理器

pub mod container;
pub mod factory;
pub mod service_manager;

// 重新导出API
pub use container::{ContainerError, ContainerHandle, FactoryContainer};
pub use factory::{
    ConfigSlot, ConfigurableFactory, ContainerAware, ContainerSlot, Factory, FactoryError,
    FnFactory, Instance,
};
pub use service_manager::{ManagerStats, ServiceManager, ServiceManagerBuilder};
