//! 工厂容器

pub mod registry;

pub use registry::{ContainerError, ContainerHandle, FactoryContainer};
