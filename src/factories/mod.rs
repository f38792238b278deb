//! 内置工厂

pub mod table_prefix;

pub use table_prefix::{TablePrefix, TablePrefixFactory, TABLE_PREFIX_FACTORY};

use crate::infrastructure::FactoryContainer;

/// 以默认名称注册所有内置工厂
pub fn register_builtin(container: &FactoryContainer) {
    container.register(TABLE_PREFIX_FACTORY, TablePrefixFactory::new());
}
