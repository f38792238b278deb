pub mod cli;
pub mod config;
pub mod errors;
pub mod factories;
pub mod infrastructure;
pub mod logging;

// Re-export commonly used items for convenience
pub use config::{Config, ConfigLoader, ConfigView, DimensionPath};
pub use errors::{ConfigError, ManagerError, ManagerResult};
pub use infrastructure::{
    ConfigurableFactory, ContainerAware, Factory, FactoryContainer, FactoryError, Instance,
    ServiceManager,
};
