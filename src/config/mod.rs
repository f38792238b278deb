pub mod loader;
pub mod merge;
pub mod store;

// Re-export commonly used types
pub use loader::{ConfigLoader, CONFIG_FILE_NAME, CONFIG_PATH_ENV};
pub use merge::{canonical_json, merge_values};
pub use store::{Config, ConfigView, DimensionPath};
