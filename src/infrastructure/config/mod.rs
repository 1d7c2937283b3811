//! Configuration
//!
//! Settings come from the environment first, optionally overlaid on a YAML
//! file whose path is the first CLI argument or `CONFIG_FILE`. Secrets are
//! redacted in Debug output.

pub mod settings;

pub use settings::{
    AppConfig, CacheSettings, ConfigError, DatabaseSettings, ProviderSettings, ServerSettings,
    StreamSettings,
};
