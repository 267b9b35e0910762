//! Configuration for the speech bridge.
//!
//! Provides `BridgeConfig` (top-level settings), sub-configs for each
//! subsystem, `AppPaths` for cross-platform data directories, and TOML
//! persistence via `BridgeConfig::load` / `BridgeConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{AudioConfig, BridgeConfig, ModelConfig, TransportConfig};
