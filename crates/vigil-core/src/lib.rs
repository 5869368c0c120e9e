//! vigil-core: shared types and configuration for the vigil monitor.
//!
//! Targets are parsed from a plain-text list (`NAME,TARGET` per line) and
//! from inline `[[targets]]` tables in `vigil.toml`. The raw TOML shape lives
//! in [`VigilConfig`]; [`Settings`] is the validated, fully-defaulted form
//! every other crate consumes.

pub mod config;
pub mod error;
pub mod target;
pub mod types;

pub use config::{parse_duration, Settings, VigilConfig};
pub use error::{ConfigError, EndpointError};
pub use target::parse_target_list;
pub use types::*;
