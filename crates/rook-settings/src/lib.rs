//! # rook-settings
//!
//! Configuration management with layered sources for the rook server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RookSettings::default()`]
//! 2. **User file**: `~/.rook/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `ROOK_*` overrides (highest priority)
//!
//! The binary applies its command-line flags on top of the loaded value.
//!
//! # Usage
//!
//! ```no_run
//! let settings = rook_settings::load_settings().unwrap_or_default();
//! println!("listening on {}:{}", settings.server.host, settings.server.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path, resolve_path,
    rook_home, settings_path,
};
pub use types::*;
