//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (`core-cache`, `core-runtime`, `bridge-desktop`). Host
//! applications can depend on `media-cache-workspace` and enable the
//! documented features without needing to wire each crate individually.

pub use core_cache as cache;
pub use core_runtime as runtime;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop as desktop;
