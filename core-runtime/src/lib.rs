//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the cache coordination core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the coordination crates depend
//! on. It establishes the logging conventions, the configuration builder with
//! fail-fast capability checks, and the event broadcasting used to surface
//! worker lifecycle and preload progress to the host.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
