//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Math types and operations
//! - Arena collections and stable identifiers
//! - Colors and blending
//! - Logging utilities

pub mod math;
pub mod collections;
pub mod color;
pub mod logging;
