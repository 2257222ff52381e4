//! Core types and protocol constants for the UWB guidance driver

pub mod types;
pub mod constants;

pub use types::*;
pub use constants::*;
