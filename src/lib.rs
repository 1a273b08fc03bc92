//! SHARPLINE: sportsbook odds cache and signal engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod odds;
pub mod sports;
pub mod clock;
pub mod data;
pub mod cache;
pub mod strategy;
pub mod engine;
