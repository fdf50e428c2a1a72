pub mod config;
pub mod core;
pub mod permission;
pub mod report;
