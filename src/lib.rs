pub mod artifact;
pub mod bridge;
pub mod controller;
pub mod extract;
pub mod ipc;
pub mod logging;
pub mod permission;
pub mod report;
pub mod root;
pub mod settings;
pub mod store;
pub mod xlsx;
