pub mod cancellation;
pub mod commands;
pub mod config;
pub mod download;
pub mod error;
pub mod github;
pub mod index;
pub mod logging;
pub mod manifest;
pub mod storage;
pub mod version;
