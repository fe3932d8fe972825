//! Boundary to the release-metadata collaborator (the GitHub releases API).

mod client;
pub mod models;

pub use client::{ReleaseClient, parse_owner_repo};
pub use models::{RateLimit, Release, ReleaseAsset};
