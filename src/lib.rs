//! Genre harvesting library - shared modules for all binaries.

pub mod accumulation;
pub mod aggregator;
pub mod config;
pub mod feature_source;
pub mod harvest;
pub mod models;
pub mod playlist_source;
pub mod progress;
pub mod rate_limit;
pub mod reccobeats;
pub mod safety;
pub mod spotify;
pub mod store;
pub mod upstream;

#[cfg(test)]
mod test_support;
