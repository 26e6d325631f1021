pub mod config;
pub mod dedup;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod metadata;
pub mod normalize;
pub mod orchestrator;
pub mod output;
pub mod providers;
pub mod resolve;
pub mod store;
pub mod validate;
