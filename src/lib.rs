pub mod cache;
pub mod config;
pub mod entry_builder;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod model;
pub mod provider;
pub mod repository;
pub mod runner;
pub mod url;
