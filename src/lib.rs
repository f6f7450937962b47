// Library for tests to access modules

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod identity;
pub mod models;
pub mod routes;
pub mod sources;
pub mod topology_repo;
pub mod version;
