pub mod admin_ops;
pub mod app_setting;
pub mod audit;
pub mod auth;
pub mod blob_store;
pub mod configuration;
pub mod delivery;
pub mod domain;
pub mod error;
pub mod repos;
pub mod routes;
pub mod startup;
pub mod store;
pub mod submitter;
pub mod telemetry;
