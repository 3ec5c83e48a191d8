pub mod aggregate;
pub mod config;
pub mod error;
pub mod fetch;
pub mod geocoding;
pub mod reports;
pub mod store;
pub mod types;
