pub mod api;
pub mod config;
pub mod model;
pub mod observability;
pub mod store;
pub mod updater;
