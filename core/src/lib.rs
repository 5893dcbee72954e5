pub mod db;
pub mod export;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod reconcile;
pub mod service;
pub mod store;
pub mod sync;
