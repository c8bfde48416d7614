//! HTTP inbound adapter exposing the map REST endpoints.

pub mod cache_control;
pub mod catalog;
pub mod error;
pub mod health;
pub mod maps;
pub mod schemas;
pub mod state;

pub use error::ApiResult;
