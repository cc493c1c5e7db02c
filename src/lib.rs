//! Skycast: current weather for a free-text address.
//!
//! The heavy lifting lives in `skycast-weather`; this crate normalizes the
//! inbound address, runs geocode then forecast, and shapes the JSON reply.

pub mod app;
pub mod envelope;
pub mod query;

pub use app::App;
pub use envelope::Response;
pub use query::ForecastQuery;
