mod glyphs;
mod routes;

pub mod app;
pub mod backend;
pub mod config;
pub mod detection;
pub mod detector;
pub mod overlay;
pub mod query_cache;
pub mod scan;
pub mod server;
pub mod shell;
pub mod store;
pub mod telemetry;

pub use app::start_app;
