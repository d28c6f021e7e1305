//! Application framework for the Aurora engine.
//!
//! Owns the window, the GPU context, and the frame loop; applications
//! implement [`AuroraApp`] and call [`run_app`].

pub mod app;
pub mod config;
pub mod context;
pub mod runner;

pub use app::AuroraApp;
pub use config::AppConfig;
pub use context::AppContext;
pub use runner::run_app;
