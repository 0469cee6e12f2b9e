//! Terminal platform layer: configuration, logging, persisted client state
//! and the message loop that drives the core.
mod app;
mod commands;
mod config;
mod effects;
mod logging;
mod persistence;
mod render;

pub use app::run_app;
