//! Library crate for spyster-back, exposing modules for binaries and integration tests.

/// Runtime configuration loaded from the environment.
pub mod config;
/// Content packs and their storage.
pub mod dao;
/// Wire and view types.
pub mod dto;
/// Error types and their wire codes.
pub mod error;
/// HTTP and WebSocket routes.
pub mod routes;
/// Game logic and connection handling.
pub mod services;
/// Shared application state.
pub mod state;
