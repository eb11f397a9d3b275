/// Health check payloads.
pub mod health;
/// Phase names as clients see them.
pub mod phase;
/// Display stream events.
pub mod sse;
/// Checked names and settings.
pub mod validation;
/// Per-recipient state views.
pub mod view;
/// WebSocket messages.
pub mod ws;
