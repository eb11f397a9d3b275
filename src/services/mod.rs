/// Per-recipient state views and their delivery.
pub mod broadcast_service;
/// The single-owner game coordinator task.
pub mod coordinator;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Role dealing and private briefings.
pub mod role_service;
/// Round lifecycle and host commands.
pub mod round_service;
/// Vote and location-guess scoring.
pub mod scoring_service;
/// Seats, tokens and connectivity.
pub mod session_service;
/// Server-Sent Events streaming for the shared display.
pub mod sse_service;
/// Ballot collection and conviction.
pub mod voting_service;
/// WebSocket connection lifecycle.
pub mod websocket_service;
