use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the Spyster backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::display_stream,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::sse::Handshake,
            crate::dto::ws::AdminCommand,
            crate::dto::ws::ConfigField,
            crate::dto::ws::WelcomeMessage,
            crate::dto::ws::SessionGrant,
            crate::dto::ws::ErrorMessage,
            crate::dto::view::StateView,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Shared display stream"),
        (name = "players", description = "WebSocket channel for participants"),
    )
)]
pub struct ApiDoc;
