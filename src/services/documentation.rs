use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Buzz Arcade.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::public_stream,
        crate::routes::websocket::ws_handler,
        crate::routes::session::session_snapshot,
        crate::routes::session::join,
        crate::routes::session::start,
        crate::routes::session::select,
        crate::routes::session::commit,
        crate::routes::session::reveal,
        crate::routes::session::show_scoreboard,
        crate::routes::session::advance,
        crate::routes::session::restart,
        crate::routes::session::abort,
        crate::routes::session::press,
        crate::routes::session::high_score,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::SessionSnapshot,
            crate::dto::session::PlayerRequest,
            crate::dto::session::SelectRequest,
            crate::dto::session::PressRequest,
            crate::dto::session::HighScoreResponse,
            crate::dto::sse::Handshake,
            crate::dto::ws::DeviceButton,
            crate::dto::ws::IndicatorCommand,
            crate::dto::ws::DeviceAck,
            crate::services::input_service::InputOutcome,
            crate::state::events::RoundSummary,
            crate::state::events::GameOverSummary,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "session", description = "Host and presentation operations on the session"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "devices", description = "WebSocket bridge for controller hardware"),
    )
)]
pub struct ApiDoc;
