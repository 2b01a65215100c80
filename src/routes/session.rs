use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use axum_valid::Valid;
use tokio::time::timeout;

use crate::{
    dto::session::{HighScoreResponse, PlayerRequest, PressRequest, SelectRequest, SessionSnapshot},
    error::{AppError, ServiceError},
    services::{
        input_service::{ButtonPress, InputOutcome},
        session_service::SessionOp,
    },
    state::{SharedState, player::PlayerKey},
};

const HIGH_SCORE_TIMEOUT: Duration = Duration::from_secs(2);

/// Routes used by the host and presentation layer to drive the session.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/session", get(session_snapshot))
        .route("/session/join", post(join))
        .route("/session/start", post(start))
        .route("/session/select", post(select))
        .route("/session/commit", post(commit))
        .route("/session/reveal", post(reveal))
        .route("/session/scoreboard", post(show_scoreboard))
        .route("/session/advance", post(advance))
        .route("/session/restart", post(restart))
        .route("/session/abort", post(abort))
        .route("/input", post(press))
        .route("/high-score", get(high_score))
}

async fn run(state: &SharedState, op: SessionOp) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(state.session().apply(op).await?))
}

/// Current state of the session.
#[utoipa::path(
    get,
    path = "/session",
    tag = "session",
    responses((status = 200, description = "Session snapshot", body = SessionSnapshot))
)]
pub async fn session_snapshot(
    State(state): State<SharedState>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(state.session().snapshot().await?))
}

/// Add a player to the lobby.
#[utoipa::path(
    post,
    path = "/session/join",
    tag = "session",
    request_body = PlayerRequest,
    responses(
        (status = 200, description = "Player joined", body = SessionSnapshot),
        (status = 409, description = "Operation refused in the current state")
    )
)]
pub async fn join(
    State(state): State<SharedState>,
    Json(payload): Json<PlayerRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    run(&state, SessionOp::Join(payload.player)).await
}

/// Start the game with the joined roster.
#[utoipa::path(
    post,
    path = "/session/start",
    tag = "session",
    responses(
        (status = 200, description = "First question shown", body = SessionSnapshot),
        (status = 409, description = "Operation refused in the current state")
    )
)]
pub async fn start(State(state): State<SharedState>) -> Result<Json<SessionSnapshot>, AppError> {
    run(&state, SessionOp::Start).await
}

/// Highlight an answer for a player.
#[utoipa::path(
    post,
    path = "/session/select",
    tag = "session",
    request_body = SelectRequest,
    responses(
        (status = 200, description = "Selection recorded", body = SessionSnapshot),
        (status = 409, description = "Operation refused in the current state")
    )
)]
pub async fn select(
    State(state): State<SharedState>,
    Json(payload): Json<SelectRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    run(&state, SessionOp::Select(payload.player, payload.color)).await
}

/// Commit the highlighted answer of a player.
#[utoipa::path(
    post,
    path = "/session/commit",
    tag = "session",
    request_body = PlayerRequest,
    responses(
        (status = 200, description = "Answer committed", body = SessionSnapshot),
        (status = 409, description = "Operation refused in the current state")
    )
)]
pub async fn commit(
    State(state): State<SharedState>,
    Json(payload): Json<PlayerRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    run(&state, SessionOp::Commit(payload.player)).await
}

/// Stop the clock and score the round.
#[utoipa::path(
    post,
    path = "/session/reveal",
    tag = "session",
    responses(
        (status = 200, description = "Round resolved", body = SessionSnapshot),
        (status = 409, description = "Operation refused in the current state")
    )
)]
pub async fn reveal(State(state): State<SharedState>) -> Result<Json<SessionSnapshot>, AppError> {
    run(&state, SessionOp::Reveal).await
}

/// Show the standings after a reveal.
#[utoipa::path(
    post,
    path = "/session/scoreboard",
    tag = "session",
    responses(
        (status = 200, description = "Scoreboard shown", body = SessionSnapshot),
        (status = 409, description = "Operation refused in the current state")
    )
)]
pub async fn show_scoreboard(
    State(state): State<SharedState>,
) -> Result<Json<SessionSnapshot>, AppError> {
    run(&state, SessionOp::ShowScoreboard).await
}

/// Show the next question or end the game.
#[utoipa::path(
    post,
    path = "/session/advance",
    tag = "session",
    responses(
        (status = 200, description = "Next question or final ranking", body = SessionSnapshot),
        (status = 409, description = "Operation refused in the current state")
    )
)]
pub async fn advance(State(state): State<SharedState>) -> Result<Json<SessionSnapshot>, AppError> {
    run(&state, SessionOp::Advance).await
}

/// Return a finished game to the lobby.
#[utoipa::path(
    post,
    path = "/session/restart",
    tag = "session",
    responses(
        (status = 200, description = "Back in the lobby", body = SessionSnapshot),
        (status = 409, description = "Operation refused in the current state")
    )
)]
pub async fn restart(State(state): State<SharedState>) -> Result<Json<SessionSnapshot>, AppError> {
    run(&state, SessionOp::Restart).await
}

/// Force the session back to an empty lobby.
#[utoipa::path(
    post,
    path = "/session/abort",
    tag = "session",
    responses((status = 200, description = "Back in the lobby", body = SessionSnapshot))
)]
pub async fn abort(State(state): State<SharedState>) -> Result<Json<SessionSnapshot>, AppError> {
    run(&state, SessionOp::Abort).await
}

/// Deliver a raw controller press as if it came from a bridge.
#[utoipa::path(
    post,
    path = "/input",
    tag = "session",
    request_body = PressRequest,
    responses(
        (status = 200, description = "Press routed", body = InputOutcome),
        (status = 400, description = "Unknown controller")
    )
)]
pub async fn press(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<PressRequest>>,
) -> Result<Json<InputOutcome>, AppError> {
    let player = PlayerKey::from_number(payload.controller).ok_or_else(|| {
        ServiceError::InvalidInput(format!("unknown controller {}", payload.controller))
    })?;
    let outcome = state
        .session()
        .press(ButtonPress {
            player,
            button: payload.button.into(),
        })
        .await?;
    Ok(Json(outcome))
}

/// Best winning score stored on disk.
#[utoipa::path(
    get,
    path = "/high-score",
    tag = "session",
    responses(
        (status = 200, description = "Stored high score", body = HighScoreResponse),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn high_score(
    State(state): State<SharedState>,
) -> Result<Json<HighScoreResponse>, AppError> {
    let score = timeout(HIGH_SCORE_TIMEOUT, state.high_scores().load())
        .await
        .map_err(|_| ServiceError::Timeout)?
        .map_err(ServiceError::from)?;
    Ok(Json(HighScoreResponse { score }))
}
