//! HTTP control surface. Every route is a thin translation into a
//! [`ControlHandle`] command.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chromatic_core::{ControlHandle, StatusSnapshot};
use serde_json::{json, Value};

type ApiError = (StatusCode, Json<Value>);

pub fn router(handle: ControlHandle) -> Router {
    Router::new()
        .route("/action/:key", get(action).post(action))
        .route("/status", get(status))
        .with_state(handle)
}

/// GET|POST /action/{start,pause,stop}
pub async fn action(
    State(handle): State<ControlHandle>,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    let sent = match key.as_str() {
        "start" => handle.start(),
        "pause" => handle.pause(),
        "stop" => handle.stop(),
        _ => {
            tracing::warn!(%key, "unknown action");
            return Err((
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("unknown action `{key}`") })),
            ));
        }
    };

    tracing::info!(%key, "action requested");
    sent.map(|_| StatusCode::ACCEPTED).map_err(unavailable)
}

/// GET /status
pub async fn status(State(handle): State<ControlHandle>) -> Result<Json<StatusSnapshot>, ApiError> {
    handle.status().await.map(Json).map_err(unavailable)
}

fn unavailable(err: chromatic_core::ChromaticError) -> ApiError {
    tracing::warn!(%err, "control loop unavailable");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": err.to_string() })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chromatic_core::{channel, Command, RunState};

    #[tokio::test]
    async fn actions_become_commands() {
        let (handle, mut commands) = channel();

        for key in ["start", "pause", "stop"] {
            let code = action(State(handle.clone()), Path(key.to_string()))
                .await
                .unwrap();
            assert_eq!(code, StatusCode::ACCEPTED);
        }

        assert!(matches!(commands.recv().await, Some(Command::Start)));
        assert!(matches!(commands.recv().await, Some(Command::Pause)));
        assert!(matches!(commands.recv().await, Some(Command::Stop)));
    }

    #[tokio::test]
    async fn unknown_actions_are_not_found() {
        let (handle, mut commands) = channel();

        let (code, _) = action(State(handle), Path("reboot".to_string()))
            .await
            .unwrap_err();
        assert_eq!(code, StatusCode::NOT_FOUND);
        assert!(commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn status_is_answered_by_the_loop() {
        let (handle, mut commands) = channel();
        let responder = tokio::spawn(async move {
            if let Some(Command::Status(reply)) = commands.recv().await {
                let _ = reply.send(StatusSnapshot {
                    state: RunState::Running,
                    fps: 24,
                });
            }
        });

        let Json(snapshot) = status(State(handle)).await.unwrap();
        assert_eq!(snapshot.fps, 24);
        assert_eq!(snapshot.state, RunState::Running);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn closed_loop_reports_unavailable() {
        let (handle, commands) = channel();
        drop(commands);

        let (code, _) = status(State(handle.clone())).await.unwrap_err();
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);

        let (code, _) = action(State(handle), Path("start".to_string()))
            .await
            .unwrap_err();
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
    }
}
