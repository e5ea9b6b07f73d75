use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use recall_core::{
    finalize_session_order, get_or_create_session, session, CoreError, Rating, SessionOutcome,
    SubmitOutcome,
};

use crate::api::dto::*;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn recall_core::Repository>,
}

/// Caller identity comes from the X-User-Id header; authentication itself is
/// the deployment's concern, the ownership checks in core still run.
fn caller_id(headers: &HeaderMap) -> Result<uuid::Uuid, Response> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| uuid::Uuid::parse_str(s).ok())
        .ok_or_else(|| {
            error_response(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "missing or invalid X-User-Id header".to_string(),
            )
        })
}

pub async fn create_session(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SessionIn>,
) -> Response {
    let user_id = match caller_id(&headers) {
        Ok(id) => id,
        Err(r) => return r,
    };
    let outcome =
        get_or_create_session(&*st.repo, user_id, body.subject.as_deref(), chrono::Utc::now())
            .await;
    match outcome {
        Ok(SessionOutcome::Ready(s)) => Json(SessionOut::from_session(&s)).into_response(),
        Ok(SessionOutcome::LimitReached { tier, used, limit }) => Json(LimitOut {
            success: false,
            limit_reached: true,
            tier,
            used_today: used,
            limit,
        })
        .into_response(),
        Ok(SessionOutcome::NoCards) => Json(MessageOut {
            success: false,
            message: "no cards",
        })
        .into_response(),
        Err(e) => core_error(e),
    }
}

pub async fn finalize_order(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<uuid::Uuid>,
    Json(body): Json<OrderIn>,
) -> Response {
    let user_id = match caller_id(&headers) {
        Ok(id) => id,
        Err(r) => return r,
    };
    match finalize_session_order(&*st.repo, user_id, session_id, &body.cards).await {
        Ok(s) => Json(SessionOut::from_session(&s)).into_response(),
        Err(e) => core_error(e),
    }
}

pub async fn submit_answer(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<uuid::Uuid>,
    Json(body): Json<AnswerIn>,
) -> Response {
    let user_id = match caller_id(&headers) {
        Ok(id) => id,
        Err(r) => return r,
    };
    let Some(rating) = Rating::from_score(body.rating) else {
        return core_error(CoreError::Invalid("rating must be 0..=3"));
    };
    let outcome = session::submit_answer(
        &*st.repo,
        user_id,
        session_id,
        body.card_id,
        rating,
        body.response_time_ms,
        chrono::Utc::now(),
    )
    .await;
    match outcome {
        Ok(SubmitOutcome::Recorded {
            review_id,
            new_state,
            progress,
        }) => Json(AnswerOut {
            success: true,
            review_id,
            new_state: format!("{:?}", new_state.state).to_lowercase(),
            new_due_at: new_state.due_at,
            session_progress: SessionProgressOut {
                submitted_count: progress.submitted_count,
                max_cards: progress.max_cards,
                completed: progress.completed,
            },
        })
        .into_response(),
        Ok(SubmitOutcome::AlreadyRecorded) => error_response(
            StatusCode::CONFLICT,
            "review_already_exists",
            "a review for this card was already recorded in this session".to_string(),
        ),
        Ok(SubmitOutcome::DailyLimitReached { tier, used, limit }) => Json(LimitOut {
            success: false,
            limit_reached: true,
            tier,
            used_today: used,
            limit,
        })
        .into_response(),
        Err(e) => core_error(e),
    }
}

#[derive(Deserialize)]
pub struct CardsQuery {
    /// Comma-separated card ids.
    pub ids: String,
}

pub async fn fetch_cards(
    State(st): State<Arc<AppState>>,
    Query(q): Query<CardsQuery>,
) -> Response {
    let mut ids = Vec::new();
    for part in q.ids.split(',').filter(|s| !s.is_empty()) {
        match uuid::Uuid::parse_str(part.trim()) {
            Ok(id) => ids.push(id),
            Err(_) => return core_error(CoreError::Invalid("card id")),
        }
    }
    match st.repo.get_cards(&ids).await {
        Ok(cards) => Json(
            cards
                .into_iter()
                .map(|c| CardOut {
                    id: c.id,
                    front: c.front,
                    back: c.back,
                    tags: c.tags,
                    subject: c.subject,
                })
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => core_error(e),
    }
}

// ===== Error mapping =====
fn core_error(e: CoreError) -> Response {
    let (status, code) = match &e {
        CoreError::NotFound("session") => (StatusCode::NOT_FOUND, "session_not_found"),
        CoreError::NotFound("card not in session") => {
            (StatusCode::NOT_FOUND, "card_not_in_session")
        }
        CoreError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        CoreError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
        CoreError::Invalid(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
        CoreError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        CoreError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };
    error_response(status, code, e.to_string())
}

fn error_response(status: StatusCode, code: &'static str, message: String) -> Response {
    (
        status,
        Json(ErrorOut {
            success: false,
            error: code,
            message,
        }),
    )
        .into_response()
}
