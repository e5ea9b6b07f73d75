use axum::{
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::api::routes::{create_session, fetch_cards, finalize_order, submit_answer, AppState};
use recall_core::Repository;

pub async fn run(repo: Arc<dyn Repository>, addr: SocketAddr) -> anyhow::Result<()> {
    let state = Arc::new(AppState { repo });

    let app = Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/:id/order", post(finalize_order))
        .route("/sessions/:id/answers", post(submit_answer))
        .route("/cards", get(fetch_cards))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
