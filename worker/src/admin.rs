//! Thin HTTP admin surface: liveness, a demo enqueue route, and static
//! file serving out of the local storage directory. Not part of the core
//! contract; kept minimal on purpose.

use std::future::ready;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::Router;
use health::HealthRegistry;
use tower_http::services::ServeDir;
use worker_common::model::{EntityType, Job};
use worker_common::queue::Queue;

#[derive(Clone)]
pub struct AdminState {
    pub queue: Arc<dyn Queue>,
}

pub fn router(liveness: HealthRegistry, state: AdminState, storage_dir: &str) -> Router {
    let router = Router::new()
        .route("/ping", get(|| ready("pong")))
        .route("/_liveness", get(move || ready(liveness.get_status())))
        .route("/add-queue", post(add_queue))
        .with_state(state)
        .nest_service("/storage", ServeDir::new(storage_dir));

    worker_common::metrics::setup_metrics_routes(router)
}

async fn add_queue(State(state): State<AdminState>) -> &'static str {
    let job = Job {
        entity_id: "demo-entity".to_owned(),
        entity_type: EntityType::Scene,
        content_server_urls: vec!["https://peer.decentraland.org/content".to_owned()],
        profile_data: None,
    };

    match state.queue.publish(&job, false).await {
        Ok(()) => "enqueued",
        Err(_) => "failed to enqueue",
    }
}
