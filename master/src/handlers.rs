use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use common::{
    CreateTaskRequest, EngineStats, PreviewEntry, PreviewPair, ProgressInfo, RetryTaskRequest, TaskInfo, TaskResult,
};
use tower_http::trace::TraceLayer;

use crate::engine::Engine;
use crate::error::EngineResult;

pub fn build_router(engine: Engine) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/tasks", post(create_task).get(list_tasks))
        .route("/api/v1/tasks/:id", get(get_task).delete(delete_task))
        .route("/api/v1/tasks/:id/progress", get(get_progress))
        .route("/api/v1/tasks/:id/result", get(get_result))
        .route("/api/v1/tasks/:id/preview", get(preview))
        .route("/api/v1/tasks/:id/segments", get(segments))
        .route("/api/v1/tasks/:id/retry", post(retry_task))
        .route("/api/v1/tasks/:id/cancel", post(cancel_task))
        .route("/api/v1/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

async fn create_task(
    State(engine): State<Engine>,
    Json(req): Json<CreateTaskRequest>,
) -> EngineResult<(StatusCode, Json<TaskInfo>)> {
    let info = engine.create_task(req).await?;
    Ok((StatusCode::CREATED, Json(info)))
}

async fn list_tasks(State(engine): State<Engine>) -> Json<Vec<TaskInfo>> {
    Json(engine.list_tasks())
}

async fn get_task(State(engine): State<Engine>, Path(id): Path<String>) -> EngineResult<Json<TaskInfo>> {
    engine.get_task(&id).map(Json)
}

async fn delete_task(State(engine): State<Engine>, Path(id): Path<String>) -> EngineResult<StatusCode> {
    engine.delete_task(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_progress(State(engine): State<Engine>, Path(id): Path<String>) -> EngineResult<Json<ProgressInfo>> {
    engine.get_progress(&id).map(Json)
}

async fn get_result(State(engine): State<Engine>, Path(id): Path<String>) -> EngineResult<Json<TaskResult>> {
    engine.get_result(&id).map(Json)
}

async fn preview(State(engine): State<Engine>, Path(id): Path<String>) -> EngineResult<Json<Vec<PreviewPair>>> {
    engine.preview(&id).map(Json)
}

async fn segments(State(engine): State<Engine>, Path(id): Path<String>) -> EngineResult<Json<Vec<PreviewEntry>>> {
    engine.segments(&id).map(Json)
}

// El cuerpo es opcional: sin cambios se repite la configuración original
async fn retry_task(
    State(engine): State<Engine>,
    Path(id): Path<String>,
    body: Option<Json<RetryTaskRequest>>,
) -> EngineResult<(StatusCode, Json<TaskInfo>)> {
    let overrides = body.map(|Json(o)| o).unwrap_or_default();
    let info = engine.retry_task(&id, overrides).await?;
    Ok((StatusCode::CREATED, Json(info)))
}

async fn cancel_task(State(engine): State<Engine>, Path(id): Path<String>) -> EngineResult<Json<ProgressInfo>> {
    engine.cancel_task(&id).map(Json)
}

async fn stats(State(engine): State<Engine>) -> Json<EngineStats> {
    Json(engine.stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;
    use worker::IdentityTranslator;

    fn app() -> Router {
        build_router(Engine::new(EngineConfig::default(), Arc::new(IdentityTranslator)))
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(b) => {
                req = req.header("content-type", "application/json");
                Body::from(b.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn health_responde_ok() {
        let resp = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn tarea_desconocida_da_404_con_json() {
        let (status, body) = send(app(), "GET", "/api/v1/tasks/nope/progress", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("nope"));

        let (status, _) = send(app(), "POST", "/api/v1/tasks/nope/cancel", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn formato_no_soportado_da_422() {
        let (status, body) = send(
            app(),
            "POST",
            "/api/v1/tasks",
            Some(r#"{"source_ref": "/tmp/x.pdf", "target_lang": "es"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("no soportado"));
    }

    #[tokio::test]
    async fn stats_vacias() {
        let (status, body) = send(app(), "GET", "/api/v1/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 0);
    }
}
