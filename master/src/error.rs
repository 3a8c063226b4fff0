use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::TaskId;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// El documento no se pudo leer o no tiene un formato soportado.
    #[error("error de extracción: {0}")]
    Extraction(String),

    #[error("petición inválida: {0}")]
    InvalidRequest(String),

    #[error("tarea {0} no encontrada")]
    NotFound(TaskId),

    #[error("{0}")]
    InvalidState(String),

    #[error("la tarea {0} no ha terminado con éxito")]
    NotReady(TaskId),

    #[error("error de E/S: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::InvalidState(_) | EngineError::NotReady(_) => StatusCode::CONFLICT,
            EngineError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
