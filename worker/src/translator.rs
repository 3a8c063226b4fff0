use std::sync::Arc;

use async_trait::async_trait;
use common::{SegmentKind, TranslationContext};
use thiserror::Error;

/// Lo que el motor pide traducir: un segmento y el contexto de su tarea.
#[derive(Debug, Clone)]
pub struct TranslationRequest {
    pub text: String,
    pub kind: SegmentKind,
    pub source_lang: String,
    pub target_lang: String,
    pub context: Arc<TranslationContext>,
}

/// Fallo clasificado de una llamada de traducción.
///
/// `Transient` se reintenta (red, timeout, límite de peticiones, 5xx);
/// `Permanent` no (petición rechazada, contenido filtrado, credenciales).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateFailure {
    #[error("fallo transitorio: {0}")]
    Transient(String),
    #[error("fallo permanente: {0}")]
    Permanent(String),
}

impl TranslateFailure {
    pub fn is_transient(&self) -> bool {
        matches!(self, TranslateFailure::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            TranslateFailure::Transient(m) | TranslateFailure::Permanent(m) => m,
        }
    }
}

/// Cliente de traducción sin estado: misma entrada, misma clase de respuesta.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, req: &TranslationRequest) -> Result<String, TranslateFailure>;

    fn name(&self) -> &str;
}

pub type SharedTranslator = Arc<dyn Translator>;
