use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub type TaskId = String;

/// Marcador de idioma origen "detectar automáticamente".
pub const AUTO_LANG: &str = "auto";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Cada elemento se sustituye por su traducción.
    #[default]
    Replace,
    /// Cada elemento se conserva y va seguido de un hermano con la traducción.
    Parallel,
}

/// Formatos de documento soportados.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Txt,
    Md,
    Docx,
    Xlsx,
    Pptx,
}

impl DocumentKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" => Some(DocumentKind::Txt),
            "md" | "markdown" => Some(DocumentKind::Md),
            "docx" => Some(DocumentKind::Docx),
            "xlsx" => Some(DocumentKind::Xlsx),
            "pptx" => Some(DocumentKind::Pptx),
            _ => None,
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        path.as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn extension(self) -> &'static str {
        match self {
            DocumentKind::Txt => "txt",
            DocumentKind::Md => "md",
            DocumentKind::Docx => "docx",
            DocumentKind::Xlsx => "xlsx",
            DocumentKind::Pptx => "pptx",
        }
    }
}

/// Par de terminología origen → destino.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryTerm {
    pub source: String,
    pub target: String,
}

/// Perfil de dominio + glosario + prompt opcional.
/// El motor lo trata como un paquete opaco que pasa al cliente de traducción.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationContext {
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub glossary: Vec<GlossaryTerm>,
}

impl Default for TranslationContext {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            prompt: None,
            glossary: Vec::new(),
        }
    }
}

fn default_domain() -> String {
    "general".to_string()
}

fn default_source_lang() -> String {
    AUTO_LANG.to_string()
}

fn default_concurrency() -> u32 {
    5
}

/// Configuración de una tarea de traducción.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub target_lang: String,
    #[serde(default = "default_source_lang")]
    pub source_lang: String,
    #[serde(default)]
    pub display_mode: DisplayMode,
    /// Número de workers; el scheduler lo acota a [min, max].
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
    #[serde(default)]
    pub context: TranslationContext,
}

impl TaskConfig {
    pub fn new(target_lang: impl Into<String>) -> Self {
        Self {
            target_lang: target_lang.into(),
            source_lang: default_source_lang(),
            display_mode: DisplayMode::Replace,
            concurrency: default_concurrency(),
            context: TranslationContext::default(),
        }
    }

    /// Aplica los cambios de un reintento sobre la configuración original.
    pub fn with_overrides(&self, o: &RetryTaskRequest) -> Self {
        let mut out = self.clone();
        if let Some(ref t) = o.target_lang {
            out.target_lang = t.clone();
        }
        if let Some(ref s) = o.source_lang {
            out.source_lang = s.clone();
        }
        if let Some(m) = o.display_mode {
            out.display_mode = m;
        }
        if let Some(c) = o.concurrency {
            out.concurrency = c;
        }
        if let Some(ref d) = o.domain {
            out.context.domain = d.clone();
        }
        if let Some(ref p) = o.prompt {
            out.context.prompt = Some(p.clone());
        }
        if let Some(ref g) = o.glossary {
            out.context.glossary = g.clone();
        }
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    /// Ruta del archivo subido (propiedad de la capa externa).
    pub source_ref: String,
    #[serde(flatten)]
    pub config: TaskConfig,
}

/// Cambios para un reintento; lo que no se indica se hereda de la tarea original.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryTaskRequest {
    pub target_lang: Option<String>,
    pub source_lang: Option<String>,
    pub display_mode: Option<DisplayMode>,
    pub concurrency: Option<u32>,
    pub domain: Option<String>,
    pub prompt: Option<String>,
    pub glossary: Option<Vec<GlossaryTerm>>,
}

/// Código de error guardado en una tarea fallida.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Extraction,
    TranslationPermanent,
    RetriesExhausted,
    StructuralMismatch,
    Cancelled,
    Io,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressInfo {
    pub status: TaskStatus,
    pub progress: u8,
    pub done_count: usize,
    pub total_count: usize,
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub source_ref: String,
    pub document_kind: DocumentKind,
    pub config: TaskConfig,
    /// Tarea de la que ésta es un reintento.
    pub retried_from: Option<TaskId>,

    pub status: TaskStatus,
    pub progress: u8,
    pub done_count: usize,
    pub failed_count: usize,
    pub total_count: usize,
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
    pub output_ref: Option<String>,

    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}
