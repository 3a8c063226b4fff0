use serde::{Deserialize, Serialize};

use crate::segment::{SegmentKind, SegmentStatus};
use crate::task::TaskId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    /// Ruta del documento traducido
    pub output_ref: String,
}

/// Fila de la vista previa origen/traducción.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewPair {
    pub index: usize,
    pub source: String,
    pub translated: String,
}

/// Fila de la vista previa de una tarea, con el estado de su segmento.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewEntry {
    pub index: usize,
    pub location: String,
    pub kind: SegmentKind,
    pub status: SegmentStatus,
    pub attempts: u32,
    pub source: String,
    pub translated: String,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}
