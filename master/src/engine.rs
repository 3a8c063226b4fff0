//! Fachada del motor: las operaciones de entrada (crear, consultar,
//! reintentar, cancelar, borrar) sobre el registro de tareas.

use std::path::Path;
use std::sync::Arc;

use common::{
    adapter_for, assembler, CreateTaskRequest, DocumentKind, EngineStats, PreviewEntry, PreviewPair, ProgressInfo,
    RetryTaskRequest, TaskConfig, TaskId, TaskInfo, TaskResult, TaskStatus,
};
use tracing::info;
use uuid::Uuid;
use worker::SharedTranslator;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::scheduler;
use crate::state::{lock, AppState};
use crate::storage;
use crate::task::{TaskMachine, TaskRuntime};

#[derive(Clone)]
pub struct Engine {
    state: AppState,
}

impl Engine {
    pub fn new(config: EngineConfig, translator: SharedTranslator) -> Self {
        Self {
            state: AppState::new(config, translator),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.state.config
    }

    fn runtime(&self, id: &str) -> EngineResult<Arc<TaskRuntime>> {
        self.state.task(id).ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    /// Extrae los segmentos del documento, registra la tarea y la arranca.
    /// Un documento ilegible o no soportado falla aquí y no crea tarea.
    pub async fn create_task(&self, req: CreateTaskRequest) -> EngineResult<TaskInfo> {
        self.submit(req.source_ref, req.config, None).await
    }

    async fn submit(&self, source_ref: String, config: TaskConfig, retried_from: Option<TaskId>) -> EngineResult<TaskInfo> {
        if config.target_lang.trim().is_empty() {
            return Err(EngineError::InvalidRequest("target_lang no puede estar vacío".into()));
        }

        let kind = DocumentKind::from_path(&source_ref)
            .ok_or_else(|| EngineError::Extraction(format!("formato no soportado: {source_ref}")))?;

        let bytes = tokio::fs::read(Path::new(&source_ref))
            .await
            .map_err(|e| EngineError::Extraction(format!("no se pudo leer {source_ref}: {e}")))?;

        let (segments, bytes) = tokio::task::spawn_blocking(move || {
            let segments = adapter_for(kind).extract(&bytes);
            (segments, bytes)
        })
        .await
        .map_err(|e| EngineError::Extraction(format!("la extracción terminó mal: {e}")))?;
        let segments = segments.map_err(|e| EngineError::Extraction(e.to_string()))?;

        let id: TaskId = Uuid::new_v4().to_string();
        let machine = TaskMachine::new(id.clone(), source_ref, kind, config, retried_from, segments.len());
        let rt = Arc::new(TaskRuntime::new(machine, segments, bytes));
        let info = rt.info();

        lock(&self.state.tasks).insert(id.clone(), rt.clone());
        info!(
            "tarea {} creada: {} ({:?}) → {}, {} segmentos",
            id, info.source_ref, kind, info.config.target_lang, info.total_count
        );

        scheduler::spawn_task(&self.state, rt);
        Ok(info)
    }

    pub fn get_task(&self, id: &str) -> EngineResult<TaskInfo> {
        Ok(self.runtime(id)?.info())
    }

    pub fn get_progress(&self, id: &str) -> EngineResult<ProgressInfo> {
        Ok(self.runtime(id)?.progress())
    }

    /// Sólo válido para tareas completadas.
    pub fn get_result(&self, id: &str) -> EngineResult<TaskResult> {
        let info = self.get_task(id)?;
        match (info.status, info.output_ref) {
            (TaskStatus::Completed, Some(output_ref)) => Ok(TaskResult {
                task_id: info.id,
                output_ref,
            }),
            _ => Err(EngineError::NotReady(info.id)),
        }
    }

    /// Crea una tarea nueva sobre el mismo documento. La original no cambia.
    pub async fn retry_task(&self, id: &str, overrides: RetryTaskRequest) -> EngineResult<TaskInfo> {
        let original = self.get_task(id)?;
        if !original.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "la tarea {} sigue en {:?}; sólo se reintentan tareas terminadas",
                id, original.status
            )));
        }

        let config = original.config.with_overrides(&overrides);
        let info = self.submit(original.source_ref, config, Some(original.id)).await?;
        info!("tarea {} reintentada como {}", id, info.id);
        Ok(info)
    }

    pub fn cancel_task(&self, id: &str) -> EngineResult<ProgressInfo> {
        let rt = self.runtime(id)?;
        if !rt.cancel() {
            return Err(EngineError::InvalidState(format!(
                "la tarea {} ya terminó ({:?})",
                id,
                rt.status()
            )));
        }
        Ok(rt.progress())
    }

    /// Pares origen/traducción en orden de índice. Los huecos de una tarea a
    /// medias salen vacíos.
    pub fn preview(&self, id: &str) -> EngineResult<Vec<PreviewPair>> {
        let mut segments = self.runtime(id)?.segments_snapshot();
        segments.sort_by_key(|s| s.index());

        let sources: Vec<&str> = segments.iter().map(|s| s.source_text()).collect();
        let last = segments.iter().rposition(|s| s.translated_text().is_some());
        let translated: Vec<&str> = match last {
            Some(last) => segments[..=last]
                .iter()
                .map(|s| s.translated_text().unwrap_or_default())
                .collect(),
            None => Vec::new(),
        };

        Ok(assembler::pair_for_preview(&sources, &translated))
    }

    /// Detalle por segmento: ubicación, estado, intentos fallidos.
    pub fn segments(&self, id: &str) -> EngineResult<Vec<PreviewEntry>> {
        Ok(assembler::preview_entries(&self.runtime(id)?.segments_snapshot()))
    }

    /// Todas las tareas, la más reciente primero.
    pub fn list_tasks(&self) -> Vec<TaskInfo> {
        let mut tasks: Vec<TaskInfo> = self.state.all_tasks().iter().map(|rt| rt.info()).collect();
        tasks.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    pub fn stats(&self) -> EngineStats {
        let mut stats = EngineStats::default();
        for rt in self.state.all_tasks() {
            stats.total += 1;
            match rt.status() {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Processing => stats.processing += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Borra una tarea terminada y su documento traducido. El original no se toca.
    pub async fn delete_task(&self, id: &str) -> EngineResult<()> {
        let info = self.get_task(id)?;
        if !info.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "la tarea {} sigue en {:?}; cancélala antes de borrarla",
                id, info.status
            )));
        }

        lock(&self.state.tasks).remove(id);
        if let Some(output) = info.output_ref {
            storage::remove_output(Path::new(&output)).await?;
        }
        info!("tarea {} borrada", id);
        Ok(())
    }

    /// Espera a que la tarea termine y devuelve su estado final.
    pub async fn wait_for(&self, id: &str) -> EngineResult<ProgressInfo> {
        let rt = self.runtime(id)?;
        Ok(rt.wait_terminal().await)
    }
}
