//! Máquina de estados de una tarea y el estado compartido entre sus workers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use common::{
    DocumentKind, ErrorCode, ProgressInfo, Segment, SegmentKind, SegmentStatus, TaskConfig, TaskId, TaskInfo,
    TaskStatus, TranslationContext,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::state::lock;

/// Estado agregado de una tarea: `pending → processing → {completed, failed}`.
///
/// Es el único que escribe `status`, `progress` y `error_message`. Los
/// estados terminales no tienen salida: cualquier transición posterior
/// devuelve `false` y no cambia nada, contadores incluidos.
#[derive(Debug, Clone)]
pub struct TaskMachine {
    info: TaskInfo,
}

impl TaskMachine {
    pub fn new(
        id: TaskId,
        source_ref: String,
        document_kind: DocumentKind,
        config: TaskConfig,
        retried_from: Option<TaskId>,
        total_count: usize,
    ) -> Self {
        Self {
            info: TaskInfo {
                id,
                source_ref,
                document_kind,
                config,
                retried_from,
                status: TaskStatus::Pending,
                progress: 0,
                done_count: 0,
                failed_count: 0,
                total_count,
                error_code: None,
                error_message: None,
                output_ref: None,
                submitted_at: Utc::now(),
                started_at: None,
                finished_at: None,
            },
        }
    }

    pub fn info(&self) -> &TaskInfo {
        &self.info
    }

    pub fn status(&self) -> TaskStatus {
        self.info.status
    }

    pub fn is_cancelled(&self) -> bool {
        self.info.error_code == Some(ErrorCode::Cancelled)
    }

    pub fn progress_info(&self) -> ProgressInfo {
        ProgressInfo {
            status: self.info.status,
            progress: self.info.progress,
            done_count: self.info.done_count,
            total_count: self.info.total_count,
            error_code: self.info.error_code,
            error_message: self.info.error_message.clone(),
        }
    }

    pub fn start(&mut self) -> bool {
        if self.info.status != TaskStatus::Pending {
            return false;
        }
        self.info.status = TaskStatus::Processing;
        self.info.started_at = Some(Utc::now());
        true
    }

    /// Un segmento más terminado. El progreso no llega a 100 hasta `complete`.
    pub fn record_done(&mut self) -> bool {
        if self.info.status != TaskStatus::Processing {
            return false;
        }
        self.info.done_count += 1;
        self.info.progress = progress_of(self.info.done_count, self.info.total_count);
        true
    }

    /// Un segmento falló de forma definitiva: la tarea entera falla.
    pub fn record_failed(&mut self, code: ErrorCode, message: String) -> bool {
        if self.info.status != TaskStatus::Processing {
            return false;
        }
        self.info.failed_count += 1;
        self.finish_failed(code, message);
        true
    }

    pub fn complete(&mut self, output_ref: String) -> bool {
        if self.info.status != TaskStatus::Processing {
            return false;
        }
        self.info.status = TaskStatus::Completed;
        self.info.progress = 100;
        self.info.output_ref = Some(output_ref);
        self.info.finished_at = Some(Utc::now());
        true
    }

    pub fn fail(&mut self, code: ErrorCode, message: String) -> bool {
        if self.info.status.is_terminal() {
            return false;
        }
        self.finish_failed(code, message);
        true
    }

    pub fn cancel(&mut self) -> bool {
        self.fail(ErrorCode::Cancelled, "tarea cancelada por el usuario".to_string())
    }

    fn finish_failed(&mut self, code: ErrorCode, message: String) {
        self.info.status = TaskStatus::Failed;
        self.info.error_code = Some(code);
        self.info.error_message = Some(message);
        self.info.finished_at = Some(Utc::now());
    }
}

fn progress_of(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((done * 100) / total).min(99) as u8
}

/// Segmento asignado a un worker.
#[derive(Debug, Clone)]
pub struct Claim {
    pub index: usize,
    pub attempt: u32,
    pub kind: SegmentKind,
    pub text: String,
}

/// Todo lo que comparten los workers de una tarea.
///
/// Orden de locks: `machine` → `queue` → `segments`. Cada transición de la
/// máquina publica una instantánea en el canal `watch`.
pub struct TaskRuntime {
    id: TaskId,
    config: TaskConfig,
    context: Arc<TranslationContext>,
    source: Arc<Vec<u8>>,
    machine: Mutex<TaskMachine>,
    queue: Mutex<VecDeque<usize>>,
    segments: Mutex<Vec<Segment>>,
    progress_tx: watch::Sender<ProgressInfo>,
}

impl TaskRuntime {
    pub fn new(machine: TaskMachine, segments: Vec<Segment>, source: Vec<u8>) -> Self {
        let info = machine.info();
        let (progress_tx, _) = watch::channel(machine.progress_info());
        Self {
            id: info.id.clone(),
            config: info.config.clone(),
            context: Arc::new(info.config.context.clone()),
            source: Arc::new(source),
            queue: Mutex::new((0..segments.len()).collect()),
            segments: Mutex::new(segments),
            machine: Mutex::new(machine),
            progress_tx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn context(&self) -> Arc<TranslationContext> {
        self.context.clone()
    }

    pub fn source(&self) -> Arc<Vec<u8>> {
        self.source.clone()
    }

    pub fn info(&self) -> TaskInfo {
        lock(&self.machine).info().clone()
    }

    pub fn status(&self) -> TaskStatus {
        lock(&self.machine).status()
    }

    pub fn progress(&self) -> ProgressInfo {
        lock(&self.machine).progress_info()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressInfo> {
        self.progress_tx.subscribe()
    }

    /// Espera a que la tarea llegue a un estado terminal.
    pub async fn wait_terminal(&self) -> ProgressInfo {
        let mut rx = self.subscribe();
        let reached = rx.wait_for(|p| p.status.is_terminal()).await.map(|p| p.clone());
        match reached {
            Ok(p) => p,
            Err(_) => self.progress(),
        }
    }

    pub fn segments_snapshot(&self) -> Vec<Segment> {
        lock(&self.segments).clone()
    }

    pub fn all_done(&self) -> bool {
        lock(&self.segments).iter().all(|s| s.status == SegmentStatus::Done)
    }

    fn publish(&self, machine: &TaskMachine) {
        self.progress_tx.send_replace(machine.progress_info());
    }

    pub fn start(&self) -> bool {
        let mut machine = lock(&self.machine);
        let started = machine.start();
        if started {
            self.publish(&machine);
        }
        started
    }

    /// Saca el siguiente segmento pendiente. `None` si la cola está vacía o
    /// la tarea ya no está en `processing`.
    pub fn claim_next(&self) -> Option<Claim> {
        let machine = lock(&self.machine);
        if machine.status() != TaskStatus::Processing {
            return None;
        }
        let index = lock(&self.queue).pop_front()?;
        let mut segments = lock(&self.segments);
        let seg = segments.get_mut(index)?;
        let attempt = seg.begin_attempt();

        Some(Claim {
            index,
            attempt,
            kind: seg.kind(),
            text: seg.source_text().to_string(),
        })
    }

    pub fn finish_success(&self, index: usize, translated: String) {
        let mut machine = lock(&self.machine);
        let mut segments = lock(&self.segments);
        let Some(seg) = segments.get_mut(index) else {
            return;
        };

        if machine.is_cancelled() {
            // tarea cancelada: el resultado en vuelo se descarta
            seg.release(None);
            debug!("tarea {}: descartado el segmento {} tras la cancelación", self.id, index);
            return;
        }
        if !seg.complete(translated) {
            warn!("tarea {}: el segmento {} ya tenía traducción", self.id, index);
            return;
        }
        if machine.record_done() {
            self.publish(&machine);
        }
    }

    /// Fallo recuperable: el segmento vuelve a `pending` con el error anotado.
    pub fn release(&self, index: usize, error: &str) {
        if let Some(seg) = lock(&self.segments).get_mut(index) {
            seg.release(Some(error.to_string()));
        }
    }

    /// Devuelve el segmento a la cola si la tarea sigue en marcha.
    pub fn requeue(&self, index: usize) -> bool {
        let machine = lock(&self.machine);
        if machine.status() != TaskStatus::Processing {
            return false;
        }
        lock(&self.queue).push_back(index);
        true
    }

    pub fn finish_failure(&self, index: usize, code: ErrorCode, error: &str) {
        let mut machine = lock(&self.machine);
        let mut segments = lock(&self.segments);
        let Some(seg) = segments.get_mut(index) else {
            return;
        };

        if machine.is_cancelled() {
            seg.release(Some(error.to_string()));
            return;
        }

        seg.fail(error.to_string());
        let message = format!(
            "segmento {} ({}) falló tras {} intento(s): {}",
            index,
            seg.location(),
            seg.attempt_count,
            error
        );
        if machine.record_failed(code, message.clone()) {
            warn!("tarea {} fallida: {}", self.id, message);
            self.publish(&machine);
        }
    }

    pub fn complete(&self, output_ref: String) -> bool {
        let mut machine = lock(&self.machine);
        let done = machine.complete(output_ref);
        if done {
            info!("tarea {} completada", self.id);
            self.publish(&machine);
        }
        done
    }

    pub fn fail(&self, code: ErrorCode, message: String) -> bool {
        let mut machine = lock(&self.machine);
        let failed = machine.fail(code, message);
        if failed {
            warn!("tarea {} fallida: {:?}", self.id, machine.info().error_message);
            self.publish(&machine);
        }
        failed
    }

    pub fn cancel(&self) -> bool {
        let mut machine = lock(&self.machine);
        if !machine.cancel() {
            return false;
        }
        lock(&self.queue).clear();
        info!("tarea {} cancelada", self.id);
        self.publish(&machine);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(total: usize) -> TaskMachine {
        TaskMachine::new(
            "t1".into(),
            "/tmp/a.txt".into(),
            DocumentKind::Txt,
            TaskConfig::new("es"),
            None,
            total,
        )
    }

    fn runtime(n: usize) -> TaskRuntime {
        let segs = (0..n)
            .map(|i| Segment::new(i, format!("línea {}", i + 1), SegmentKind::Body, format!("s{i}")))
            .collect();
        TaskRuntime::new(machine(n), segs, Vec::new())
    }

    #[test]
    fn transiciones_validas() {
        let mut m = machine(2);
        assert!(!m.record_done(), "pending no cuenta segmentos");
        assert!(!m.complete("x".into()), "pending no puede completarse");
        assert!(m.start());
        assert!(!m.start());
        assert!(m.info().started_at.is_some());

        assert!(m.record_done());
        assert_eq!(m.info().progress, 50);
        assert!(m.record_done());
        assert_eq!(m.info().progress, 99, "100 sólo al completar");

        assert!(m.complete("/out/a.txt".into()));
        assert_eq!(m.info().progress, 100);
        assert_eq!(m.status(), TaskStatus::Completed);
        assert!(m.info().finished_at.is_some());
    }

    #[test]
    fn los_estados_terminales_no_cambian() {
        let mut m = machine(3);
        m.start();
        m.record_done();
        assert!(m.record_failed(ErrorCode::TranslationPermanent, "segmento 1".into()));

        let before = m.info().clone();
        assert!(!m.record_done());
        assert!(!m.complete("x".into()));
        assert!(!m.cancel());
        assert!(!m.fail(ErrorCode::Io, "otro".into()));

        assert_eq!(m.info().done_count, before.done_count);
        assert_eq!(m.info().progress, before.progress);
        assert_eq!(m.info().error_code, Some(ErrorCode::TranslationPermanent));
    }

    #[test]
    fn cancelar_desde_pending() {
        let mut m = machine(1);
        assert!(m.cancel());
        assert!(m.is_cancelled());
        assert_eq!(m.status(), TaskStatus::Failed);
        assert!(!m.start());
    }

    #[test]
    fn un_segmento_no_se_asigna_dos_veces() {
        let rt = runtime(2);
        assert!(rt.claim_next().is_none(), "sin arrancar no se reparte trabajo");
        rt.start();

        let a = rt.claim_next().unwrap();
        let b = rt.claim_next().unwrap();
        assert_ne!(a.index, b.index);
        assert!(rt.claim_next().is_none());
        assert_eq!(a.attempt, 1);

        rt.release(a.index, "timeout");
        assert!(rt.requeue(a.index));
        let again = rt.claim_next().unwrap();
        assert_eq!(again.index, a.index);
        assert_eq!(again.attempt, 2);
    }

    #[test]
    fn exito_tardio_tras_cancelar_se_descarta() {
        let rt = runtime(2);
        rt.start();
        let a = rt.claim_next().unwrap();
        assert!(rt.cancel());
        assert!(rt.claim_next().is_none());

        rt.finish_success(a.index, "tarde".into());
        let segs = rt.segments_snapshot();
        assert_eq!(segs[a.index].status, SegmentStatus::Pending);
        assert!(segs[a.index].translated_text().is_none());
        assert_eq!(rt.progress().done_count, 0);
        assert_eq!(rt.progress().error_code, Some(ErrorCode::Cancelled));
    }

    #[test]
    fn fallo_de_segmento_falla_la_tarea_y_conserva_parciales() {
        let rt = runtime(3);
        rt.start();
        let a = rt.claim_next().unwrap();
        let b = rt.claim_next().unwrap();
        let c = rt.claim_next().unwrap();

        rt.finish_success(a.index, "uno".into());
        rt.finish_failure(b.index, ErrorCode::TranslationPermanent, "HTTP 400");
        // el worker de c termina después del fallo: se guarda, pero no cuenta
        rt.finish_success(c.index, "tres".into());

        let p = rt.progress();
        assert_eq!(p.status, TaskStatus::Failed);
        assert_eq!(p.done_count, 1);
        assert!(p.error_message.unwrap().contains("segmento 1"));

        let segs = rt.segments_snapshot();
        assert_eq!(segs[0].translated_text(), Some("uno"));
        assert_eq!(segs[2].translated_text(), Some("tres"));
        assert_eq!(segs[1].status, SegmentStatus::Failed);
        assert!(!rt.requeue(1));
    }

    #[tokio::test]
    async fn wait_terminal_recibe_el_estado_final() {
        let rt = Arc::new(runtime(1));
        rt.start();
        let waiter = {
            let rt = rt.clone();
            tokio::spawn(async move { rt.wait_terminal().await })
        };

        let c = rt.claim_next().unwrap();
        rt.finish_success(c.index, "hecho".into());
        assert!(rt.all_done());
        rt.complete("/out/x.txt".into());

        let p = waiter.await.unwrap();
        assert_eq!(p.status, TaskStatus::Completed);
        assert_eq!(p.progress, 100);
    }
}
