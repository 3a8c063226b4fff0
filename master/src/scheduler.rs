use std::sync::Arc;

use common::{assembler, ErrorCode, TaskStatus};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::pool::run_worker;
use crate::state::AppState;
use crate::storage;
use crate::task::TaskRuntime;

pub fn spawn_task(state: &AppState, rt: Arc<TaskRuntime>) -> JoinHandle<()> {
    let state = state.clone();
    tokio::spawn(async move { run_task(state, rt).await })
}

/// Ciclo completo de una tarea: arranca, lanza los workers, espera a que
/// todos terminen y ensambla el documento si no hubo fallos.
pub async fn run_task(state: AppState, rt: Arc<TaskRuntime>) {
    if !rt.start() {
        info!("tarea {} no arranca: ya está en {:?}", rt.id(), rt.status());
        return;
    }

    let total = rt.info().total_count;
    let workers = state.config.clamp_concurrency(rt.config().concurrency).min(total.max(1));
    info!(
        "tarea {} en marcha: {} segmentos, {} workers, traductor {}",
        rt.id(),
        total,
        workers,
        state.translator.name()
    );

    let handles: Vec<_> = (0..workers)
        .map(|n| {
            tokio::spawn(run_worker(
                n,
                rt.clone(),
                state.translator.clone(),
                state.config.retry.clone(),
                state.config.call_timeout,
            ))
        })
        .collect();

    for h in handles {
        if let Err(e) = h.await {
            warn!("un worker de la tarea {} terminó mal: {}", rt.id(), e);
        }
    }

    finalize(&state, &rt).await;
}

async fn finalize(state: &AppState, rt: &TaskRuntime) {
    if rt.status() != TaskStatus::Processing {
        return;
    }
    if !rt.all_done() {
        rt.fail(
            ErrorCode::TranslationPermanent,
            "los workers terminaron con segmentos sin traducir".to_string(),
        );
        return;
    }

    let info = rt.info();
    let kind = info.document_kind;
    let mode = info.config.display_mode;
    let source = rt.source();
    let segments = rt.segments_snapshot();

    let assembled = tokio::task::spawn_blocking(move || assembler::assemble(kind, &source, &segments, mode)).await;
    let bytes = match assembled {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            let code = if e.is_structural_mismatch() {
                ErrorCode::StructuralMismatch
            } else {
                ErrorCode::Extraction
            };
            rt.fail(code, format!("no se pudo ensamblar el documento: {e}"));
            return;
        }
        Err(e) => {
            rt.fail(ErrorCode::Io, format!("el ensamblado terminó mal: {e}"));
            return;
        }
    };

    let path = storage::output_path(&state.config.storage_dir, &info.source_ref, kind);
    if let Err(e) = storage::write_output(&path, &bytes).await {
        rt.fail(ErrorCode::Io, format!("no se pudo escribir {}: {e}", path.display()));
        return;
    }

    if !rt.complete(path.to_string_lossy().into_owned()) {
        // cancelada mientras se escribía
        if let Err(e) = storage::remove_output(&path).await {
            warn!("no se pudo borrar {}: {}", path.display(), e);
        }
    }
}
