use std::sync::Arc;
use std::time::Duration;

use common::{ErrorCode, SegmentKind};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};
use worker::{RetryPolicy, SharedTranslator, TranslateFailure, TranslationRequest};

use crate::task::TaskRuntime;

/// Loop de un worker de la tarea.
/// - Saca segmentos de la cola compartida mientras la tarea siga en marcha.
/// - Los de código se dan por traducidos sin llamar al modelo.
/// - Un fallo transitorio con intentos libres espera el backoff y reencola.
/// - Cualquier otro fallo falla la tarea entera.
pub async fn run_worker(
    n: usize,
    rt: Arc<TaskRuntime>,
    translator: SharedTranslator,
    policy: RetryPolicy,
    call_timeout: Duration,
) {
    debug!("worker {} de la tarea {} arranca", n, rt.id());
    let mut handled = 0usize;

    while let Some(claim) = rt.claim_next() {
        handled += 1;

        if claim.kind == SegmentKind::Code {
            rt.finish_success(claim.index, claim.text);
            continue;
        }

        let req = TranslationRequest {
            text: claim.text,
            kind: claim.kind,
            source_lang: rt.config().source_lang.clone(),
            target_lang: rt.config().target_lang.clone(),
            context: rt.context(),
        };

        let outcome = match timeout(call_timeout, translator.translate(&req)).await {
            Ok(r) => r,
            Err(_) => Err(TranslateFailure::Transient(format!(
                "sin respuesta tras {}s",
                call_timeout.as_secs_f32()
            ))),
        };

        match outcome {
            Ok(text) => rt.finish_success(claim.index, text),
            Err(failure) if policy.should_retry(claim.attempt, &failure) => {
                let delay = policy.delay_for(claim.attempt);
                warn!(
                    "tarea {}: segmento {} falló en el intento {} ({}), reintento en {:?}",
                    rt.id(),
                    claim.index,
                    claim.attempt,
                    failure,
                    delay
                );
                rt.release(claim.index, failure.message());
                sleep(delay).await;
                rt.requeue(claim.index);
            }
            Err(failure) => {
                let code = if failure.is_transient() {
                    ErrorCode::RetriesExhausted
                } else {
                    ErrorCode::TranslationPermanent
                };
                rt.finish_failure(claim.index, code, failure.message());
            }
        }
    }

    debug!("worker {} de la tarea {} termina tras {} segmentos", n, rt.id(), handled);
}
