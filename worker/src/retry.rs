use std::time::Duration;

use crate::translator::TranslateFailure;

/// Número máximo de intentos por segmento.
pub const MAX_SEGMENT_ATTEMPTS: u32 = 3;

/// Backoff exponencial entre intentos de un mismo segmento.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_SEGMENT_ATTEMPTS,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(8000),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Espera tras el intento `attempt` (1, 2, ...): `initial * multiplier^(attempt-1)`,
    /// acotada por `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32) as i32;
        let ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exp);
        let capped = ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// El fallo del intento `attempt` admite otro intento.
    pub fn should_retry(&self, attempt: u32, failure: &TranslateFailure) -> bool {
        failure.is_transient() && attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_crece_y_se_acota() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for(1), Duration::from_millis(500));
        assert_eq!(p.delay_for(2), Duration::from_millis(1000));
        assert_eq!(p.delay_for(3), Duration::from_millis(2000));
        assert_eq!(p.delay_for(10), Duration::from_millis(8000));
        assert_eq!(p.delay_for(u32::MAX), Duration::from_millis(8000));
    }

    #[test]
    fn solo_se_reintentan_transitorios_bajo_el_techo() {
        let p = RetryPolicy::default();
        let t = TranslateFailure::Transient("timeout".into());
        let perm = TranslateFailure::Permanent("400".into());

        assert!(p.should_retry(1, &t));
        assert!(p.should_retry(2, &t));
        assert!(!p.should_retry(3, &t));
        assert!(!p.should_retry(1, &perm));
    }
}
