use std::{env, path::PathBuf, str::FromStr, sync::Arc, time::Duration};

use tracing::info;
use worker::{IdentityTranslator, OpenAiConfig, OpenAiTranslator, RetryPolicy, SharedTranslator};

pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_STORAGE_DIR: &str = "./storage";
pub const DEFAULT_MIN_CONCURRENCY: u32 = 1;
pub const DEFAULT_MAX_CONCURRENCY: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslatorKind {
    OpenAi,
    /// Devuelve el texto original; sirve para probar sin red.
    Identity,
}

impl FromStr for TranslatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(TranslatorKind::OpenAi),
            "identity" => Ok(TranslatorKind::Identity),
            other => Err(format!("traductor desconocido: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub bind_addr: String,
    pub storage_dir: PathBuf,
    pub min_concurrency: u32,
    pub max_concurrency: u32,
    pub retry: RetryPolicy,
    /// Límite por llamada al traductor, lo aplica el worker.
    pub call_timeout: Duration,
    pub translator: TranslatorKind,
    pub openai: OpenAiConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let openai = OpenAiConfig::default();
        Self {
            bind_addr: DEFAULT_BIND.to_string(),
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            min_concurrency: DEFAULT_MIN_CONCURRENCY,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            retry: RetryPolicy::default(),
            call_timeout: openai.timeout,
            translator: TranslatorKind::OpenAi,
            openai,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

impl EngineConfig {
    /// Lee la configuración de variables de entorno; lo que falte toma el valor por defecto.
    pub fn from_env() -> Self {
        let d = Self::default();

        let min_concurrency = env_parse("DOCTRANS_MIN_CONCURRENCY").unwrap_or(d.min_concurrency).max(1);
        let max_concurrency = env_parse("DOCTRANS_MAX_CONCURRENCY")
            .unwrap_or(d.max_concurrency)
            .max(min_concurrency);

        let retry = RetryPolicy {
            max_attempts: env_parse("DOCTRANS_MAX_ATTEMPTS").unwrap_or(d.retry.max_attempts).max(1),
            initial_delay: env_parse("DOCTRANS_BACKOFF_INITIAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(d.retry.initial_delay),
            max_delay: env_parse("DOCTRANS_BACKOFF_MAX_MS")
                .map(Duration::from_millis)
                .unwrap_or(d.retry.max_delay),
            multiplier: d.retry.multiplier,
        };

        let openai = OpenAiConfig {
            api_key: env_string("OPENAI_API_KEY").unwrap_or(d.openai.api_key),
            api_base: env_string("OPENAI_API_BASE").unwrap_or(d.openai.api_base),
            model: env_string("OPENAI_MODEL").unwrap_or(d.openai.model),
            backup_model: env_string("OPENAI_BACKUP_MODEL"),
            timeout: env_parse("OPENAI_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(d.openai.timeout),
        };

        Self {
            bind_addr: env_string("DOCTRANS_BIND").unwrap_or(d.bind_addr),
            storage_dir: env_string("DOCTRANS_STORAGE_DIR").map(PathBuf::from).unwrap_or(d.storage_dir),
            min_concurrency,
            max_concurrency,
            retry,
            call_timeout: openai.timeout,
            translator: env_parse("DOCTRANS_TRANSLATOR").unwrap_or(d.translator),
            openai,
        }
    }

    /// Número de workers para una tarea: lo pedido, acotado a `[min, max]`.
    pub fn clamp_concurrency(&self, requested: u32) -> usize {
        requested.clamp(self.min_concurrency, self.max_concurrency) as usize
    }

    pub fn build_translator(&self) -> anyhow::Result<SharedTranslator> {
        match self.translator {
            TranslatorKind::Identity => {
                info!("usando traductor identidad (sin red)");
                Ok(Arc::new(IdentityTranslator))
            }
            TranslatorKind::OpenAi => {
                info!(
                    "usando modelo {} en {} (respaldo: {:?})",
                    self.openai.model, self.openai.api_base, self.openai.backup_model
                );
                Ok(Arc::new(OpenAiTranslator::new(self.openai.clone())?))
            }
        }
    }
}
