//! Cliente de traducción: contrato `Translator`, implementación HTTP
//! compatible con OpenAI, construcción de prompts y política de reintentos.

pub mod identity;
pub mod openai;
pub mod prompt;
pub mod retry;
pub mod translator;

pub use identity::IdentityTranslator;
pub use openai::{OpenAiConfig, OpenAiTranslator};
pub use retry::{RetryPolicy, MAX_SEGMENT_ATTEMPTS};
pub use translator::{SharedTranslator, TranslateFailure, TranslationRequest, Translator};
