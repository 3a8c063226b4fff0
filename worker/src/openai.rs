//! Cliente para APIs compatibles con OpenAI (`POST {base}/chat/completions`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::prompt::{system_prompt, user_prompt};
use crate::translator::{TranslateFailure, TranslationRequest, Translator};

const TEMPERATURE: f64 = 0.3;
const MAX_TOKENS: u32 = 4000;

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    /// Modelo alternativo para límites de peticiones o credenciales rechazadas.
    pub backup_model: Option<String>,
    pub timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            backup_model: None,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Fallo de una llamada concreta, con el status HTTP si lo hubo.
struct CallError {
    status: Option<StatusCode>,
    failure: TranslateFailure,
}

impl From<TranslateFailure> for CallError {
    fn from(failure: TranslateFailure) -> Self {
        Self { status: None, failure }
    }
}

pub struct OpenAiTranslator {
    http: Client,
    config: OpenAiConfig,
}

impl OpenAiTranslator {
    pub fn new(config: OpenAiConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'))
    }

    async fn call(&self, model: &str, req: &TranslationRequest) -> Result<String, CallError> {
        let body = ChatRequest {
            model,
            messages: vec![
                Message {
                    role: "system",
                    content: system_prompt(req),
                },
                Message {
                    role: "user",
                    content: user_prompt(req),
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CallError::from(transport_failure(&e)))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(CallError {
                status: Some(status),
                failure: classify_status(status, &detail),
            });
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| TranslateFailure::Transient(format!("respuesta ilegible: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| TranslateFailure::Transient("respuesta sin choices".into()))?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(TranslateFailure::Permanent("contenido bloqueado por el filtro del proveedor".into()).into());
        }

        let content = strip_think(&choice.message.content.unwrap_or_default());
        if content.is_empty() {
            return Err(TranslateFailure::Transient("respuesta vacía".into()).into());
        }

        debug!("traducción ok con {}: {} caracteres", model, content.chars().count());
        Ok(content)
    }
}

fn transport_failure(e: &reqwest::Error) -> TranslateFailure {
    if e.is_timeout() {
        TranslateFailure::Transient("timeout en la llamada al modelo".into())
    } else {
        TranslateFailure::Transient(format!("error de red: {e}"))
    }
}

/// 408/409/429/5xx se reintentan; el resto de 4xx son definitivos.
pub fn classify_status(status: StatusCode, detail: &str) -> TranslateFailure {
    let detail: String = detail.chars().take(200).collect();
    let msg = format!("HTTP {}: {}", status.as_u16(), detail.trim());
    match status.as_u16() {
        408 | 409 | 429 => TranslateFailure::Transient(msg),
        s if s >= 500 => TranslateFailure::Transient(msg),
        _ => TranslateFailure::Permanent(msg),
    }
}

/// Quita los bloques `<think>...</think>` que algunos modelos devuelven.
pub fn strip_think(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("<think>") {
        out.push_str(&rest[..start]);
        match rest[start..].find("</think>") {
            Some(end) => rest = &rest[start + end + "</think>".len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

fn switches_to_backup(status: Option<StatusCode>) -> bool {
    matches!(
        status,
        Some(StatusCode::TOO_MANY_REQUESTS | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
    )
}

#[async_trait]
impl Translator for OpenAiTranslator {
    async fn translate(&self, req: &TranslationRequest) -> Result<String, TranslateFailure> {
        match self.call(&self.config.model, req).await {
            Ok(text) => Ok(text),
            Err(e) => match self.config.backup_model.as_deref() {
                Some(backup) if switches_to_backup(e.status) => {
                    warn!("modelo {} falló ({}), probando {}", self.config.model, e.failure, backup);
                    self.call(backup, req).await.map_err(|e| e.failure)
                }
                _ => Err(e.failure),
            },
        }
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}
