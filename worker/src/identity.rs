use async_trait::async_trait;

use crate::translator::{TranslateFailure, TranslationRequest, Translator};

/// Devuelve el texto original. Modo sin conexión y traducción al mismo idioma.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTranslator;

#[async_trait]
impl Translator for IdentityTranslator {
    async fn translate(&self, req: &TranslationRequest) -> Result<String, TranslateFailure> {
        Ok(req.text.clone())
    }

    fn name(&self) -> &str {
        "identity"
    }
}
