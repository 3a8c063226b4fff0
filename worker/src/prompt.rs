//! Construcción de los mensajes que se envían al modelo.

use common::{GlossaryTerm, SegmentKind, AUTO_LANG};

use crate::translator::TranslationRequest;

/// Nombre legible de un código de idioma; si no está en la tabla, el propio código.
pub fn lang_name(code: &str) -> &str {
    match code.to_ascii_lowercase().as_str() {
        "zh" | "zh-cn" | "zh-hans" => "Simplified Chinese",
        "zh-tw" | "zh-hant" => "Traditional Chinese",
        "en" => "English",
        "ja" => "Japanese",
        "ko" => "Korean",
        "fr" => "French",
        "de" => "German",
        "es" => "Spanish",
        "ru" => "Russian",
        "pt" => "Portuguese",
        "it" => "Italian",
        "ar" => "Arabic",
        _ => code,
    }
}

/// Términos del glosario que aparecen en el texto (sin distinguir mayúsculas).
pub fn relevant_terms<'a>(text: &str, glossary: &'a [GlossaryTerm]) -> Vec<&'a GlossaryTerm> {
    let haystack = text.to_lowercase();
    glossary
        .iter()
        .filter(|t| !t.source.trim().is_empty() && haystack.contains(&t.source.to_lowercase()))
        .collect()
}

fn kind_hint(kind: SegmentKind) -> Option<&'static str> {
    match kind {
        SegmentKind::Heading => Some("The text is a heading: keep it short and title-like."),
        SegmentKind::TableCell => Some("The text is a table cell: keep it compact, do not add punctuation."),
        SegmentKind::ListItem => Some("The text is a list item: do not add bullets or numbering."),
        SegmentKind::Body | SegmentKind::Code => None,
    }
}

pub fn system_prompt(req: &TranslationRequest) -> String {
    let mut out = format!(
        "You are a professional translator specialised in the \"{}\" domain. \
         Translate accurately, keeping the meaning, tone and formatting of the original.",
        req.context.domain
    );

    if let Some(hint) = kind_hint(req.kind) {
        out.push(' ');
        out.push_str(hint);
    }

    let terms = relevant_terms(&req.text, &req.context.glossary);
    if !terms.is_empty() {
        out.push_str("\nUse this terminology:");
        for t in terms {
            out.push_str(&format!("\n- {} => {}", t.source, t.target));
        }
    }

    if let Some(extra) = req.context.prompt.as_deref().filter(|p| !p.trim().is_empty()) {
        out.push('\n');
        out.push_str(extra.trim());
    }

    out
}

pub fn user_prompt(req: &TranslationRequest) -> String {
    let target = lang_name(&req.target_lang);
    let from = if req.source_lang == AUTO_LANG || req.source_lang.is_empty() {
        String::new()
    } else {
        format!(" from {}", lang_name(&req.source_lang))
    };
    format!(
        "Translate the following text{from} into {target}. Return only the translation, without explanations:\n\n{}",
        req.text
    )
}
