//! Adaptadores de formato: extraen segmentos de un documento y lo reconstruyen
//! con las traducciones.

use std::collections::HashSet;

use crate::error::{FormatError, Result, StructuralMismatch};
use crate::segment::{Segment, TranslatedSegment};
use crate::task::{DisplayMode, DocumentKind};

pub mod docx;
pub mod markdown;
pub(crate) mod ooxml;
pub mod pptx;
pub mod text;
pub mod xlsx;

#[cfg(test)]
pub(crate) mod testutil;

/// Un formato de documento.
///
/// `extract` y `assemble` son puras: no tocan disco ni red. La misma entrada
/// produce siempre los mismos segmentos, con índices `0..N` en orden de
/// lectura.
pub trait FormatAdapter: Send + Sync {
    fn kind(&self) -> DocumentKind;

    fn extract(&self, source: &[u8]) -> Result<Vec<Segment>>;

    /// Reconstruye el documento. `translated` debe cubrir exactamente los
    /// índices `0..N` de la extracción; si no, devuelve
    /// `FormatError::StructuralMismatch` sin escribir nada.
    fn assemble(&self, source: &[u8], translated: &[TranslatedSegment], mode: DisplayMode) -> Result<Vec<u8>>;
}

pub fn adapter_for(kind: DocumentKind) -> Box<dyn FormatAdapter> {
    match kind {
        DocumentKind::Txt => Box::new(text::PlainTextAdapter),
        DocumentKind::Md => Box::new(markdown::MarkdownAdapter),
        DocumentKind::Docx => Box::new(docx::DocxAdapter),
        DocumentKind::Xlsx => Box::new(xlsx::XlsxAdapter),
        DocumentKind::Pptx => Box::new(pptx::PptxAdapter),
    }
}

/// Comprueba que `translated` cubre exactamente `0..expected` y devuelve los
/// textos ordenados por índice.
pub fn ordered_translations(expected: usize, translated: &[TranslatedSegment]) -> Result<Vec<&str>> {
    let mut slots: Vec<Option<&str>> = vec![None; expected];
    let mut duplicated = Vec::new();
    let mut out_of_range = Vec::new();

    for t in translated {
        match slots.get_mut(t.index) {
            Some(slot @ None) => *slot = Some(t.text.as_str()),
            Some(Some(_)) => duplicated.push(t.index),
            None => out_of_range.push(t.index),
        }
    }

    let missing: Vec<usize> = slots
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_none())
        .map(|(i, _)| i)
        .collect();

    if !missing.is_empty() || !duplicated.is_empty() || !out_of_range.is_empty() {
        dedup_sorted(&mut duplicated);
        dedup_sorted(&mut out_of_range);
        return Err(FormatError::StructuralMismatch(StructuralMismatch {
            expected,
            missing,
            duplicated,
            out_of_range,
        }));
    }

    Ok(slots.into_iter().flatten().collect())
}

fn dedup_sorted(v: &mut Vec<usize>) {
    let mut seen = HashSet::new();
    v.retain(|i| seen.insert(*i));
    v.sort_unstable();
}
