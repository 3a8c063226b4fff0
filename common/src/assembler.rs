//! Reconstrucción del documento a partir de los segmentos de una tarea y
//! vista previa origen/traducción.

use crate::error::Result;
use crate::formats::adapter_for;
use crate::results::{PreviewEntry, PreviewPair};
use crate::segment::{Segment, TranslatedSegment};
use crate::task::{DisplayMode, DocumentKind};

/// Ensambla el documento traducido.
///
/// Es estricto: si algún segmento no tiene traducción el adaptador devuelve
/// `FormatError::StructuralMismatch` y no se produce salida.
pub fn assemble(kind: DocumentKind, source: &[u8], segments: &[Segment], mode: DisplayMode) -> Result<Vec<u8>> {
    let translated: Vec<TranslatedSegment> = segments.iter().filter_map(Segment::to_translated).collect();
    adapter_for(kind).assemble(source, &translated, mode)
}

/// Empareja por posición hasta `max(len)`, rellenando con "" el lado corto.
///
/// Al contrario que `assemble`, nunca falla: sirve para mostrar resultados
/// parciales mientras la tarea sigue en curso.
pub fn pair_for_preview<S: AsRef<str>, T: AsRef<str>>(source: &[S], translated: &[T]) -> Vec<PreviewPair> {
    let len = source.len().max(translated.len());
    (0..len)
        .map(|i| PreviewPair {
            index: i,
            source: source.get(i).map(|s| s.as_ref().to_string()).unwrap_or_default(),
            translated: translated.get(i).map(|t| t.as_ref().to_string()).unwrap_or_default(),
        })
        .collect()
}

/// Vista previa de una tarea: una fila por segmento en orden de índice.
pub fn preview_entries(segments: &[Segment]) -> Vec<PreviewEntry> {
    let mut ordered: Vec<&Segment> = segments.iter().collect();
    ordered.sort_by_key(|s| s.index());

    ordered
        .into_iter()
        .map(|s| PreviewEntry {
            index: s.index(),
            location: s.location().to_string(),
            kind: s.kind(),
            status: s.status,
            attempts: s.attempt_count,
            source: s.source_text().to_string(),
            translated: s.translated_text().unwrap_or_default().to_string(),
            last_error: s.last_error.clone(),
        })
        .collect()
}
