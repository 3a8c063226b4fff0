use serde::{Deserialize, Serialize};

/// Papel estructural de un segmento dentro del documento.
///
/// Puede influir en el prompt (un título se traduce como título), nunca en
/// el orden de reensamblado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Heading,
    Body,
    TableCell,
    ListItem,
    Code,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    Pending,
    InProgress,
    Done,
    Failed,
}

impl SegmentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SegmentStatus::Done | SegmentStatus::Failed)
    }
}

/// Unidad traducible con su dirección estructural.
///
/// `index`, `location`, `kind` y `source_text` se fijan en la extracción y no
/// cambian. `translated_text` sólo se escribe una vez, cuando un worker
/// termina con éxito.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    index: usize,
    location: String,
    kind: SegmentKind,
    source_text: String,
    translated_text: Option<String>,
    pub status: SegmentStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
}

impl Segment {
    pub fn new(index: usize, location: impl Into<String>, kind: SegmentKind, source_text: impl Into<String>) -> Self {
        Self {
            index,
            location: location.into(),
            kind,
            source_text: source_text.into(),
            translated_text: None,
            status: SegmentStatus::Pending,
            attempt_count: 0,
            last_error: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    pub fn translated_text(&self) -> Option<&str> {
        self.translated_text.as_deref()
    }

    /// Pasa el segmento a `in_progress` y cuenta un intento más.
    /// Devuelve el número de intento que arranca (1, 2, ...).
    pub fn begin_attempt(&mut self) -> u32 {
        self.status = SegmentStatus::InProgress;
        self.attempt_count += 1;
        self.attempt_count
    }

    /// Guarda la traducción. Una traducción ya fijada no se sobreescribe:
    /// devuelve `false` si el segmento ya tenía texto traducido.
    pub fn complete(&mut self, translated: String) -> bool {
        if self.translated_text.is_some() {
            return false;
        }
        self.translated_text = Some(translated);
        self.status = SegmentStatus::Done;
        true
    }

    /// Fallo recuperable: vuelve a `pending` para reencolarse.
    pub fn release(&mut self, error: Option<String>) {
        self.status = SegmentStatus::Pending;
        if error.is_some() {
            self.last_error = error;
        }
    }

    pub fn fail(&mut self, error: String) {
        self.status = SegmentStatus::Failed;
        self.last_error = Some(error);
    }

    /// Par `(index, traducción)` listo para el ensamblador, si ya existe.
    pub fn to_translated(&self) -> Option<TranslatedSegment> {
        self.translated_text.as_ref().map(|text| TranslatedSegment {
            index: self.index,
            text: text.clone(),
        })
    }
}

/// Traducción de un segmento tal y como la consume `FormatAdapter::assemble`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedSegment {
    pub index: usize,
    pub text: String,
}

impl TranslatedSegment {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segmento_nuevo_arranca_pendiente() {
        let s = Segment::new(0, "párrafo 1", SegmentKind::Body, "Hola");
        assert_eq!(s.status, SegmentStatus::Pending);
        assert_eq!(s.attempt_count, 0);
        assert!(s.translated_text().is_none());
        assert!(s.to_translated().is_none());
    }

    #[test]
    fn la_traduccion_solo_se_fija_una_vez() {
        let mut s = Segment::new(3, "párrafo 4", SegmentKind::Body, "Hello");
        assert_eq!(s.begin_attempt(), 1);
        assert!(s.complete("Hola".to_string()));
        assert!(!s.complete("Otra".to_string()));
        assert_eq!(s.translated_text(), Some("Hola"));
        assert_eq!(s.status, SegmentStatus::Done);
        assert_eq!(s.to_translated(), Some(TranslatedSegment::new(3, "Hola")));
    }

    #[test]
    fn release_conserva_el_ultimo_error() {
        let mut s = Segment::new(0, "x", SegmentKind::Body, "t");
        s.begin_attempt();
        s.release(Some("timeout".to_string()));
        s.begin_attempt();
        s.release(None);
        assert_eq!(s.status, SegmentStatus::Pending);
        assert_eq!(s.attempt_count, 2);
        assert_eq!(s.last_error.as_deref(), Some("timeout"));
    }
}
