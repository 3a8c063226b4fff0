use crate::error::Result;
use crate::formats::{ordered_translations, FormatAdapter};
use crate::segment::{Segment, SegmentKind, TranslatedSegment};
use crate::task::{DisplayMode, DocumentKind};

pub(crate) const BOM: char = '\u{feff}';

/// Texto plano: un segmento por párrafo, separados por líneas en blanco.
pub struct PlainTextAdapter;

/// Párrafo localizado en el texto: rango de bytes ya recortado y línea inicial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
    line: usize,
}

fn split_paragraphs(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut open: Option<(usize, usize)> = None; // (inicio, línea)
    let mut last_end = 0;
    let mut offset = 0;

    for (n, line) in text.split_inclusive('\n').enumerate() {
        if line.trim().is_empty() {
            if let Some((start, first)) = open.take() {
                spans.push(trimmed(text, start, last_end, first));
            }
        } else {
            if open.is_none() {
                open = Some((offset, n + 1));
            }
            last_end = offset + line.len();
        }
        offset += line.len();
    }
    if let Some((start, first)) = open {
        spans.push(trimmed(text, start, last_end, first));
    }

    spans
}

fn trimmed(text: &str, start: usize, end: usize, line: usize) -> Span {
    let s = &text[start..end];
    let lead = s.len() - s.trim_start().len();
    let trail = s.len() - s.trim_end().len();
    Span {
        start: start + lead,
        end: end - trail,
        line,
    }
}

pub(crate) fn decode(source: &[u8]) -> Result<(bool, String)> {
    let text = String::from_utf8(source.to_vec())?;
    match text.strip_prefix(BOM) {
        Some(rest) => Ok((true, rest.to_string())),
        None => Ok((false, text)),
    }
}

/// Bloque de cita con la traducción: `> ` delante de cada línea.
fn quoted(translation: &str) -> String {
    translation
        .lines()
        .map(|l| if l.is_empty() { ">".to_string() } else { format!("> {l}") })
        .collect::<Vec<_>>()
        .join("\n")
}

impl FormatAdapter for PlainTextAdapter {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Txt
    }

    fn extract(&self, source: &[u8]) -> Result<Vec<Segment>> {
        let (_, text) = decode(source)?;
        Ok(split_paragraphs(&text)
            .into_iter()
            .enumerate()
            .map(|(i, sp)| Segment::new(i, format!("línea {}", sp.line), SegmentKind::Body, &text[sp.start..sp.end]))
            .collect())
    }

    fn assemble(&self, source: &[u8], translated: &[TranslatedSegment], mode: DisplayMode) -> Result<Vec<u8>> {
        let (bom, text) = decode(source)?;
        let spans = split_paragraphs(&text);
        let texts = ordered_translations(spans.len(), translated)?;

        let mut out = String::with_capacity(text.len() * 2);
        if bom {
            out.push(BOM);
        }

        // los separadores entre párrafos se copian tal cual
        let mut cursor = 0;
        for (sp, t) in spans.iter().zip(texts) {
            out.push_str(&text[cursor..sp.start]);
            match mode {
                DisplayMode::Replace => out.push_str(t),
                DisplayMode::Parallel => {
                    out.push_str(&text[sp.start..sp.end]);
                    out.push_str("\n\n");
                    out.push_str(&quoted(t));
                }
            }
            cursor = sp.end;
        }
        out.push_str(&text[cursor..]);

        Ok(out.into_bytes())
    }
}
