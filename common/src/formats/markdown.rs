//! Markdown orientado a líneas.
//!
//! No es un parser CommonMark completo: reconoce los bloques que importan
//! para traducir (títulos, listas, citas, tablas, código cercado y párrafos)
//! y copia el resto de líneas sin tocarlas.

use crate::error::Result;
use crate::formats::text::{decode, BOM};
use crate::formats::{ordered_translations, FormatAdapter};
use crate::segment::{Segment, SegmentKind, TranslatedSegment};
use crate::task::{DisplayMode, DocumentKind};

pub struct MarkdownAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Heading,
    ListItem,
    Quote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Cell {
    lead: String,
    text: String,
    trail: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Block {
    Verbatim(String),
    Line {
        line: usize,
        prefix: String,
        text: String,
        kind: LineKind,
    },
    Paragraph {
        line: usize,
        indent: String,
        lines: Vec<String>,
    },
    TableRow {
        line: usize,
        cells: Vec<Cell>,
    },
    Code {
        line: usize,
        open: String,
        body: Vec<String>,
        close: Option<String>,
    },
}

impl Block {
    /// Segmentos que aporta el bloque, en orden de lectura: `(ubicación, tipo, texto)`.
    fn segments(&self) -> Vec<(String, SegmentKind, String)> {
        match self {
            Block::Verbatim(_) => Vec::new(),
            Block::Line { line, text, kind, .. } => {
                let k = match kind {
                    LineKind::Heading => SegmentKind::Heading,
                    LineKind::ListItem => SegmentKind::ListItem,
                    LineKind::Quote => SegmentKind::Body,
                };
                vec![(format!("línea {line}"), k, text.clone())]
            }
            Block::Paragraph { line, lines, .. } => {
                vec![(format!("línea {line}"), SegmentKind::Body, lines.join("\n"))]
            }
            Block::TableRow { line, cells } => cells
                .iter()
                .enumerate()
                .filter(|(_, c)| !c.text.is_empty())
                .map(|(k, c)| (format!("línea {line}, celda {k}"), SegmentKind::TableCell, c.text.clone()))
                .collect(),
            Block::Code { line, body, .. } => {
                let text = body.join("\n");
                if text.trim().is_empty() {
                    Vec::new()
                } else {
                    vec![(format!("línea {line}"), SegmentKind::Code, text)]
                }
            }
        }
    }
}

fn leading_ws(s: &str) -> &str {
    &s[..s.len() - s.trim_start().len()]
}

fn fence_marker(line: &str) -> Option<&'static str> {
    let t = line.trim_start();
    if t.starts_with("```") {
        Some("```")
    } else if t.starts_with("~~~") {
        Some("~~~")
    } else {
        None
    }
}

fn is_thematic_break(line: &str) -> bool {
    let t: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    t.len() >= 3 && (t.chars().all(|c| c == '-') || t.chars().all(|c| c == '*') || t.chars().all(|c| c == '_'))
}

fn is_table_delimiter(line: &str) -> bool {
    let t = line.trim();
    t.contains('-') && t.chars().all(|c| matches!(c, '|' | '-' | ':' | ' ' | '\t'))
}

/// `## Título` → (`## `, `Título`)
fn split_heading(line: &str) -> Option<(String, String)> {
    let indent = leading_ws(line);
    let rest = &line[indent.len()..];
    let hashes = rest.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let after = &rest[hashes..];
    if !after.is_empty() && !after.starts_with(' ') && !after.starts_with('\t') {
        return None;
    }
    let text = after.trim();
    let prefix = format!("{indent}{} ", &rest[..hashes]);
    Some((prefix, text.to_string()))
}

/// `  - [ ] texto` → (`  - [ ] `, `texto`)
fn split_list_item(line: &str) -> Option<(String, String)> {
    let indent = leading_ws(line);
    let rest = &line[indent.len()..];

    let marker_len = if rest.starts_with("- ") || rest.starts_with("* ") || rest.starts_with("+ ") {
        1
    } else {
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        let tail = &rest[digits..];
        if digits == 0 || digits > 9 || !(tail.starts_with(". ") || tail.starts_with(") ")) {
            return None;
        }
        digits + 1
    };

    let after = &rest[marker_len..];
    let text_start = marker_len + (after.len() - after.trim_start().len());
    let mut prefix = format!("{indent}{}", &rest[..text_start]);
    let mut text = &rest[text_start..];

    for check in ["[ ] ", "[x] ", "[X] "] {
        if let Some(t) = text.strip_prefix(check) {
            prefix.push_str(check);
            text = t;
            break;
        }
    }

    Some((prefix, text.trim_end().to_string()))
}

/// `> > texto` → (`> > `, `texto`)
fn split_quote(line: &str) -> Option<(String, String)> {
    let indent = leading_ws(line);
    let mut rest = &line[indent.len()..];
    if !rest.starts_with('>') {
        return None;
    }
    while let Some(r) = rest.strip_prefix('>') {
        rest = r.strip_prefix(' ').unwrap_or(r);
    }
    let prefix = line[..line.len() - rest.len()].to_string();
    Some((prefix, rest.trim_end().to_string()))
}

fn split_cells(line: &str) -> Vec<Cell> {
    let mut raw = Vec::new();
    let mut cur = String::new();
    let mut escaped = false;

    for c in line.chars() {
        if c == '|' && !escaped {
            raw.push(std::mem::take(&mut cur));
            continue;
        }
        escaped = c == '\\' && !escaped;
        cur.push(c);
    }
    raw.push(cur);

    raw.into_iter()
        .map(|piece| {
            let lead = leading_ws(&piece).to_string();
            let text = piece.trim().to_string();
            let trail = piece[lead.len() + text.len()..].to_string();
            Cell { lead, text, trail }
        })
        .collect()
}

fn parse(text: &str) -> Vec<Block> {
    let lines: Vec<&str> = text.lines().collect();
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let line_no = i + 1;

        if let Some(marker) = fence_marker(line) {
            let mut body = Vec::new();
            let mut close = None;
            i += 1;
            while i < lines.len() {
                if lines[i].trim_start().starts_with(marker) {
                    close = Some(lines[i].to_string());
                    i += 1;
                    break;
                }
                body.push(lines[i].to_string());
                i += 1;
            }
            blocks.push(Block::Code {
                line: line_no,
                open: line.to_string(),
                body,
                close,
            });
            continue;
        }

        if line.trim().is_empty() || is_thematic_break(line) {
            blocks.push(Block::Verbatim(line.to_string()));
            i += 1;
            continue;
        }

        if line.trim_start().starts_with('|') {
            if is_table_delimiter(line) {
                blocks.push(Block::Verbatim(line.to_string()));
            } else {
                blocks.push(Block::TableRow {
                    line: line_no,
                    cells: split_cells(line),
                });
            }
            i += 1;
            continue;
        }

        let single = split_heading(line)
            .map(|(p, t)| (p, t, LineKind::Heading))
            .or_else(|| split_quote(line).map(|(p, t)| (p, t, LineKind::Quote)))
            .or_else(|| split_list_item(line).map(|(p, t)| (p, t, LineKind::ListItem)));

        if let Some((prefix, text, kind)) = single {
            if text.trim().is_empty() {
                blocks.push(Block::Verbatim(line.to_string()));
            } else {
                blocks.push(Block::Line {
                    line: line_no,
                    prefix,
                    text,
                    kind,
                });
            }
            i += 1;
            continue;
        }

        // párrafo: líneas seguidas hasta un blanco u otro tipo de bloque
        let indent = leading_ws(line).to_string();
        let mut para = vec![line.trim().to_string()];
        i += 1;
        while i < lines.len() && starts_paragraph_continuation(lines[i]) {
            para.push(lines[i].trim().to_string());
            i += 1;
        }
        blocks.push(Block::Paragraph {
            line: line_no,
            indent,
            lines: para,
        });
    }

    blocks
}

fn starts_paragraph_continuation(line: &str) -> bool {
    !(line.trim().is_empty()
        || fence_marker(line).is_some()
        || is_thematic_break(line)
        || line.trim_start().starts_with('|')
        || split_heading(line).is_some()
        || split_quote(line).is_some()
        || split_list_item(line).is_some())
}

fn one_line(s: &str) -> String {
    s.lines().map(str::trim).filter(|l| !l.is_empty()).collect::<Vec<_>>().join(" ")
}

fn escape_cell(s: &str) -> String {
    one_line(s).replace('|', "\\|")
}

fn render(blocks: &[Block], texts: Vec<&str>, mode: DisplayMode) -> Vec<String> {
    let mut next = texts.into_iter();
    let mut out = Vec::new();

    for block in blocks {
        match block {
            Block::Verbatim(l) => out.push(l.clone()),
            Block::Line { prefix, text, kind, .. } => {
                let t = next.next().unwrap_or_default();
                match (mode, kind) {
                    (DisplayMode::Replace, LineKind::Quote) => {
                        out.extend(t.lines().map(|l| format!("{prefix}{l}")));
                    }
                    (DisplayMode::Replace, _) => out.push(format!("{prefix}{}", one_line(t))),
                    (DisplayMode::Parallel, LineKind::Heading) => {
                        out.push(format!("{prefix}{text}"));
                        out.push(format!("> {}{}", prefix.trim_start(), one_line(t)));
                    }
                    (DisplayMode::Parallel, LineKind::ListItem) => {
                        out.push(format!("{prefix}{text}"));
                        let pad = " ".repeat(prefix.chars().count());
                        out.push(format!("{pad}> {}", one_line(t)));
                    }
                    (DisplayMode::Parallel, LineKind::Quote) => {
                        out.push(format!("{prefix}{text}"));
                        out.extend(t.lines().map(|l| format!("{prefix}> {l}")));
                    }
                }
            }
            Block::Paragraph { indent, lines, .. } => {
                let t = next.next().unwrap_or_default();
                if mode == DisplayMode::Parallel {
                    out.extend(lines.iter().map(|l| format!("{indent}{l}")));
                    out.extend(t.lines().map(|l| format!("{indent}> {l}")));
                } else {
                    out.extend(t.lines().map(|l| format!("{indent}{l}")));
                }
            }
            Block::TableRow { cells, .. } => {
                let row: Vec<String> = cells
                    .iter()
                    .map(|c| {
                        if c.text.is_empty() {
                            return format!("{}{}", c.lead, c.trail);
                        }
                        let t = escape_cell(next.next().unwrap_or_default());
                        match mode {
                            DisplayMode::Replace => format!("{}{t}{}", c.lead, c.trail),
                            DisplayMode::Parallel => format!("{}{}<br>{t}{}", c.lead, c.text, c.trail),
                        }
                    })
                    .collect();
                out.push(row.join("|"));
            }
            Block::Code { open, body, close, .. } => {
                out.push(open.clone());
                let has_segment = !body.join("\n").trim().is_empty();
                let t = if has_segment { next.next() } else { None };
                match (mode, t) {
                    (DisplayMode::Replace, Some(t)) => out.extend(t.lines().map(str::to_string)),
                    _ => out.extend(body.iter().cloned()),
                }
                if let Some(c) = close {
                    out.push(c.clone());
                }
            }
        }
    }

    out
}

impl FormatAdapter for MarkdownAdapter {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Md
    }

    fn extract(&self, source: &[u8]) -> Result<Vec<Segment>> {
        let (_, text) = decode(source)?;
        Ok(parse(&text)
            .iter()
            .flat_map(Block::segments)
            .enumerate()
            .map(|(i, (loc, kind, t))| Segment::new(i, loc, kind, t))
            .collect())
    }

    fn assemble(&self, source: &[u8], translated: &[TranslatedSegment], mode: DisplayMode) -> Result<Vec<u8>> {
        let (bom, text) = decode(source)?;
        let blocks = parse(&text);
        let expected = blocks.iter().map(|b| b.segments().len()).sum();
        let texts = ordered_translations(expected, translated)?;

        let mut out = String::new();
        if bom {
            out.push(BOM);
        }
        out.push_str(&render(&blocks, texts, mode).join("\n"));
        if text.ends_with('\n') {
            out.push('\n');
        }
        Ok(out.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "# Guía\n\nPrimer párrafo\ncontinúa aquí.\n\n- uno\n  2. dos\n\n> cita\n\n| A | B |\n|---|---|\n| x |   |\n\n```rust\nfn main() {}\n```\n\n---\n";

    fn upper(segs: &[Segment]) -> Vec<TranslatedSegment> {
        segs.iter()
            .map(|s| TranslatedSegment::new(s.index(), s.source_text().to_uppercase()))
            .collect()
    }

    #[test]
    fn extrae_bloques_con_su_tipo() {
        let segs = MarkdownAdapter.extract(DOC.as_bytes()).unwrap();
        let got: Vec<(SegmentKind, &str)> = segs.iter().map(|s| (s.kind(), s.source_text())).collect();

        assert_eq!(
            got,
            vec![
                (SegmentKind::Heading, "Guía"),
                (SegmentKind::Body, "Primer párrafo\ncontinúa aquí."),
                (SegmentKind::ListItem, "uno"),
                (SegmentKind::ListItem, "dos"),
                (SegmentKind::Body, "cita"),
                (SegmentKind::TableCell, "A"),
                (SegmentKind::TableCell, "B"),
                (SegmentKind::TableCell, "x"),
                (SegmentKind::Code, "fn main() {}"),
            ]
        );
        assert_eq!(segs[0].location(), "línea 1");
        assert_eq!(segs[6].location(), "línea 11, celda 2");
        assert!(segs.iter().enumerate().all(|(i, s)| s.index() == i));
    }

    #[test]
    fn replace_conserva_prefijos_y_lineas_verbatim() {
        let segs = MarkdownAdapter.extract(DOC.as_bytes()).unwrap();
        let out = MarkdownAdapter
            .assemble(DOC.as_bytes(), &upper(&segs), DisplayMode::Replace)
            .unwrap();
        let out = String::from_utf8(out).unwrap();

        assert_eq!(
            out,
            "# GUÍA\n\nPRIMER PÁRRAFO\nCONTINÚA AQUÍ.\n\n- UNO\n  2. DOS\n\n> CITA\n\n| A | B |\n|---|---|\n| X |   |\n\n```rust\nFN MAIN() {}\n```\n\n---\n"
        );
    }

    #[test]
    fn parallel_anade_hermano_por_tipo() {
        let src = "## Título\n\n- punto\n\nTexto\n\n> cita\n\n| a |\n\n```\ncode\n```";
        let segs = MarkdownAdapter.extract(src.as_bytes()).unwrap();
        let out = MarkdownAdapter
            .assemble(src.as_bytes(), &upper(&segs), DisplayMode::Parallel)
            .unwrap();
        let out = String::from_utf8(out).unwrap();

        assert_eq!(
            out,
            "## Título\n> ## TÍTULO\n\n- punto\n  > PUNTO\n\nTexto\n> TEXTO\n\n> cita\n> > CITA\n\n| a<br>A |\n\n```\ncode\n```"
        );
    }

    #[test]
    fn celdas_traducidas_escapan_barras() {
        let src = "| uno |\n";
        let out = MarkdownAdapter
            .assemble(src.as_bytes(), &[TranslatedSegment::new(0, "a|b")], DisplayMode::Replace)
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "| a\\|b |\n");
    }

    #[test]
    fn listas_con_casillas_y_numeros() {
        assert_eq!(
            split_list_item("  - [x] hecho"),
            Some(("  - [x] ".to_string(), "hecho".to_string()))
        );
        assert_eq!(split_list_item("10) diez"), Some(("10) ".to_string(), "diez".to_string())));
        assert_eq!(split_list_item("-sin espacio"), None);
        assert_eq!(split_list_item("2024. no"), Some(("2024. ".to_string(), "no".to_string())));
    }

    #[test]
    fn bloque_de_codigo_sin_cerrar_llega_al_final() {
        let src = "```\nlet a = 1;\n";
        let segs = MarkdownAdapter.extract(src.as_bytes()).unwrap();
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].kind(), SegmentKind::Code);
        let out = MarkdownAdapter
            .assemble(src.as_bytes(), &[TranslatedSegment::new(0, "let a = 1;")], DisplayMode::Replace)
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), src);
    }

    #[test]
    fn faltan_indices_es_desajuste_estructural() {
        let segs = MarkdownAdapter.extract(DOC.as_bytes()).unwrap();
        let partial = &upper(&segs)[..3];
        let err = MarkdownAdapter
            .assemble(DOC.as_bytes(), partial, DisplayMode::Replace)
            .unwrap_err();
        assert!(err.is_structural_mismatch());
    }
}
