//! Hojas de cálculo: un segmento por celda de texto.
//!
//! Las celdas no admiten hermanos, así que el modo paralelo escribe
//! `original\ntraducción` dentro de la misma celda.

use std::collections::HashMap;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{FormatError, Result};
use crate::formats::ooxml::{get_attr, parse_relationships, resolve_target, write_event, Package};
use crate::formats::{ordered_translations, FormatAdapter};
use crate::segment::{Segment, SegmentKind, TranslatedSegment};
use crate::task::{DisplayMode, DocumentKind};

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS: &str = "xl/sharedStrings.xml";

pub struct XlsxAdapter;

struct Sheet {
    name: String,
    part: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TextCell {
    /// Posición del `<c>` dentro de la hoja, cuente o no como segmento.
    ordinal: usize,
    reference: String,
    text: String,
}

/// Hojas en el orden del libro.
fn sheets(pkg: &Package) -> Result<Vec<Sheet>> {
    let workbook = pkg.part_str(WORKBOOK_PART)?;
    let rels = parse_relationships(&pkg.part_str(WORKBOOK_RELS)?)?;
    let mut out = Vec::new();
    let mut reader = Reader::from_str(&workbook);

    loop {
        match reader.read_event().map_err(FormatError::xml)? {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"sheet" => {
                let name = get_attr(&e, b"name").unwrap_or_default();
                let rid = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.as_ref().ends_with(b":id"))
                    .map(|a| String::from_utf8_lossy(&a.value).into_owned());

                let target = rid.and_then(|id| rels.get(&id).cloned()).ok_or_else(|| {
                    FormatError::Malformed(format!("la hoja '{name}' no tiene relación en el libro"))
                })?;
                out.push(Sheet {
                    name,
                    part: resolve_target("xl", &target),
                });
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(out)
}

/// Tabla de cadenas compartidas; las guías fonéticas (`rPh`) no cuentan.
fn shared_strings(pkg: &Package) -> Result<Vec<String>> {
    if pkg.part(SHARED_STRINGS).is_none() {
        return Ok(Vec::new());
    }
    let xml = pkg.part_str(SHARED_STRINGS)?;
    let mut reader = Reader::from_str(&xml);
    let mut out = Vec::new();
    let mut cur: Option<String> = None;
    let mut in_t = false;
    let mut phonetic = 0usize;

    loop {
        match reader.read_event().map_err(FormatError::xml)? {
            Event::Start(e) => match e.name().as_ref() {
                b"si" => cur = Some(String::new()),
                b"rPh" => phonetic += 1,
                b"t" => in_t = true,
                _ => {}
            },
            Event::Empty(e) if e.name().as_ref() == b"si" => out.push(String::new()),
            Event::End(e) => match e.name().as_ref() {
                b"si" => out.push(cur.take().unwrap_or_default()),
                b"rPh" => phonetic = phonetic.saturating_sub(1),
                b"t" => in_t = false,
                _ => {}
            },
            Event::Text(t) if in_t && phonetic == 0 => {
                if let Some(c) = cur.as_mut() {
                    c.push_str(&t.unescape().map_err(FormatError::xml)?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(out)
}

#[derive(Default)]
struct OpenCell {
    ordinal: usize,
    reference: String,
    cell_type: String,
    formula: bool,
    in_value: bool,
    in_text: bool,
    phonetic: usize,
    raw: String,
}

impl OpenCell {
    fn into_text(self, shared: &[String]) -> Option<TextCell> {
        if self.formula {
            return None;
        }
        let text = match self.cell_type.as_str() {
            "s" => shared.get(self.raw.trim().parse::<usize>().ok()?)?.clone(),
            "inlineStr" => self.raw,
            // números, booleanos, errores y resultados de fórmula
            _ => return None,
        };
        let trimmed = text.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('=') {
            return None;
        }
        Some(TextCell {
            ordinal: self.ordinal,
            reference: self.reference,
            text,
        })
    }
}

fn scan_sheet(xml: &str, shared: &[String]) -> Result<Vec<TextCell>> {
    let mut reader = Reader::from_str(xml);
    let mut cells = Vec::new();
    let mut ordinal = 0usize;
    let mut open: Option<OpenCell> = None;

    loop {
        match reader.read_event().map_err(FormatError::xml)? {
            Event::Start(e) if e.name().as_ref() == b"c" => {
                open = Some(OpenCell {
                    ordinal,
                    reference: get_attr(&e, b"r").unwrap_or_else(|| format!("celda {}", ordinal + 1)),
                    cell_type: get_attr(&e, b"t").unwrap_or_default(),
                    ..OpenCell::default()
                });
                ordinal += 1;
            }
            Event::Empty(e) if e.name().as_ref() == b"c" => ordinal += 1,
            Event::End(e) if e.name().as_ref() == b"c" => {
                if let Some(cell) = open.take().and_then(|c| c.into_text(shared)) {
                    cells.push(cell);
                }
            }
            Event::Start(e) => {
                if let Some(c) = open.as_mut() {
                    match e.name().as_ref() {
                        b"f" => c.formula = true,
                        b"v" => c.in_value = true,
                        b"t" => c.in_text = true,
                        b"rPh" => c.phonetic += 1,
                        _ => {}
                    }
                }
            }
            Event::Empty(e) => {
                if let Some(c) = open.as_mut() {
                    if e.name().as_ref() == b"f" {
                        c.formula = true;
                    }
                }
            }
            Event::End(e) => {
                if let Some(c) = open.as_mut() {
                    match e.name().as_ref() {
                        b"v" => c.in_value = false,
                        b"t" => c.in_text = false,
                        b"rPh" => c.phonetic = c.phonetic.saturating_sub(1),
                        _ => {}
                    }
                }
            }
            Event::Text(t) => {
                if let Some(c) = open.as_mut() {
                    if c.in_value || (c.in_text && c.phonetic == 0) {
                        c.raw.push_str(&t.unescape().map_err(FormatError::xml)?);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(cells)
}

/// Reescribe las celdas indicadas (por ordinal) como cadenas en línea.
fn rewrite_sheet(xml: &str, values: &HashMap<usize, String>) -> Result<Vec<u8>> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let mut ordinal = 0usize;
    // profundidad dentro de una celda reescrita cuyo contenido original se descarta
    let mut skipping = 0usize;

    loop {
        let ev = reader.read_event().map_err(FormatError::xml)?;

        if skipping > 0 {
            match ev {
                Event::Start(_) => skipping += 1,
                Event::End(e) => {
                    skipping -= 1;
                    if skipping == 0 {
                        write_event(&mut writer, Event::End(e))?;
                    }
                }
                Event::Eof => return Err(FormatError::Malformed("celda sin cerrar".into())),
                _ => {}
            }
            continue;
        }

        match ev {
            Event::Start(e) if e.name().as_ref() == b"c" => {
                let current = ordinal;
                ordinal += 1;
                match values.get(&current) {
                    Some(text) => {
                        write_inline_cell(&mut writer, &e, text)?;
                        skipping = 1;
                    }
                    None => write_event(&mut writer, Event::Start(e))?,
                }
            }
            Event::Empty(e) if e.name().as_ref() == b"c" => {
                ordinal += 1;
                write_event(&mut writer, Event::Empty(e))?;
            }
            Event::Eof => break,
            other => write_event(&mut writer, other)?,
        }
    }

    Ok(writer.into_inner())
}

fn write_inline_cell(w: &mut Writer<Vec<u8>>, original: &BytesStart, text: &str) -> Result<()> {
    let name = String::from_utf8_lossy(original.name().as_ref()).into_owned();
    let mut start = BytesStart::new(name);
    for a in original.attributes().flatten() {
        if a.key.as_ref() != b"t" {
            start.push_attribute(a);
        }
    }
    start.push_attribute(("t", "inlineStr"));

    write_event(w, Event::Start(start))?;
    write_event(w, Event::Start(BytesStart::new("is")))?;
    let mut t = BytesStart::new("t");
    t.push_attribute(("xml:space", "preserve"));
    write_event(w, Event::Start(t))?;
    write_event(w, Event::Text(BytesText::new(text)))?;
    write_event(w, Event::End(BytesEnd::new("t")))?;
    write_event(w, Event::End(BytesEnd::new("is")))
}

struct SheetScan {
    sheet: Sheet,
    xml: String,
    cells: Vec<TextCell>,
}

fn scan(pkg: &Package) -> Result<Vec<SheetScan>> {
    let shared = shared_strings(pkg)?;
    sheets(pkg)?
        .into_iter()
        .map(|sheet| {
            let xml = pkg.part_str(&sheet.part)?;
            let cells = scan_sheet(&xml, &shared)?;
            Ok(SheetScan { sheet, xml, cells })
        })
        .collect()
}

impl FormatAdapter for XlsxAdapter {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Xlsx
    }

    fn extract(&self, source: &[u8]) -> Result<Vec<Segment>> {
        let pkg = Package::read(source)?;
        let mut segments = Vec::new();

        for s in scan(&pkg)? {
            for c in s.cells {
                let loc = format!("{}!{}", s.sheet.name, c.reference);
                segments.push(Segment::new(segments.len(), loc, SegmentKind::TableCell, c.text));
            }
        }

        Ok(segments)
    }

    fn assemble(&self, source: &[u8], translated: &[TranslatedSegment], mode: DisplayMode) -> Result<Vec<u8>> {
        let pkg = Package::read(source)?;
        let scans = scan(&pkg)?;
        let total = scans.iter().map(|s| s.cells.len()).sum();
        let texts = ordered_translations(total, translated)?;

        let mut next = texts.into_iter();
        let mut parts = HashMap::new();

        for s in &scans {
            if s.cells.is_empty() {
                continue;
            }
            let values: HashMap<usize, String> = s
                .cells
                .iter()
                .map(|c| {
                    let t = next.next().unwrap_or_default();
                    let v = match mode {
                        DisplayMode::Replace => t.to_string(),
                        DisplayMode::Parallel => format!("{}\n{t}", c.text),
                    };
                    (c.ordinal, v)
                })
                .collect();
            parts.insert(s.sheet.part.clone(), rewrite_sheet(&s.xml, &values)?);
        }

        pkg.write(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::testutil::{read_part, xlsx_with};

    const SST: &str = r#"<sst xmlns="x" count="3" uniqueCount="3"><si><t>Producto</t></si><si><r><t>Precio </t></r><r><rPr><b/></rPr><t>total</t></r><rPh sb="0" eb="1"><t>ふりがな</t></rPh></si><si><t>=no es fórmula</t></si></sst>"#;

    const SHEET1: &str = r#"<sheetData><row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s" s="2"><v>1</v></c><c r="C1"/></row><row r="2"><c r="A2"><v>42</v></c><c r="B2" t="str"><f>A2*2</f><v>84</v></c><c r="C2" t="s"><v>2</v></c><c r="D2" t="inlineStr"><is><t>Nota &amp; aviso</t></is></c></row></sheetData>"#;
    const SHEET2: &str = r#"<sheetData><row r="7"><c r="B7" t="inlineStr"><is><t>Resumen</t></is></c></row></sheetData>"#;

    fn book() -> Vec<u8> {
        // el libro lista "Datos" antes que "Resumen" aunque sus partes estén al revés
        xlsx_with(
            &[("Datos", "sheet2.xml", SHEET1), ("Resumen", "sheet1.xml", SHEET2)],
            Some(SST),
        )
    }

    #[test]
    fn extrae_solo_celdas_de_texto_en_orden_del_libro() {
        let segs = XlsxAdapter.extract(&book()).unwrap();
        let got: Vec<(&str, &str)> = segs.iter().map(|s| (s.location(), s.source_text())).collect();

        assert_eq!(
            got,
            vec![
                ("Datos!A1", "Producto"),
                ("Datos!B1", "Precio total"),
                ("Datos!D2", "Nota & aviso"),
                ("Resumen!B7", "Resumen"),
            ]
        );
        assert!(segs.iter().all(|s| s.kind() == SegmentKind::TableCell));
    }

    #[test]
    fn replace_escribe_cadenas_en_linea_y_conserva_el_estilo() {
        let doc = book();
        let segs = XlsxAdapter.extract(&doc).unwrap();
        let tr: Vec<TranslatedSegment> = segs
            .iter()
            .map(|s| TranslatedSegment::new(s.index(), s.source_text().to_uppercase()))
            .collect();
        let out = XlsxAdapter.assemble(&doc, &tr, DisplayMode::Replace).unwrap();

        let xml = read_part(&out, "xl/worksheets/sheet2.xml");
        assert!(xml.contains(
            r#"<c r="B1" s="2" t="inlineStr"><is><t xml:space="preserve">PRECIO TOTAL</t></is></c>"#
        ));
        assert!(xml.contains(r#"<c r="B2" t="str"><f>A2*2</f><v>84</v></c>"#));
        assert!(xml.contains(r#"<c r="A2"><v>42</v></c>"#));
        assert!(xml.contains("NOTA &amp; AVISO"));

        let again = XlsxAdapter.extract(&out).unwrap();
        assert_eq!(again.len(), segs.len());
        assert_eq!(again[3].source_text(), "RESUMEN");
    }

    #[test]
    fn parallel_junta_original_y_traduccion_en_la_celda() {
        let doc = book();
        let segs = XlsxAdapter.extract(&doc).unwrap();
        let tr: Vec<TranslatedSegment> = segs
            .iter()
            .map(|s| TranslatedSegment::new(s.index(), format!("<{}>", s.index())))
            .collect();
        let out = XlsxAdapter.assemble(&doc, &tr, DisplayMode::Parallel).unwrap();

        let again = XlsxAdapter.extract(&out).unwrap();
        assert_eq!(again[0].source_text(), "Producto\n<0>");
        assert_eq!(again[3].source_text(), "Resumen\n<3>");
    }

    #[test]
    fn libro_sin_cadenas_compartidas() {
        let doc = xlsx_with(&[("Hoja1", "sheet1.xml", SHEET2)], None);
        let segs = XlsxAdapter.extract(&doc).unwrap();
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].location(), "Hoja1!B7");
    }
}
