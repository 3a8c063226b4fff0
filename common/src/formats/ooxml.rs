//! Piezas compartidas por los formatos OOXML (docx, pptx, xlsx).
//!
//! Un documento Office es un zip de partes XML. Leemos todas las partes en
//! memoria conservando su orden, reescribimos sólo las que llevan texto y
//! copiamos el resto tal cual.
//!
//! Para docx y pptx la unidad traducible es el párrafo (`w:p` / `a:p`). El
//! mismo `ParagraphTracker` recorre el XML al extraer y al reensamblar, así
//! que el ordinal de cada párrafo coincide en las dos pasadas.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{FormatError, Result};
use crate::segment::SegmentKind;
use crate::task::DisplayMode;

/* ---------------- paquete zip ---------------- */

pub(crate) struct Package {
    entries: Vec<(String, Vec<u8>)>,
}

impl Package {
    pub fn read(bytes: &[u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut entries = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let name = file.name().to_string();
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;
            entries.push((name, data));
        }

        Ok(Self { entries })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d.as_slice())
    }

    pub fn part_str(&self, name: &str) -> Result<String> {
        let data = self
            .part(name)
            .ok_or_else(|| FormatError::MissingPart(name.to_string()))?;
        Ok(String::from_utf8(data.to_vec())?)
    }

    /// Serializa el paquete sustituyendo las partes indicadas.
    pub fn write(&self, mut replaced: HashMap<String, Vec<u8>>) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, data) in &self.entries {
            if name.ends_with('/') {
                zip.add_directory(name.as_str(), options)?;
                continue;
            }
            zip.start_file(name.as_str(), options)?;
            match replaced.remove(name) {
                Some(new_data) => zip.write_all(&new_data)?,
                None => zip.write_all(data)?,
            }
        }

        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }
}

/// Resuelve el `Target` de una relación respecto a la carpeta de la parte origen.
pub(crate) fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(abs) = target.strip_prefix('/') {
        return abs.to_string();
    }
    let mut parts: Vec<&str> = base_dir.split('/').filter(|p| !p.is_empty()).collect();
    for piece in target.split('/') {
        match piece {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    parts.join("/")
}

/// Lee una parte `_rels/*.rels` y devuelve `Id -> Target`.
pub(crate) fn parse_relationships(xml: &str) -> Result<HashMap<String, String>> {
    let mut rels = HashMap::new();
    let mut reader = Reader::from_str(xml);

    loop {
        match reader.read_event().map_err(FormatError::xml)? {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (get_attr(&e, b"Id"), get_attr(&e, b"Target")) {
                    rels.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(rels)
}

pub(crate) fn get_attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| {
            a.unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&a.value).into_owned())
        })
}

pub(crate) fn write_event<'a>(writer: &mut Writer<Vec<u8>>, event: Event<'a>) -> Result<()> {
    writer.write_event(event).map_err(FormatError::xml)
}

/* ---------------- párrafos docx / pptx ---------------- */

/// Cómo se reconoce un título en cada formato.
pub(crate) enum HeadingRule {
    /// Estilo de párrafo (`w:pStyle w:val="Heading1"`).
    ParagraphStyle { element: &'static [u8], attr: &'static [u8] },
    /// Placeholder de título en la forma que contiene el párrafo (`p:ph type="title"`).
    TitlePlaceholder { shape: &'static [u8], placeholder: &'static [u8] },
}

/// Nombres de elementos de un dialecto WordprocessingML / DrawingML.
pub(crate) struct Dialect {
    pub paragraph: &'static str,
    pub run: &'static str,
    pub text: &'static str,
    pub props: &'static [u8],
    pub table_cell: &'static [u8],
    pub list_markers: &'static [&'static [u8]],
    /// Hijos de las propiedades de párrafo que no se copian al hermano traducido.
    pub skip_in_props: &'static [&'static [u8]],
    pub heading: HeadingRule,
    /// `w:t` admite `xml:space="preserve"`; `a:t` no.
    pub preserve_space: bool,
    /// Propiedades de la corrida que marca visualmente la traducción en modo paralelo.
    pub write_marker_props: fn(&mut Writer<Vec<u8>>) -> Result<()>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScannedParagraph {
    pub ordinal: usize,
    pub text: String,
    pub kind: SegmentKind,
}

struct OpenParagraph {
    ordinal: usize,
    text: String,
    props: Vec<Event<'static>>,
    heading: bool,
    list: bool,
    in_cell: bool,
    emitted: bool,
}

impl OpenParagraph {
    fn kind(&self) -> SegmentKind {
        if self.in_cell {
            SegmentKind::TableCell
        } else if self.heading {
            SegmentKind::Heading
        } else if self.list {
            SegmentKind::ListItem
        } else {
            SegmentKind::Body
        }
    }
}

enum Step {
    Opened,
    Closed(OpenParagraph),
    TextStart,
    Text(String),
    Other,
}

struct ParagraphTracker<'d> {
    d: &'d Dialect,
    next_ordinal: usize,
    stack: Vec<OpenParagraph>,
    text_depth: usize,
    props_depth: usize,
    skip_depth: usize,
    cell_depth: usize,
    title_shape: bool,
}

impl<'d> ParagraphTracker<'d> {
    fn new(d: &'d Dialect) -> Self {
        Self {
            d,
            next_ordinal: 0,
            stack: Vec::new(),
            text_depth: 0,
            props_depth: 0,
            skip_depth: 0,
            cell_depth: 0,
            title_shape: false,
        }
    }

    fn top(&mut self) -> Option<&mut OpenParagraph> {
        self.stack.last_mut()
    }

    fn is_heading_marker(&self, e: &BytesStart) -> Option<bool> {
        match self.d.heading {
            HeadingRule::ParagraphStyle { element, attr } if self.props_depth > 0 && e.name().as_ref() == element => {
                let val = get_attr(e, attr).unwrap_or_default().to_ascii_lowercase();
                Some(val.starts_with("heading") || val == "title")
            }
            HeadingRule::TitlePlaceholder { placeholder, .. } if e.name().as_ref() == placeholder => {
                let t = get_attr(e, b"type").unwrap_or_default();
                Some(t == "title" || t == "ctrTitle")
            }
            _ => None,
        }
    }

    /// Captura un evento dentro de las propiedades del párrafo abierto.
    fn capture(&mut self, ev: &Event) {
        if self.skip_depth > 0 {
            return;
        }
        if let Some(top) = self.stack.last_mut() {
            top.props.push(ev.clone().into_owned());
        }
    }

    fn observe(&mut self, ev: &Event) -> Result<Step> {
        let d = self.d;
        match ev {
            Event::Start(e) => {
                let name = e.name();
                let name = name.as_ref();

                if self.props_depth > 0 {
                    if self.skip_depth > 0 || d.skip_in_props.contains(&name) {
                        self.skip_depth += 1;
                    }
                    self.props_depth += 1;
                    self.mark_props_child(e);
                    self.capture(ev);
                    return Ok(Step::Other);
                }

                if name == d.paragraph.as_bytes() {
                    let p = OpenParagraph {
                        ordinal: self.next_ordinal,
                        text: String::new(),
                        props: Vec::new(),
                        heading: matches!(d.heading, HeadingRule::TitlePlaceholder { .. }) && self.title_shape,
                        list: false,
                        in_cell: self.cell_depth > 0,
                        emitted: false,
                    };
                    self.next_ordinal += 1;
                    self.stack.push(p);
                    return Ok(Step::Opened);
                }
                if name == d.props && !self.stack.is_empty() {
                    self.props_depth = 1;
                    self.capture(ev);
                    return Ok(Step::Other);
                }
                if name == d.text.as_bytes() && !self.stack.is_empty() {
                    self.text_depth += 1;
                    return Ok(Step::TextStart);
                }
                if name == d.table_cell {
                    self.cell_depth += 1;
                }
                if let HeadingRule::TitlePlaceholder { shape, .. } = d.heading {
                    if name == shape {
                        self.title_shape = false;
                    }
                }
                if let Some(true) = self.is_heading_marker(e) {
                    self.title_shape = true;
                }
                Ok(Step::Other)
            }
            Event::Empty(e) => {
                if self.props_depth > 0 {
                    self.mark_props_child(e);
                    if !d.skip_in_props.contains(&e.name().as_ref()) {
                        self.capture(ev);
                    }
                    return Ok(Step::Other);
                }
                if e.name().as_ref() == d.props && !self.stack.is_empty() {
                    self.capture(ev);
                }
                if let Some(true) = self.is_heading_marker(e) {
                    self.title_shape = true;
                }
                Ok(Step::Other)
            }
            Event::End(e) => {
                let name = e.name();
                let name = name.as_ref();

                if self.props_depth > 0 {
                    self.capture(ev);
                    self.props_depth -= 1;
                    if self.skip_depth > 0 {
                        self.skip_depth -= 1;
                    }
                    return Ok(Step::Other);
                }
                if name == d.paragraph.as_bytes() {
                    return match self.stack.pop() {
                        Some(p) => Ok(Step::Closed(p)),
                        None => Err(FormatError::Malformed(format!("cierre {} sin apertura", d.paragraph))),
                    };
                }
                if name == d.text.as_bytes() && self.text_depth > 0 {
                    self.text_depth -= 1;
                }
                if name == d.table_cell && self.cell_depth > 0 {
                    self.cell_depth -= 1;
                }
                if let HeadingRule::TitlePlaceholder { shape, .. } = d.heading {
                    if name == shape {
                        self.title_shape = false;
                    }
                }
                Ok(Step::Other)
            }
            Event::Text(t) if self.text_depth > 0 && !self.stack.is_empty() => {
                let text = t.unescape().map_err(FormatError::xml)?.into_owned();
                if let Some(top) = self.top() {
                    top.text.push_str(&text);
                }
                Ok(Step::Text(text))
            }
            _ => {
                if self.props_depth > 0 {
                    self.capture(ev);
                }
                Ok(Step::Other)
            }
        }
    }

    fn mark_props_child(&mut self, e: &BytesStart) {
        let name = e.name();
        let is_list = self.d.list_markers.contains(&name.as_ref());
        let heading = matches!(self.d.heading, HeadingRule::ParagraphStyle { .. })
            .then(|| self.is_heading_marker(e))
            .flatten()
            .unwrap_or(false);
        if let Some(top) = self.top() {
            top.list |= is_list;
            top.heading |= heading;
        }
    }
}

/// Recorre una parte XML y devuelve los párrafos con texto visible, en orden
/// de apertura.
pub(crate) fn scan_paragraphs(xml: &str, dialect: &Dialect) -> Result<Vec<ScannedParagraph>> {
    let mut reader = Reader::from_str(xml);
    let mut tracker = ParagraphTracker::new(dialect);
    let mut out = Vec::new();

    loop {
        let ev = reader.read_event().map_err(FormatError::xml)?;
        if matches!(ev, Event::Eof) {
            break;
        }
        if let Step::Closed(p) = tracker.observe(&ev)? {
            if !p.text.trim().is_empty() {
                out.push(ScannedParagraph {
                    ordinal: p.ordinal,
                    kind: p.kind(),
                    text: p.text,
                });
            }
        }
    }

    // Los párrafos anidados (cuadros de texto) cierran antes que su contenedor.
    out.sort_by_key(|p| p.ordinal);
    Ok(out)
}

/// Reescribe una parte XML con las traducciones indicadas por ordinal de párrafo.
pub(crate) fn rewrite_paragraphs(
    xml: &str,
    dialect: &Dialect,
    translations: &HashMap<usize, &str>,
    mode: DisplayMode,
) -> Result<Vec<u8>> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let mut tracker = ParagraphTracker::new(dialect);

    loop {
        let ev = reader.read_event().map_err(FormatError::xml)?;
        if matches!(ev, Event::Eof) {
            break;
        }

        let target = tracker
            .stack
            .last()
            .and_then(|p| translations.get(&p.ordinal).copied());

        match tracker.observe(&ev)? {
            Step::Text(_) if mode == DisplayMode::Replace => {
                // sólo el primer nodo de texto del párrafo recibe la traducción
                let top = tracker.top();
                match (target, top) {
                    (Some(translated), Some(top)) => {
                        if !top.emitted {
                            top.emitted = true;
                            write_event(&mut writer, Event::Text(BytesText::new(translated)))?;
                        }
                    }
                    _ => write_event(&mut writer, ev)?,
                }
            }
            Step::TextStart if mode == DisplayMode::Replace && dialect.preserve_space && target.is_some() => {
                if let Event::Start(e) = ev {
                    let mut start = e.into_owned();
                    if get_attr(&start, b"xml:space").is_none() {
                        start.push_attribute(("xml:space", "preserve"));
                    }
                    write_event(&mut writer, Event::Start(start))?;
                }
            }
            Step::Closed(p) => {
                write_event(&mut writer, ev)?;
                if mode == DisplayMode::Parallel {
                    if let Some(translated) = translations.get(&p.ordinal) {
                        write_sibling(&mut writer, dialect, &p.props, translated)?;
                    }
                }
            }
            Step::Opened | Step::TextStart | Step::Text(_) | Step::Other => write_event(&mut writer, ev)?,
        }
    }

    Ok(writer.into_inner())
}

/// Párrafo nuevo con las propiedades del original y una única corrida marcada.
fn write_sibling(writer: &mut Writer<Vec<u8>>, d: &Dialect, props: &[Event<'static>], text: &str) -> Result<()> {
    write_event(writer, Event::Start(BytesStart::new(d.paragraph)))?;
    for ev in props {
        write_event(writer, ev.clone())?;
    }
    write_event(writer, Event::Start(BytesStart::new(d.run)))?;
    (d.write_marker_props)(writer)?;

    let mut t = BytesStart::new(d.text);
    if d.preserve_space {
        t.push_attribute(("xml:space", "preserve"));
    }
    write_event(writer, Event::Start(t))?;
    write_event(writer, Event::Text(BytesText::new(text)))?;
    write_event(writer, Event::End(BytesEnd::new(d.text)))?;

    write_event(writer, Event::End(BytesEnd::new(d.run)))?;
    write_event(writer, Event::End(BytesEnd::new(d.paragraph)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_target_relativo_y_absoluto() {
        assert_eq!(resolve_target("xl", "worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(resolve_target("xl", "/xl/worksheets/sheet2.xml"), "xl/worksheets/sheet2.xml");
        assert_eq!(resolve_target("ppt/slides", "../media/a.png"), "ppt/media/a.png");
    }

    #[test]
    fn parse_relationships_lee_ids() {
        let xml = r#"<?xml version="1.0"?><Relationships xmlns="x">
            <Relationship Id="rId1" Type="t" Target="worksheets/sheet1.xml"/>
            <Relationship Id="rId2" Type="t" Target="styles.xml"/>
        </Relationships>"#;
        let rels = parse_relationships(xml).unwrap();
        assert_eq!(rels.get("rId1").map(String::as_str), Some("worksheets/sheet1.xml"));
        assert_eq!(rels.len(), 2);
    }

    #[test]
    fn package_reescribe_solo_las_partes_indicadas() {
        let bytes = crate::formats::testutil::zip_of(&[("a.xml", "<a/>"), ("b.xml", "<b/>")]);
        let pkg = Package::read(&bytes).unwrap();

        let mut repl = HashMap::new();
        repl.insert("b.xml".to_string(), b"<b>x</b>".to_vec());
        let out = Package::read(&pkg.write(repl).unwrap()).unwrap();

        assert_eq!(out.names().collect::<Vec<_>>(), vec!["a.xml", "b.xml"]);
        assert_eq!(out.part_str("a.xml").unwrap(), "<a/>");
        assert_eq!(out.part_str("b.xml").unwrap(), "<b>x</b>");
        assert!(matches!(out.part_str("c.xml"), Err(FormatError::MissingPart(_))));
    }
}
