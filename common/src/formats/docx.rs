use std::collections::HashMap;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::Writer;

use crate::error::Result;
use crate::formats::ooxml::{rewrite_paragraphs, scan_paragraphs, write_event, Dialect, HeadingRule, Package};
use crate::formats::{ordered_translations, FormatAdapter};
use crate::segment::{Segment, TranslatedSegment};
use crate::task::{DisplayMode, DocumentKind};

const DOCUMENT_PART: &str = "word/document.xml";

/// Marca de la traducción en modo paralelo: cursiva azul.
const MARKER_COLOR: &str = "1F4E79";

pub struct DocxAdapter;

fn marker_props(w: &mut Writer<Vec<u8>>) -> Result<()> {
    write_event(w, Event::Start(BytesStart::new("w:rPr")))?;
    write_event(w, Event::Empty(BytesStart::new("w:i")))?;
    let mut color = BytesStart::new("w:color");
    color.push_attribute(("w:val", MARKER_COLOR));
    write_event(w, Event::Empty(color))?;
    write_event(w, Event::End(BytesEnd::new("w:rPr")))
}

pub(crate) static WORD: Dialect = Dialect {
    paragraph: "w:p",
    run: "w:r",
    text: "w:t",
    props: b"w:pPr",
    table_cell: b"w:tc",
    list_markers: &[b"w:numPr"],
    skip_in_props: &[b"w:sectPr"],
    heading: HeadingRule::ParagraphStyle {
        element: b"w:pStyle",
        attr: b"w:val",
    },
    preserve_space: true,
    write_marker_props: marker_props,
};

impl FormatAdapter for DocxAdapter {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Docx
    }

    fn extract(&self, source: &[u8]) -> Result<Vec<Segment>> {
        let pkg = Package::read(source)?;
        let xml = pkg.part_str(DOCUMENT_PART)?;

        Ok(scan_paragraphs(&xml, &WORD)?
            .into_iter()
            .enumerate()
            .map(|(i, p)| Segment::new(i, format!("párrafo {}", p.ordinal + 1), p.kind, p.text))
            .collect())
    }

    fn assemble(&self, source: &[u8], translated: &[TranslatedSegment], mode: DisplayMode) -> Result<Vec<u8>> {
        let pkg = Package::read(source)?;
        let xml = pkg.part_str(DOCUMENT_PART)?;
        let paragraphs = scan_paragraphs(&xml, &WORD)?;
        let texts = ordered_translations(paragraphs.len(), translated)?;

        let by_ordinal: HashMap<usize, &str> = paragraphs.iter().map(|p| p.ordinal).zip(texts).collect();
        let rewritten = rewrite_paragraphs(&xml, &WORD, &by_ordinal, mode)?;

        let mut parts = HashMap::new();
        parts.insert(DOCUMENT_PART.to_string(), rewritten);
        pkg.write(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FormatError;
    use crate::formats::testutil::{docx_with_body, read_part};
    use crate::segment::SegmentKind;

    const BODY: &str = r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Informe anual</w:t></w:r></w:p>
<w:p><w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">Hola </w:t></w:r><w:r><w:t>mundo &amp; más</w:t></w:r></w:p>
<w:p/>
<w:p><w:r><w:t>   </w:t></w:r></w:p>
<w:p><w:pPr><w:numPr><w:ilvl w:val="0"/><w:numId w:val="1"/></w:numPr></w:pPr><w:r><w:t>punto</w:t></w:r></w:p>
<w:tbl><w:tr><w:tc><w:p><w:r><w:t>celda</w:t></w:r></w:p></w:tc></w:tr></w:tbl>
<w:sectPr><w:pgSz w:w="11906"/></w:sectPr>"#;

    fn upper(segs: &[Segment]) -> Vec<TranslatedSegment> {
        segs.iter()
            .map(|s| TranslatedSegment::new(s.index(), s.source_text().to_uppercase()))
            .collect()
    }

    #[test]
    fn extrae_parrafos_con_texto_y_su_tipo() {
        let doc = docx_with_body(BODY);
        let segs = DocxAdapter.extract(&doc).unwrap();

        let got: Vec<(&str, SegmentKind, &str)> = segs
            .iter()
            .map(|s| (s.location(), s.kind(), s.source_text()))
            .collect();
        assert_eq!(
            got,
            vec![
                ("párrafo 1", SegmentKind::Heading, "Informe anual"),
                ("párrafo 2", SegmentKind::Body, "Hola mundo & más"),
                ("párrafo 4", SegmentKind::ListItem, "punto"),
                ("párrafo 5", SegmentKind::TableCell, "celda"),
            ]
        );
    }

    #[test]
    fn replace_escribe_en_el_primer_nodo_y_vacia_el_resto() {
        let doc = docx_with_body(BODY);
        let segs = DocxAdapter.extract(&doc).unwrap();
        let out = DocxAdapter.assemble(&doc, &upper(&segs), DisplayMode::Replace).unwrap();

        let xml = read_part(&out, DOCUMENT_PART);
        assert!(xml.contains(r#"<w:t xml:space="preserve">HOLA MUNDO &amp; MÁS</w:t>"#));
        assert!(xml.contains("<w:t></w:t>"));
        assert!(xml.contains("<w:rPr><w:b/></w:rPr>"));
        assert!(!xml.contains("Informe anual"));

        // la salida vuelve a extraer los mismos segmentos, ya traducidos
        let again = DocxAdapter.extract(&out).unwrap();
        assert_eq!(again.len(), segs.len());
        assert_eq!(again[1].source_text(), "HOLA MUNDO & MÁS");
        assert_eq!(again[0].kind(), SegmentKind::Heading);
    }

    #[test]
    fn parallel_anade_parrafo_hermano_con_marca() {
        let doc = docx_with_body(BODY);
        let segs = DocxAdapter.extract(&doc).unwrap();
        let out = DocxAdapter.assemble(&doc, &upper(&segs), DisplayMode::Parallel).unwrap();
        let xml = read_part(&out, DOCUMENT_PART);

        assert!(xml.contains("Informe anual"));
        assert!(xml.contains(
            r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:rPr><w:i/><w:color w:val="1F4E79"/></w:rPr><w:t xml:space="preserve">INFORME ANUAL</w:t></w:r></w:p>"#
        ));
        // el hermano de la celda queda dentro de la celda
        assert!(xml.contains(r#"<w:t>celda</w:t></w:r></w:p><w:p><w:r><w:rPr><w:i/>"#));
        assert!(xml.contains("CELDA</w:t></w:r></w:p></w:tc>"));

        let again = DocxAdapter.extract(&out).unwrap();
        assert_eq!(again.len(), segs.len() * 2);
    }

    #[test]
    fn sectpr_del_parrafo_no_se_duplica() {
        let body = r#"<w:p><w:pPr><w:jc w:val="center"/><w:sectPr><w:pgSz w:w="1"/></w:sectPr></w:pPr><w:r><w:t>fin</w:t></w:r></w:p>"#;
        let doc = docx_with_body(body);
        let out = DocxAdapter
            .assemble(&doc, &[TranslatedSegment::new(0, "end")], DisplayMode::Parallel)
            .unwrap();
        let xml = read_part(&out, DOCUMENT_PART);

        assert_eq!(xml.matches("<w:sectPr>").count(), 1);
        assert_eq!(xml.matches(r#"<w:jc w:val="center"/>"#).count(), 2);
    }

    #[test]
    fn paquete_sin_documento_es_error() {
        let zip = crate::formats::testutil::zip_of(&[("[Content_Types].xml", "<Types/>")]);
        assert!(matches!(DocxAdapter.extract(&zip), Err(FormatError::MissingPart(_))));
        assert!(matches!(DocxAdapter.extract(b"no es un zip"), Err(FormatError::Zip(_))));
    }
}
