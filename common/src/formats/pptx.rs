use std::collections::HashMap;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::Writer;

use crate::error::Result;
use crate::formats::ooxml::{
    rewrite_paragraphs, scan_paragraphs, write_event, Dialect, HeadingRule, Package, ScannedParagraph,
};
use crate::formats::{ordered_translations, FormatAdapter};
use crate::segment::{Segment, TranslatedSegment};
use crate::task::{DisplayMode, DocumentKind};

const MARKER_COLOR: &str = "1F4E79";

pub struct PptxAdapter;

fn marker_props(w: &mut Writer<Vec<u8>>) -> Result<()> {
    let mut rpr = BytesStart::new("a:rPr");
    rpr.push_attribute(("i", "1"));
    write_event(w, Event::Start(rpr))?;
    write_event(w, Event::Start(BytesStart::new("a:solidFill")))?;
    let mut clr = BytesStart::new("a:srgbClr");
    clr.push_attribute(("val", MARKER_COLOR));
    write_event(w, Event::Empty(clr))?;
    write_event(w, Event::End(BytesEnd::new("a:solidFill")))?;
    write_event(w, Event::End(BytesEnd::new("a:rPr")))
}

pub(crate) static DRAWING: Dialect = Dialect {
    paragraph: "a:p",
    run: "a:r",
    text: "a:t",
    props: b"a:pPr",
    table_cell: b"a:tc",
    list_markers: &[b"a:buChar", b"a:buAutoNum"],
    skip_in_props: &[],
    heading: HeadingRule::TitlePlaceholder {
        shape: b"p:sp",
        placeholder: b"p:ph",
    },
    preserve_space: false,
    write_marker_props: marker_props,
};

/// `ppt/slides/slide12.xml` → 12
fn slide_number(name: &str) -> Option<u32> {
    name.strip_prefix("ppt/slides/slide")?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}

/// Diapositivas en orden numérico: `(número, parte)`.
fn slides(pkg: &Package) -> Vec<(u32, String)> {
    let mut out: Vec<(u32, String)> = pkg
        .names()
        .filter_map(|n| slide_number(n).map(|k| (k, n.to_string())))
        .collect();
    out.sort_by_key(|(k, _)| *k);
    out
}

struct SlideScan {
    number: u32,
    part: String,
    xml: String,
    paragraphs: Vec<ScannedParagraph>,
}

fn scan(pkg: &Package) -> Result<Vec<SlideScan>> {
    slides(pkg)
        .into_iter()
        .map(|(number, part)| {
            let xml = pkg.part_str(&part)?;
            let paragraphs = scan_paragraphs(&xml, &DRAWING)?;
            Ok(SlideScan {
                number,
                part,
                xml,
                paragraphs,
            })
        })
        .collect()
}

impl FormatAdapter for PptxAdapter {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Pptx
    }

    fn extract(&self, source: &[u8]) -> Result<Vec<Segment>> {
        let pkg = Package::read(source)?;
        let mut segments = Vec::new();

        for slide in scan(&pkg)? {
            for p in slide.paragraphs {
                let loc = format!("diapositiva {} / párrafo {}", slide.number, p.ordinal + 1);
                segments.push(Segment::new(segments.len(), loc, p.kind, p.text));
            }
        }

        Ok(segments)
    }

    fn assemble(&self, source: &[u8], translated: &[TranslatedSegment], mode: DisplayMode) -> Result<Vec<u8>> {
        let pkg = Package::read(source)?;
        let scans = scan(&pkg)?;
        let total = scans.iter().map(|s| s.paragraphs.len()).sum();
        let texts = ordered_translations(total, translated)?;

        let mut next = texts.into_iter();
        let mut parts = HashMap::new();

        for slide in &scans {
            if slide.paragraphs.is_empty() {
                continue;
            }
            let by_ordinal: HashMap<usize, &str> = slide
                .paragraphs
                .iter()
                .map(|p| (p.ordinal, next.next().unwrap_or_default()))
                .collect();
            let rewritten = rewrite_paragraphs(&slide.xml, &DRAWING, &by_ordinal, mode)?;
            parts.insert(slide.part.clone(), rewritten);
        }

        pkg.write(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::testutil::{pptx_with_slides, read_part};
    use crate::segment::SegmentKind;

    const TITLE_SHAPE: &str = r#"<p:sp><p:nvSpPr><p:cNvPr id="2" name="Title"/><p:cNvSpPr/><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr><p:txBody><a:bodyPr/><a:p><a:r><a:rPr lang="es-ES"/><a:t>Resultados</a:t></a:r></a:p></p:txBody></p:sp>"#;
    const BODY_SHAPE: &str = r#"<p:sp><p:nvSpPr><p:cNvPr id="3" name="Body"/><p:cNvSpPr/><p:nvPr><p:ph idx="1"/></p:nvPr></p:nvSpPr><p:txBody><a:bodyPr/><a:p><a:pPr lvl="1"><a:buChar char="•"/></a:pPr><a:r><a:t>Ventas</a:t></a:r><a:r><a:t> suben</a:t></a:r></a:p><a:p><a:endParaRPr/></a:p></p:txBody></p:sp>"#;
    const TABLE: &str = r#"<p:graphicFrame><a:graphic><a:graphicData><a:tbl><a:tr><a:tc><a:txBody><a:p><a:r><a:t>Q1</a:t></a:r></a:p></a:txBody></a:tc></a:tr></a:tbl></a:graphicData></a:graphic></p:graphicFrame>"#;

    fn deck() -> Vec<u8> {
        let s1 = format!("{TITLE_SHAPE}{BODY_SHAPE}");
        let s2 = TABLE.to_string();
        let s10 = r#"<p:sp><p:txBody><a:p><a:r><a:t>Gracias</a:t></a:r></a:p></p:txBody></p:sp>"#.to_string();
        // desordenadas a propósito en el zip
        pptx_with_slides(&[(10, s10), (1, s1), (2, s2)])
    }

    #[test]
    fn extrae_en_orden_numerico_de_diapositiva() {
        let segs = PptxAdapter.extract(&deck()).unwrap();
        let got: Vec<(&str, SegmentKind, &str)> = segs
            .iter()
            .map(|s| (s.location(), s.kind(), s.source_text()))
            .collect();

        assert_eq!(
            got,
            vec![
                ("diapositiva 1 / párrafo 1", SegmentKind::Heading, "Resultados"),
                ("diapositiva 1 / párrafo 2", SegmentKind::ListItem, "Ventas suben"),
                ("diapositiva 2 / párrafo 1", SegmentKind::TableCell, "Q1"),
                ("diapositiva 10 / párrafo 1", SegmentKind::Body, "Gracias"),
            ]
        );
    }

    #[test]
    fn replace_traduce_cada_diapositiva() {
        let doc = deck();
        let segs = PptxAdapter.extract(&doc).unwrap();
        let tr: Vec<TranslatedSegment> = segs
            .iter()
            .map(|s| TranslatedSegment::new(s.index(), format!("[{}]", s.source_text())))
            .collect();
        let out = PptxAdapter.assemble(&doc, &tr, DisplayMode::Replace).unwrap();

        let s1 = read_part(&out, "ppt/slides/slide1.xml");
        assert!(s1.contains(r#"<a:rPr lang="es-ES"/><a:t>[Resultados]</a:t>"#));
        assert!(s1.contains("<a:t>[Ventas suben]</a:t></a:r><a:r><a:t></a:t>"));
        assert!(read_part(&out, "ppt/slides/slide10.xml").contains("[Gracias]"));

        let again = PptxAdapter.extract(&out).unwrap();
        assert_eq!(again.len(), segs.len());
    }

    #[test]
    fn parallel_copia_ppr_y_marca_la_corrida() {
        let doc = deck();
        let segs = PptxAdapter.extract(&doc).unwrap();
        let tr: Vec<TranslatedSegment> = segs
            .iter()
            .map(|s| TranslatedSegment::new(s.index(), s.source_text().to_uppercase()))
            .collect();
        let out = PptxAdapter.assemble(&doc, &tr, DisplayMode::Parallel).unwrap();

        let s1 = read_part(&out, "ppt/slides/slide1.xml");
        assert!(s1.contains(
            r#"<a:p><a:pPr lvl="1"><a:buChar char="•"/></a:pPr><a:r><a:rPr i="1"><a:solidFill><a:srgbClr val="1F4E79"/></a:solidFill></a:rPr><a:t>VENTAS SUBEN</a:t></a:r></a:p>"#
        ));
        assert!(s1.contains("<a:t>Resultados</a:t>"));

        let again = PptxAdapter.extract(&out).unwrap();
        assert_eq!(again.len(), segs.len() * 2);
        assert_eq!(again[1].kind(), SegmentKind::Heading);
    }

    #[test]
    fn slide_number_ignora_otras_partes() {
        assert_eq!(slide_number("ppt/slides/slide3.xml"), Some(3));
        assert_eq!(slide_number("ppt/slides/_rels/slide3.xml.rels"), None);
        assert_eq!(slide_number("ppt/slideLayouts/slideLayout1.xml"), None);
    }
}
