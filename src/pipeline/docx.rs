//! Word template filling.
//!
//! A `.docx` is a zip archive; the body lives in `word/document.xml`. The
//! template carries `{NAME}` tokens inside text runs. Each token is replaced
//! with its value in one left-to-right pass, so a value that itself looks
//! like a token is left alone. A paragraph whose text holds an image token
//! is emptied (paragraph properties kept) and receives the picture instead.
//!
//! Every other archive entry is copied through untouched.

use std::borrow::Cow;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use quick_xml::escape::escape;
use quick_xml::events::{BytesRef, Event};
use quick_xml::{Reader, Writer};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::conversation::ReportData;
use crate::error::TemplateError;

const DOCUMENT: &str = "word/document.xml";
const RELS: &str = "word/_rels/document.xml.rels";
const CONTENT_TYPES: &str = "[Content_Types].xml";

const IMAGE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const EMPTY_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#;

/// Embedded picture size in EMU (15 cm x 10.5 cm).
pub const IMAGE_WIDTH_EMU: u64 = 5_670_000;
pub const IMAGE_HEIGHT_EMU: u64 = 3_780_000;

pub const CHART_TOKEN: &str = "{GRAFICA}";
pub const PHOTO_TOKEN: &str = "{FOTO_MONTAJE}";

/// An image to place at the paragraph holding `token`.
#[derive(Debug, Clone)]
pub struct ImageSlot {
    pub token: String,
    pub path: PathBuf,
}

/// What a fill actually changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FillSummary {
    pub fields_replaced: usize,
    pub images_embedded: usize,
}

/// Token/value pairs for a report.
pub fn report_fields(data: &ReportData) -> Vec<(&'static str, String)> {
    vec![
        ("{TITULO}", data.title.clone()),
        ("{GRUPO}", data.group.clone()),
        ("{INTEGRANTES}", data.members.clone()),
        ("{FECHA}", data.date.format("%d/%m/%Y").to_string()),
        ("{RESUMEN}", data.summary.clone()),
        ("{INTRODUCCION}", data.introduction.clone()),
        ("{OBJETIVOS}", data.objectives.clone()),
        ("{MARCO}", data.framework.clone()),
        ("{MET_INTRO}", data.methodology_intro.clone()),
        ("{MATERIALES}", data.materials.clone()),
        ("{MONTAJE}", data.setup.clone()),
        ("{PROCEDIMIENTO}", data.procedure.clone()),
        ("{RESULTADOS}", data.analysis.clone()),
        ("{CONCLUSIONES}", data.conclusions.clone()),
        ("{REFERENCIAS}", data.references.clone()),
    ]
}

/// Image slots for whatever chart and photo the report has.
pub fn report_images(data: &ReportData) -> Vec<ImageSlot> {
    let mut slots = Vec::new();
    if let Some(path) = &data.chart_path {
        slots.push(ImageSlot {
            token: CHART_TOKEN.to_string(),
            path: path.clone(),
        });
    }
    if let Some(path) = &data.photo_path {
        slots.push(ImageSlot {
            token: PHOTO_TOKEN.to_string(),
            path: path.clone(),
        });
    }
    slots
}

/// Fill `template` into a new document at `dest`.
///
/// Images are best-effort: one that cannot be read, or whose token appears
/// in no paragraph, is skipped.
pub fn fill_template(
    template: &Path,
    dest: &Path,
    fields: &[(&str, String)],
    images: &[ImageSlot],
) -> Result<FillSummary, TemplateError> {
    let mut archive = ZipArchive::new(File::open(template)?).map_err(archive_err)?;

    let document = read_entry(&mut archive, DOCUMENT)?
        .ok_or_else(|| TemplateError::Invalid(format!("{DOCUMENT} is missing")))?;
    let rels = read_entry(&mut archive, RELS)?;
    let content_types = read_entry(&mut archive, CONTENT_TYPES)?
        .ok_or_else(|| TemplateError::Invalid(format!("{CONTENT_TYPES} is missing")))?;

    let loaded = load_images(images);
    let rewritten = rewrite_document(&document, fields, &loaded)?;

    let embedded: Vec<&LoadedImage> = rewritten.embedded.iter().map(|&i| &loaded[i]).collect();
    for img in &loaded {
        if !rewritten.embedded.contains(&img.index) {
            tracing::warn!(token = %img.token, "No paragraph holds image token, skipping");
        }
    }

    let (new_rels, new_types) = if embedded.is_empty() {
        (None, None)
    } else {
        (
            Some(add_relationships(rels.as_deref(), &embedded)?),
            Some(add_content_types(&content_types, &embedded)?),
        )
    };

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(File::create(dest)?);
    let mut rels_written = false;

    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i).map_err(archive_err)?;
        let name = entry.name().to_string();

        let replacement = match name.as_str() {
            DOCUMENT => Some(rewritten.xml.as_slice()),
            RELS => new_rels.as_deref().map(str::as_bytes),
            CONTENT_TYPES => new_types.as_deref().map(str::as_bytes),
            _ => None,
        };
        match replacement {
            Some(bytes) => {
                drop(entry);
                write_entry(&mut zip, &name, bytes, options)?;
                rels_written |= name == RELS;
            }
            None => zip.raw_copy_file(entry).map_err(archive_err)?,
        }
    }

    if let Some(rels) = new_rels.as_deref().filter(|_| !rels_written) {
        write_entry(&mut zip, RELS, rels.as_bytes(), options)?;
    }
    for img in &embedded {
        write_entry(&mut zip, &format!("word/media/{}", img.file_name), &img.bytes, options)?;
    }
    zip.finish().map_err(archive_err)?;

    Ok(FillSummary {
        fields_replaced: rewritten.fields_replaced,
        images_embedded: embedded.len(),
    })
}

fn archive_err(e: ZipError) -> TemplateError {
    TemplateError::Archive(e.to_string())
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, TemplateError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(archive_err(e)),
    };
    let mut contents = String::new();
    entry.read_to_string(&mut contents)?;
    Ok(Some(contents))
}

fn write_entry<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    name: &str,
    bytes: &[u8],
    options: SimpleFileOptions,
) -> Result<(), TemplateError> {
    zip.start_file(name, options).map_err(archive_err)?;
    zip.write_all(bytes)?;
    Ok(())
}

// ── Images ──────────────────────────────────────────────────────────

struct LoadedImage {
    index: usize,
    token: String,
    bytes: Vec<u8>,
    extension: &'static str,
    content_type: &'static str,
    file_name: String,
    rel_id: String,
    drawing_id: usize,
}

fn image_kind(path: &Path) -> Option<(&'static str, &'static str)> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some(("png", "image/png")),
        "jpg" | "jpeg" => Some(("jpeg", "image/jpeg")),
        "gif" => Some(("gif", "image/gif")),
        _ => None,
    }
}

fn load_images(slots: &[ImageSlot]) -> Vec<LoadedImage> {
    let mut loaded = Vec::new();
    for slot in slots {
        let Some((extension, content_type)) = image_kind(&slot.path) else {
            tracing::warn!(path = %slot.path.display(), "Unsupported image type, skipping");
            continue;
        };
        let bytes = match std::fs::read(&slot.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %slot.path.display(), error = %e, "Image unreadable, skipping");
                continue;
            }
        };
        let n = loaded.len() + 1;
        loaded.push(LoadedImage {
            index: loaded.len(),
            token: slot.token.clone(),
            bytes,
            extension,
            content_type,
            file_name: format!("report_image{n}.{extension}"),
            rel_id: format!("rIdReportImage{n}"),
            drawing_id: 9000 + n,
        });
    }
    loaded
}

fn drawing_run(img: &LoadedImage) -> String {
    format!(
        concat!(
            r#"<w:r><w:drawing xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" "#,
            r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
            r#"<wp:inline distT="0" distB="0" distL="0" distR="0">"#,
            r#"<wp:extent cx="{cx}" cy="{cy}"/><wp:effectExtent l="0" t="0" r="0" b="0"/>"#,
            r#"<wp:docPr id="{id}" name="Imagen {id}"/>"#,
            r#"<wp:cNvGraphicFramePr><a:graphicFrameLocks xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" noChangeAspect="1"/></wp:cNvGraphicFramePr>"#,
            r#"<a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">"#,
            r#"<a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:nvPicPr><pic:cNvPr id="0" name="{name}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
            r#"<pic:blipFill><a:blip r:embed="{rel}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
            r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
            r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
            r#"</pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r>"#,
        ),
        cx = IMAGE_WIDTH_EMU,
        cy = IMAGE_HEIGHT_EMU,
        id = img.drawing_id,
        name = img.file_name,
        rel = img.rel_id,
    )
}

fn add_relationships(rels: Option<&str>, images: &[&LoadedImage]) -> Result<String, TemplateError> {
    let mut rels = rels.unwrap_or(EMPTY_RELS).to_string();
    let close = rels
        .rfind("</Relationships>")
        .ok_or_else(|| TemplateError::Invalid("relationships part is not closed".into()))?;
    let entries: String = images
        .iter()
        .map(|img| {
            format!(
                r#"<Relationship Id="{}" Type="{IMAGE_REL_TYPE}" Target="media/{}"/>"#,
                img.rel_id, img.file_name
            )
        })
        .collect();
    rels.insert_str(close, &entries);
    Ok(rels)
}

fn add_content_types(types: &str, images: &[&LoadedImage]) -> Result<String, TemplateError> {
    let mut types = types.to_string();
    for img in images {
        let declared = format!(r#"extension="{}""#, img.extension);
        if types.to_ascii_lowercase().contains(&declared) {
            continue;
        }
        let close = types
            .rfind("</Types>")
            .ok_or_else(|| TemplateError::Invalid("content types part is not closed".into()))?;
        types.insert_str(
            close,
            &format!(
                r#"<Default Extension="{}" ContentType="{}"/>"#,
                img.extension, img.content_type
            ),
        );
    }
    Ok(types)
}

// ── Document body ───────────────────────────────────────────────────

#[derive(Default)]
struct Rewritten {
    xml: Vec<u8>,
    fields_replaced: usize,
    /// Indices of images that found their paragraph.
    embedded: Vec<usize>,
}

/// One `<w:t>` element inside a buffered paragraph.
struct TextRun {
    start: usize,
    end: usize,
    text: String,
    replacement: Option<String>,
}

enum Mark {
    OpenParagraph,
    CloseParagraph,
    Eof,
    Other,
}

fn rewrite_document(
    xml: &str,
    fields: &[(&str, String)],
    images: &[LoadedImage],
) -> Result<Rewritten, TemplateError> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut out = Rewritten::default();

    let mut paragraph: Vec<Event<'static>> = Vec::new();
    let mut depth = 0usize;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| TemplateError::Xml(format!("{DOCUMENT}: {e}")))?
            .into_owned();

        let mark = match &event {
            Event::Start(e) if e.name().as_ref() == b"w:p" => Mark::OpenParagraph,
            Event::End(e) if e.name().as_ref() == b"w:p" => Mark::CloseParagraph,
            Event::Eof => Mark::Eof,
            _ => Mark::Other,
        };

        match mark {
            Mark::Eof => break,
            Mark::OpenParagraph => {
                depth += 1;
                paragraph.push(event);
            }
            Mark::CloseParagraph if depth > 0 => {
                depth -= 1;
                paragraph.push(event);
                if depth == 0 {
                    let events = std::mem::take(&mut paragraph);
                    flush_paragraph(&mut writer, events, fields, images, &mut out)?;
                }
            }
            _ if depth > 0 => paragraph.push(event),
            _ => write_event(&mut writer, event)?,
        }
    }

    out.xml = writer.into_inner();
    Ok(out)
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), TemplateError> {
    writer
        .write_event(event)
        .map_err(|e| TemplateError::Xml(e.to_string()))
}

fn flush_paragraph(
    writer: &mut Writer<Vec<u8>>,
    events: Vec<Event<'static>>,
    fields: &[(&str, String)],
    images: &[LoadedImage],
    out: &mut Rewritten,
) -> Result<(), TemplateError> {
    let mut runs = collect_runs(&events);
    let full_text: String = runs.iter().map(|r| r.text.as_str()).collect();

    let hits: Vec<&LoadedImage> = images
        .iter()
        .filter(|img| !out.embedded.contains(&img.index) && full_text.contains(&img.token))
        .collect();
    if !hits.is_empty() {
        for img in &hits {
            out.embedded.push(img.index);
        }
        return write_image_paragraph(writer, events, &hits);
    }

    // Substitute run by run. If a token only shows up once the runs are
    // joined (Word split it across runs), put the whole paragraph's text in
    // the first run and empty the rest.
    let mut per_run_hits = 0;
    let per_run: Vec<String> = runs
        .iter()
        .map(|run| {
            let (text, hits) = substitute(&run.text, fields);
            per_run_hits += hits;
            text
        })
        .collect();
    let (joined, joined_hits) = substitute(&full_text, fields);

    if joined_hits > per_run_hits {
        for (i, run) in runs.iter_mut().enumerate() {
            let text = if i == 0 { joined.clone() } else { String::new() };
            run.replacement = Some(text);
        }
        out.fields_replaced += joined_hits;
    } else {
        for (run, text) in runs.iter_mut().zip(per_run) {
            if text != run.text {
                run.replacement = Some(text);
            }
        }
        out.fields_replaced += per_run_hits;
    }

    let mut next_run = runs.iter().filter(|r| r.replacement.is_some()).peekable();
    let mut skip_until = None;
    for (i, event) in events.into_iter().enumerate() {
        if let Some(end) = skip_until {
            if i <= end {
                continue;
            }
            skip_until = None;
        }
        match next_run.peek() {
            Some(run) if run.start == i => {
                if let Some(text) = &run.replacement {
                    writer.get_mut().extend_from_slice(text_element(text).as_bytes());
                }
                skip_until = Some(run.end);
                next_run.next();
            }
            _ => write_event(writer, event)?,
        }
    }
    Ok(())
}

fn collect_runs(events: &[Event<'_>]) -> Vec<TextRun> {
    let mut runs = Vec::new();
    let mut open: Option<(usize, String)> = None;

    for (i, event) in events.iter().enumerate() {
        match event {
            Event::Start(e) if e.name().as_ref() == b"w:t" => open = Some((i, String::new())),
            Event::Text(t) => {
                if let Some((_, text)) = open.as_mut() {
                    text.push_str(&String::from_utf8_lossy(t));
                }
            }
            Event::GeneralRef(r) => {
                if let Some((_, text)) = open.as_mut() {
                    if let Some(c) = resolve_reference(r) {
                        text.push(c);
                    }
                }
            }
            Event::End(e) if e.name().as_ref() == b"w:t" => {
                if let Some((start, text)) = open.take() {
                    runs.push(TextRun {
                        start,
                        end: i,
                        text,
                        replacement: None,
                    });
                }
            }
            _ => {}
        }
    }
    runs
}

fn resolve_reference(r: &BytesRef<'_>) -> Option<char> {
    let name = std::str::from_utf8(r).ok()?;
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Keep the paragraph's properties, drop its content, add the pictures.
fn write_image_paragraph(
    writer: &mut Writer<Vec<u8>>,
    events: Vec<Event<'static>>,
    images: &[&LoadedImage],
) -> Result<(), TemplateError> {
    let last = events.len().saturating_sub(1);
    let mut in_props = false;

    for (i, event) in events.into_iter().enumerate() {
        if i == last {
            for img in images {
                writer.get_mut().extend_from_slice(drawing_run(img).as_bytes());
            }
            write_event(writer, event)?;
            continue;
        }
        let keep = match &event {
            _ if i == 0 => true,
            Event::Empty(e) if e.name().as_ref() == b"w:pPr" => true,
            Event::Start(e) if e.name().as_ref() == b"w:pPr" => {
                in_props = true;
                true
            }
            Event::End(e) if e.name().as_ref() == b"w:pPr" => {
                in_props = false;
                true
            }
            _ => in_props,
        };
        if keep {
            write_event(writer, event)?;
        }
    }
    Ok(())
}

/// A `<w:t>` holding `text`, with line breaks as `<w:br/>`.
fn text_element(text: &str) -> String {
    let mut xml = String::from(r#"<w:t xml:space="preserve">"#);
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            xml.push_str(r#"</w:t><w:br/><w:t xml:space="preserve">"#);
        }
        let line: Cow<'_, str> = escape(line.trim_end_matches('\r'));
        xml.push_str(&line);
    }
    xml.push_str("</w:t>");
    xml
}

/// Replace every `{TOKEN}` in one left-to-right pass. Returns the new text
/// and the number of replacements.
fn substitute(text: &str, fields: &[(&str, String)]) -> (String, usize) {
    let mut out = String::with_capacity(text.len());
    let mut count = 0;
    let mut rest = text;

    while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match fields.iter().find(|(token, _)| tail.starts_with(token)) {
            Some((token, value)) => {
                out.push_str(value);
                rest = &tail[token.len()..];
                count += 1;
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    (out, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#;
    const RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="styles" Target="styles.xml"/></Relationships>"#;

    fn body(paragraphs: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{paragraphs}</w:body></w:document>"#
        )
    }

    fn build_template(dir: &Path, document: &str) -> PathBuf {
        let path = dir.join("plantilla.docx");
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        let options = SimpleFileOptions::default();
        for (name, contents) in [
            (CONTENT_TYPES, TYPES),
            (RELS, RELS_XML),
            (DOCUMENT, document),
            ("word/styles.xml", "<w:styles/>"),
        ] {
            zip.start_file(name, options).unwrap();
            zip.write_all(contents.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
        path
    }

    fn read_output(path: &Path, name: &str) -> Option<String> {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        read_entry(&mut archive, name).unwrap()
    }

    fn fields() -> Vec<(&'static str, String)> {
        vec![
            ("{TITULO}", "Ley de Ohm".to_string()),
            ("{GRUPO}", "G3".to_string()),
        ]
    }

    #[test]
    fn substitute_is_single_pass() {
        let fields = vec![("{A}", "{B}".to_string()), ("{B}", "b".to_string())];
        assert_eq!(substitute("x{A}y{B}", &fields), ("x{B}yb".to_string(), 2));
        assert_eq!(substitute("{ {C} {", &fields), ("{ {C} {".to_string(), 0));
    }

    #[test]
    fn fills_tokens_and_copies_other_entries() {
        let dir = tempfile::tempdir().unwrap();
        let template = build_template(
            dir.path(),
            &body(r#"<w:p><w:r><w:t>Título: {TITULO}</w:t></w:r></w:p><w:p><w:r><w:t>{GRUPO}</w:t></w:r></w:p>"#),
        );
        let dest = dir.path().join("out.docx");

        let summary = fill_template(&template, &dest, &fields(), &[]).unwrap();
        assert_eq!(summary.fields_replaced, 2);
        assert_eq!(summary.images_embedded, 0);

        let doc = read_output(&dest, DOCUMENT).unwrap();
        assert!(doc.contains("Título: Ley de Ohm"));
        assert!(doc.contains(">G3<"));
        assert!(!doc.contains("{TITULO}"));
        assert_eq!(read_output(&dest, "word/styles.xml").unwrap(), "<w:styles/>");
        assert_eq!(read_output(&dest, RELS).unwrap(), RELS_XML);
    }

    #[test]
    fn values_are_escaped_and_keep_line_breaks() {
        let dir = tempfile::tempdir().unwrap();
        let template = build_template(
            dir.path(),
            &body(r#"<w:p><w:r><w:t>{TITULO}</w:t></w:r></w:p>"#),
        );
        let dest = dir.path().join("out.docx");
        let fields = vec![("{TITULO}", "R & <C>\nlínea 2".to_string())];

        fill_template(&template, &dest, &fields, &[]).unwrap();
        let doc = read_output(&dest, DOCUMENT).unwrap();
        assert!(doc.contains("R &amp; &lt;C&gt;"));
        assert!(doc.contains("<w:br/>"));
        assert!(doc.contains("línea 2"));
    }

    #[test]
    fn token_split_across_runs_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let template = build_template(
            dir.path(),
            &body(r#"<w:p><w:r><w:t>{TIT</w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>ULO}</w:t></w:r></w:p>"#),
        );
        let dest = dir.path().join("out.docx");

        let summary = fill_template(&template, &dest, &fields(), &[]).unwrap();
        assert_eq!(summary.fields_replaced, 1);
        let doc = read_output(&dest, DOCUMENT).unwrap();
        assert!(doc.contains("Ley de Ohm"));
        assert!(!doc.contains("ULO}"));
    }

    #[test]
    fn escaped_template_text_survives() {
        let dir = tempfile::tempdir().unwrap();
        let template = build_template(
            dir.path(),
            &body(r#"<w:p><w:r><w:t>A &amp; B {GRUPO}</w:t></w:r></w:p>"#),
        );
        let dest = dir.path().join("out.docx");

        fill_template(&template, &dest, &fields(), &[]).unwrap();
        let doc = read_output(&dest, DOCUMENT).unwrap();
        assert!(doc.contains("A &amp; B G3"));
    }

    #[test]
    fn image_replaces_token_paragraph() {
        let dir = tempfile::tempdir().unwrap();
        let template = build_template(
            dir.path(),
            &body(r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:t>{GRAFICA}</w:t></w:r></w:p><w:p><w:r><w:t>{TITULO}</w:t></w:r></w:p>"#),
        );
        let chart = dir.path().join("grafica.png");
        std::fs::write(&chart, b"fake png").unwrap();
        let dest = dir.path().join("out.docx");

        let slots = vec![ImageSlot {
            token: CHART_TOKEN.into(),
            path: chart,
        }];
        let summary = fill_template(&template, &dest, &fields(), &slots).unwrap();
        assert_eq!(summary.images_embedded, 1);

        let doc = read_output(&dest, DOCUMENT).unwrap();
        assert!(!doc.contains("{GRAFICA}"));
        assert!(doc.contains(r#"<w:jc w:val="center"/>"#));
        assert!(doc.contains(r#"r:embed="rIdReportImage1""#));
        assert!(doc.contains(r#"cx="5670000""#));
        assert!(doc.contains("Ley de Ohm"));

        let rels = read_output(&dest, RELS).unwrap();
        assert!(rels.contains(r#"Id="rId1""#));
        assert!(rels.contains(r#"Target="media/report_image1.png""#));
        let types = read_output(&dest, CONTENT_TYPES).unwrap();
        assert!(types.contains(r#"Extension="png""#));
        assert_eq!(
            read_output(&dest, "word/media/report_image1.png").unwrap(),
            "fake png"
        );
    }

    #[test]
    fn missing_image_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let template = build_template(
            dir.path(),
            &body(r#"<w:p><w:r><w:t>{FOTO_MONTAJE}</w:t></w:r></w:p>"#),
        );
        let dest = dir.path().join("out.docx");
        let slots = vec![ImageSlot {
            token: PHOTO_TOKEN.into(),
            path: dir.path().join("no_existe.jpg"),
        }];

        let summary = fill_template(&template, &dest, &fields(), &slots).unwrap();
        assert_eq!(summary.images_embedded, 0);
        assert!(read_output(&dest, DOCUMENT).unwrap().contains("{FOTO_MONTAJE}"));
        assert_eq!(read_output(&dest, CONTENT_TYPES).unwrap(), TYPES);
    }

    #[test]
    fn image_without_paragraph_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let template = build_template(dir.path(), &body(r#"<w:p><w:r><w:t>{TITULO}</w:t></w:r></w:p>"#));
        let photo = dir.path().join("foto.jpg");
        std::fs::write(&photo, b"jpeg").unwrap();
        let dest = dir.path().join("out.docx");

        let slots = vec![ImageSlot {
            token: PHOTO_TOKEN.into(),
            path: photo,
        }];
        let summary = fill_template(&template, &dest, &fields(), &slots).unwrap();
        assert_eq!(summary.images_embedded, 0);
        assert!(read_output(&dest, "word/media/report_image1.jpeg").is_none());
    }

    #[test]
    fn not_a_zip_is_an_archive_error() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("plantilla.docx");
        std::fs::write(&template, b"plain text").unwrap();
        let result = fill_template(&template, &dir.path().join("o.docx"), &[], &[]);
        assert!(matches!(result, Err(TemplateError::Archive(_))));
    }

    #[test]
    fn report_fields_cover_every_answer() {
        let data = ReportData {
            analysis: "Análisis".into(),
            setup: "Montaje".into(),
            date: chrono::NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            ..ReportData::default()
        };
        let fields = report_fields(&data);
        assert_eq!(fields.len(), 15);
        let get = |t: &str| fields.iter().find(|(k, _)| *k == t).unwrap().1.clone();
        assert_eq!(get("{RESULTADOS}"), "Análisis");
        assert_eq!(get("{MONTAJE}"), "Montaje");
        assert_eq!(get("{FECHA}"), "05/03/2024");
    }
}
