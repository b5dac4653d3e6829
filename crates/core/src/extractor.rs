use crate::error::ExtractError;
use crate::models::{DocumentFormat, Segment, SegmentPosition};
use lopdf::Document;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::Read as _;
use std::path::Path;

/// Decompressed size cap for a single OOXML archive entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extracts the ordered text segments of a document. Dispatches on the
/// already-resolved format; callers obtain it via
/// [`DocumentFormat::from_path`].
pub fn extract_segments(path: &Path, format: DocumentFormat) -> Result<Vec<Segment>, ExtractError> {
    let segments = match format {
        DocumentFormat::Pdf => extract_pdf(path)?,
        DocumentFormat::Word => extract_docx(path)?,
        DocumentFormat::Spreadsheet => extract_xlsx(path)?,
        DocumentFormat::Csv => extract_csv(path)?,
        DocumentFormat::Text => extract_text(path)?,
    };

    if segments.is_empty() {
        return Err(ExtractError::Empty(path.display().to_string()));
    }
    Ok(segments)
}

fn extract_pdf(path: &Path) -> Result<Vec<Segment>, ExtractError> {
    let document = Document::load(path).map_err(|error| ExtractError::Pdf(error.to_string()))?;

    let mut segments = Vec::new();
    for (page_no, _page_id) in document.get_pages() {
        let text = document
            .extract_text(&[page_no])
            .map_err(|error| ExtractError::Pdf(error.to_string()))?;

        if !text.trim().is_empty() {
            segments.push(Segment {
                text,
                position: SegmentPosition::Page(page_no),
            });
        }
    }

    Ok(segments)
}

fn open_archive(path: &Path) -> Result<zip::ZipArchive<std::fs::File>, ExtractError> {
    let file = std::fs::File::open(path)?;
    zip::ZipArchive::new(file).map_err(|error| ExtractError::Ooxml(error.to_string()))
}

fn read_entry_bounded(
    archive: &mut zip::ZipArchive<std::fs::File>,
    name: &str,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|error| ExtractError::Ooxml(error.to_string()))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|error| ExtractError::Ooxml(error.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "archive entry {name} exceeds size limit"
        )));
    }
    Ok(out)
}

/// Word documents: one segment per non-empty paragraph of
/// `word/document.xml`, section-indexed in document order.
fn extract_docx(path: &Path) -> Result<Vec<Segment>, ExtractError> {
    let mut archive = open_archive(path)?;
    let xml = read_entry_bounded(&mut archive, "word/document.xml")?;

    let mut reader = Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut segments = Vec::new();
    let mut paragraph = String::new();
    let mut in_text_run = false;
    let mut section = 0u32;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"t" => in_text_run = true,
                b"p" => paragraph.clear(),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text_run => {
                paragraph.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text_run = false,
                b"p" => {
                    if !paragraph.trim().is_empty() {
                        section += 1;
                        segments.push(Segment {
                            text: paragraph.trim().to_string(),
                            position: SegmentPosition::Section(section),
                        });
                    }
                    paragraph.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(error) => return Err(ExtractError::Ooxml(error.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(segments)
}

/// Spreadsheets: one segment per non-empty worksheet row, cells flattened
/// left to right with ` | ` separators.
fn extract_xlsx(path: &Path) -> Result<Vec<Segment>, ExtractError> {
    let mut archive = open_archive(path)?;
    let shared_strings = read_shared_strings(&mut archive)?;

    let mut sheet_names: Vec<String> = archive
        .file_names()
        .filter(|name| name.starts_with("xl/worksheets/sheet") && name.ends_with(".xml"))
        .map(|name| name.to_string())
        .collect();
    sheet_names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });

    let mut segments = Vec::new();
    for (sheet_idx, name) in sheet_names.iter().enumerate() {
        let xml = read_entry_bounded(&mut archive, name)?;
        extract_sheet_rows(
            &xml,
            &shared_strings,
            sheet_idx as u32 + 1,
            &mut segments,
        )?;
    }

    Ok(segments)
}

fn read_shared_strings(
    archive: &mut zip::ZipArchive<std::fs::File>,
) -> Result<Vec<String>, ExtractError> {
    // Workbooks without string cells have no sharedStrings part at all.
    if !archive.file_names().any(|n| n == "xl/sharedStrings.xml") {
        return Ok(Vec::new());
    }
    let xml = read_entry_bounded(archive, "xl/sharedStrings.xml")?;

    let mut strings = Vec::new();
    let mut reader = Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_si = false;
    let mut in_t = false;
    let mut current = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                }
                b"t" if in_si => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                current.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => {
                    in_si = false;
                    strings.push(current.clone());
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(error) => return Err(ExtractError::Ooxml(error.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(strings)
}

fn extract_sheet_rows(
    xml: &[u8],
    shared_strings: &[String],
    sheet: u32,
    segments: &mut Vec<Segment>,
) -> Result<(), ExtractError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut row_no = 0u32;
    let mut cells: Vec<String> = Vec::new();
    let mut in_value = false;
    let mut cell_is_shared = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => {
                    row_no += 1;
                    cells.clear();
                }
                b"c" => {
                    cell_is_shared = e.attributes().any(|attr| {
                        attr.as_ref()
                            .map(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s")
                            .unwrap_or(false)
                    });
                }
                b"v" => in_value = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_value => {
                let raw = te.unescape().unwrap_or_default();
                let value = raw.trim();
                if value.is_empty() {
                    // skip
                } else if cell_is_shared {
                    if let Ok(idx) = value.parse::<usize>() {
                        if let Some(text) = shared_strings.get(idx) {
                            cells.push(text.clone());
                        }
                    }
                } else {
                    cells.push(value.to_string());
                }
                in_value = false;
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" => in_value = false,
                b"c" => cell_is_shared = false,
                b"row" => {
                    if !cells.is_empty() {
                        segments.push(Segment {
                            text: cells.join(" | "),
                            position: SegmentPosition::Cell { sheet, row: row_no },
                        });
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(error) => return Err(ExtractError::Ooxml(error.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

/// CSV: header columns are paired with each row's cells so rows read as
/// `name: value` pairs, one segment per data row.
fn extract_csv(path: &Path) -> Result<Vec<Segment>, ExtractError> {
    let text = read_text_lossy(path)?;
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

    let header: Vec<String> = match lines.next() {
        Some((_, line)) => split_csv_line(line),
        None => return Ok(Vec::new()),
    };

    let mut segments = Vec::new();
    for (line_idx, line) in lines {
        let cells = split_csv_line(line);
        let rendered = if header.len() == cells.len() {
            header
                .iter()
                .zip(&cells)
                .map(|(name, value)| format!("{name}: {value}"))
                .collect::<Vec<_>>()
                .join(" | ")
        } else {
            cells.join(" | ")
        };
        if !rendered.trim().is_empty() {
            segments.push(Segment {
                text: rendered,
                position: SegmentPosition::Row(line_idx as u32 + 1),
            });
        }
    }

    // Header-only files still carry the column names as content.
    if segments.is_empty() && !header.is_empty() {
        segments.push(Segment {
            text: header.join(" | "),
            position: SegmentPosition::Row(1),
        });
    }

    Ok(segments)
}

/// Minimal RFC-4180 field splitting: double quotes group fields, doubled
/// quotes escape a literal quote.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

/// Plain text: one segment per blank-line-separated paragraph.
fn extract_text(path: &Path) -> Result<Vec<Segment>, ExtractError> {
    let text = read_text_lossy(path)?;
    let normalized = text.replace("\r\n", "\n");

    let segments: Vec<Segment> = normalized
        .split("\n\n")
        .filter(|paragraph| !paragraph.trim().is_empty())
        .enumerate()
        .map(|(idx, paragraph)| Segment {
            text: paragraph.trim().to_string(),
            position: SegmentPosition::Paragraph(idx as u32 + 1),
        })
        .collect();

    Ok(segments)
}

fn read_text_lossy(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn write_docx(path: &Path, paragraphs: &[&str]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let mut body = String::new();
        for p in paragraphs {
            body.push_str(&format!("<w:p><w:r><w:t>{p}</w:t></w:r></w:p>"));
        }
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{body}</w:body></w:document>"
        );
        writer
            .start_file("word/document.xml", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(xml.as_bytes()).unwrap();
        writer.finish().unwrap();
    }

    fn write_xlsx(path: &Path) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("xl/sharedStrings.xml", SimpleFileOptions::default())
            .unwrap();
        writer
            .write_all(
                b"<?xml version=\"1.0\"?><sst><si><t>vendor</t></si><si><t>Acme Corp</t></si></sst>",
            )
            .unwrap();
        writer
            .start_file("xl/worksheets/sheet1.xml", SimpleFileOptions::default())
            .unwrap();
        writer
            .write_all(
                b"<?xml version=\"1.0\"?><worksheet><sheetData>\
                  <row r=\"1\"><c t=\"s\"><v>0</v></c></row>\
                  <row r=\"2\"><c t=\"s\"><v>1</v></c><c><v>42</v></c></row>\
                  </sheetData></worksheet>",
            )
            .unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn text_files_are_split_by_paragraph() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "first paragraph\n\nsecond paragraph\n").unwrap();

        let segments = extract_segments(&path, DocumentFormat::Text).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "first paragraph");
        assert_eq!(segments[1].position, SegmentPosition::Paragraph(2));
    }

    #[test]
    fn csv_rows_are_flattened_with_header_names() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vendors.csv");
        std::fs::write(&path, "name,tier\n\"Acme, Inc\",gold\nGlobex,silver\n").unwrap();

        let segments = extract_segments(&path, DocumentFormat::Csv).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "name: Acme, Inc | tier: gold");
        assert_eq!(segments[0].position, SegmentPosition::Row(2));
    }

    #[test]
    fn docx_paragraphs_become_sections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("runbook.docx");
        write_docx(&path, &["Containment steps", "Eradication steps"]);

        let segments = extract_segments(&path, DocumentFormat::Word).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "Containment steps");
        assert_eq!(segments[1].position, SegmentPosition::Section(2));
    }

    #[test]
    fn xlsx_rows_resolve_shared_strings_and_numbers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("inventory.xlsx");
        write_xlsx(&path);

        let segments = extract_segments(&path, DocumentFormat::Spreadsheet).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "vendor");
        assert_eq!(segments[1].text, "Acme Corp | 42");
        assert_eq!(segments[1].position, SegmentPosition::Cell { sheet: 1, row: 2 });
    }

    #[test]
    fn corrupt_pdf_reports_extraction_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4\n%broken").unwrap();

        let error = extract_segments(&path, DocumentFormat::Pdf).unwrap_err();
        assert!(matches!(error, ExtractError::Pdf(_) | ExtractError::Empty(_)));
    }

    #[test]
    fn empty_text_file_is_an_error_not_a_panic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "").unwrap();

        let error = extract_segments(&path, DocumentFormat::Text).unwrap_err();
        assert!(matches!(error, ExtractError::Empty(_)));
    }
}
