use crate::error::TabgridError;
use crate::extraction::PageSource;
use crate::geometry::{BBox, PageInput, Token};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::Write;
use std::process::Command;
use tracing::{debug, warn};

/// Page source backed by pdftotext (from poppler-utils).
///
/// Uses `pdftotext -bbox` for word-level boxes. pdftotext does not report
/// vector graphics, so its pages carry no line segments and ruled tables
/// are found by alignment instead.
pub struct PdftotextSource;

impl PdftotextSource {
    pub fn new() -> Self {
        PdftotextSource
    }

    /// True when a `pdftotext` binary can be spawned. Older poppler builds
    /// exit non-zero on `-v`, so only a failed spawn counts as missing.
    pub fn is_available() -> bool {
        Command::new("pdftotext").arg("-v").output().is_ok()
    }
}

impl Default for PdftotextSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PageSource for PdftotextSource {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageInput>, TabgridError> {
        let mut tmpfile =
            tempfile::NamedTempFile::new().map_err(|e| TabgridError::Extraction(e.to_string()))?;
        tmpfile
            .write_all(bytes)
            .map_err(|e| TabgridError::Extraction(e.to_string()))?;

        let output = Command::new("pdftotext")
            .arg("-bbox")
            .arg(tmpfile.path())
            .arg("-") // output to stdout
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TabgridError::PdftotextNotFound
                } else {
                    TabgridError::Extraction(format!("pdftotext failed: {}", e))
                }
            })?;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(TabgridError::PdftotextFailed { code, stderr });
        }

        let xml = String::from_utf8_lossy(&output.stdout);
        let pages = parse_bbox_xml(&xml)?;
        debug!(pages = pages.len(), "pdftotext produced pages");
        Ok(pages)
    }

    fn backend_name(&self) -> &str {
        "pdftotext"
    }
}

fn attr_f32(e: &BytesStart, name: &[u8]) -> Option<f32> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .and_then(|a| String::from_utf8_lossy(&a.value).trim().parse().ok())
}

fn word_bbox(e: &BytesStart) -> Option<BBox> {
    Some(BBox::new(
        attr_f32(e, b"xMin")?,
        attr_f32(e, b"yMin")?,
        attr_f32(e, b"xMax")?,
        attr_f32(e, b"yMax")?,
    ))
}

/// Parse `pdftotext -bbox` XHTML: one page per `<page>`, one token per
/// `<word>`. Words without a usable box are skipped.
pub(crate) fn parse_bbox_xml(xml: &str) -> Result<Vec<PageInput>, TabgridError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    reader.config_mut().check_end_names = false;

    let mut pages: Vec<PageInput> = Vec::new();
    let mut word: Option<(BBox, String)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"page" => pages.push(PageInput {
                    page_number: pages.len() + 1,
                    width: attr_f32(&e, b"width").unwrap_or(0.0),
                    height: attr_f32(&e, b"height").unwrap_or(0.0),
                    ..Default::default()
                }),
                b"word" => match word_bbox(&e) {
                    Some(bbox) => word = Some((bbox, String::new())),
                    None => warn!("pdftotext word without bounding box skipped"),
                },
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if let Some((_, text)) = word.as_mut() {
                    let decoded = t
                        .unescape()
                        .map_err(|e| TabgridError::Extraction(format!("bad XML text: {e}")))?;
                    text.push_str(&decoded);
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"word" => {
                if let (Some((bbox, text)), Some(page)) = (word.take(), pages.last_mut()) {
                    page.tokens.push(Token::new(text, bbox));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(TabgridError::Extraction(format!(
                    "malformed pdftotext output at byte {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
    }

    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bbox_xml_words() {
        let xml = r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Transitional//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd">
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
<title></title>
<meta name="Producer" content="pdfTeX"/>
</head>
<body>
<doc>
  <page width="612.000000" height="792.000000">
    <word xMin="56.800000" yMin="57.300000" xMax="94.500000" yMax="69.300000">Date</word>
    <word xMin="150.000000" yMin="57.300000" xMax="200.000000" yMax="69.300000">R&amp;D</word>
  </page>
  <page width="612.000000" height="792.000000">
    <word xMin="10.0" yMin="20.0" xMax="30.0" yMax="30.0">Total</word>
  </page>
</doc>
</body>
</html>
"#;
        let pages = parse_bbox_xml(xml).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page_number, 1);
        assert_eq!(pages[0].width, 612.0);
        assert_eq!(pages[0].tokens.len(), 2);
        assert_eq!(pages[0].tokens[1].text, "R&D");
        assert_eq!(pages[0].tokens[0].bbox.x0, 56.8);
        assert!(pages[0].segments.is_empty());
        assert_eq!(pages[1].page_number, 2);
        assert_eq!(pages[1].tokens[0].text, "Total");
    }

    #[test]
    fn test_word_without_box_is_skipped() {
        let xml = r#"<doc><page width="100" height="100"><word xMin="1">x</word><word xMin="1" yMin="1" xMax="5" yMax="5">y</word></page></doc>"#;
        let pages = parse_bbox_xml(xml).unwrap();
        assert_eq!(pages[0].tokens.len(), 1);
        assert_eq!(pages[0].tokens[0].text, "y");
    }

    #[test]
    fn test_empty_document() {
        assert!(parse_bbox_xml("<doc></doc>").unwrap().is_empty());
    }
}
