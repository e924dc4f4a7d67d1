//! Text extraction and regex contact recovery for uploaded resumes.

use std::borrow::Cow;
use std::io::{Cursor, Read};
use std::sync::LazyLock;

use anyhow::{anyhow, bail, Context, Result};
use bytes::Bytes;
use regex::{Captures, Regex};

use crate::models::resume::ContactInfo;

/// Longest text handed to the model. Larger extractions are almost always
/// PDF structure noise rather than resume content.
pub const MAX_RESUME_CHARS: usize = 100_000;

pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const DOCX_BODY: &str = "word/document.xml";

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}\b").expect("valid email regex")
});
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\(?\d[\d\s().-]{6,}\d").expect("valid phone regex"));
static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:https?://|www\.)[^\s<>]+").expect("valid url regex")
});
// Text runs, tabs and line breaks, and paragraph ends of WordprocessingML.
static DOCX_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>|<w:(tab|br|cr)\s*/>|</w:p>")
        .expect("valid docx token regex")
});
static XML_ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#x[0-9a-fA-F]+|#[0-9]+|amp|lt|gt|quot|apos);").expect("valid entity regex")
});

/// Which extractor applies to an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    PlainText,
}

impl DocumentKind {
    /// Detects by MIME type first, then by magic bytes (`%PDF`, or the zip
    /// header DOCX files start with).
    pub fn detect(mime: &str, bytes: &[u8]) -> Option<Self> {
        let mime = mime.to_ascii_lowercase();
        if mime == "application/pdf" || bytes.starts_with(b"%PDF") {
            Some(DocumentKind::Pdf)
        } else if mime == DOCX_MIME || bytes.starts_with(b"PK\x03\x04") {
            Some(DocumentKind::Docx)
        } else if mime.starts_with("text/") || (mime.is_empty() && std::str::from_utf8(bytes).is_ok()) {
            Some(DocumentKind::PlainText)
        } else {
            None
        }
    }
}

/// Extracts normalised text. PDF and DOCX extraction are CPU-bound and run
/// on the blocking pool.
pub async fn extract_text(bytes: Bytes, mime: &str) -> Result<String> {
    let kind = DocumentKind::detect(mime, &bytes)
        .ok_or_else(|| anyhow!("Unsupported resume format '{mime}'"))?;

    let raw = match kind {
        DocumentKind::Pdf => {
            tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
                .await
                .context("PDF extraction task panicked")?
                .map_err(|e| anyhow!("Failed to extract text from PDF: {e:?}"))?
        }
        DocumentKind::Docx => tokio::task::spawn_blocking(move || docx_text(&bytes))
            .await
            .context("DOCX extraction task panicked")??,
        DocumentKind::PlainText => String::from_utf8_lossy(&bytes).into_owned(),
    };

    let text = normalize_text(&raw);
    if text.is_empty() {
        bail!("Unable to extract text from resume file");
    }
    Ok(text)
}

/// Reads the visible text of a DOCX body: one line per paragraph, with tabs
/// and manual breaks kept.
pub fn docx_text(bytes: &[u8]) -> Result<String> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).context("DOCX is not a valid zip archive")?;
    let mut xml = String::new();
    archive
        .by_name(DOCX_BODY)
        .with_context(|| format!("DOCX has no {DOCX_BODY}"))?
        .read_to_string(&mut xml)
        .with_context(|| format!("Unreadable {DOCX_BODY}"))?;

    let mut text = String::with_capacity(xml.len() / 4);
    for caps in DOCX_TOKEN_RE.captures_iter(&xml) {
        if let Some(run) = caps.get(1) {
            text.push_str(&unescape_xml(run.as_str()));
        } else if caps.get(2).is_some_and(|m| m.as_str() == "tab") {
            text.push('\t');
        } else {
            text.push('\n');
        }
    }
    Ok(text)
}

fn unescape_xml(raw: &str) -> Cow<'_, str> {
    XML_ENTITY_RE.replace_all(raw, |caps: &Captures| match &caps[1] {
        "amp" => "&".to_string(),
        "lt" => "<".to_string(),
        "gt" => ">".to_string(),
        "quot" => "\"".to_string(),
        "apos" => "'".to_string(),
        numeric => {
            let code = match numeric.strip_prefix("#x") {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => numeric.trim_start_matches('#').parse().ok(),
            };
            code.and_then(char::from_u32).map(String::from).unwrap_or_default()
        }
    })
}

/// Collapses runs of blank lines and trailing spaces, then caps the length
/// on a char boundary.
pub fn normalize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len().min(MAX_RESUME_CHARS));
    let mut blank_run = 0;
    for line in raw.lines().map(str::trim_end) {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }

    let trimmed = out.trim();
    match trimmed.char_indices().nth(MAX_RESUME_CHARS) {
        Some((cut, _)) => trimmed[..cut].to_string(),
        None => trimmed.to_string(),
    }
}

/// Pulls contact details straight out of the resume text.
pub fn contact_from_text(text: &str) -> ContactInfo {
    let mut contact = ContactInfo {
        email: EMAIL_RE.find(text).map(|m| m.as_str().to_string()),
        phone: PHONE_RE.find_iter(text).find_map(|m| normalize_phone(m.as_str())),
        ..Default::default()
    };

    for m in URL_RE.find_iter(text) {
        let Some(url) = clean_url(m.as_str()) else {
            continue;
        };
        let lower = url.to_ascii_lowercase();
        if contact.linkedin.is_none() && lower.contains("linkedin.com/in/") {
            contact.linkedin = Some(url.clone());
        } else if contact.github.is_none() && lower.contains("github.com/") {
            contact.github = Some(url.clone());
        }
        if !contact.links.iter().any(|l| l.eq_ignore_ascii_case(&url)) {
            contact.links.push(url);
        }
    }
    contact
}

/// Fills fields the model left blank with values found in the text.
/// Values the model did produce always win.
pub fn merge_contact(parsed: Option<ContactInfo>, fallback: ContactInfo) -> ContactInfo {
    let mut contact = parsed.unwrap_or_default();

    for (slot, found) in [
        (&mut contact.email, fallback.email),
        (&mut contact.phone, fallback.phone),
        (&mut contact.linkedin, fallback.linkedin),
        (&mut contact.github, fallback.github),
    ] {
        if slot.as_deref().map_or(true, |v| v.trim().is_empty()) {
            if let Some(found) = found {
                *slot = Some(found);
            }
        }
    }

    let known: Vec<String> = [&contact.linkedin, &contact.github, &contact.website]
        .into_iter()
        .flatten()
        .map(|s| s.to_ascii_lowercase())
        .collect();
    for link in fallback.links {
        let lower = link.to_ascii_lowercase();
        if known.contains(&lower) || contact.links.iter().any(|l| l.eq_ignore_ascii_case(&link)) {
            continue;
        }
        contact.links.push(link);
    }
    contact
}

fn normalize_phone(candidate: &str) -> Option<String> {
    let digits = candidate.chars().filter(char::is_ascii_digit).count();
    if !(10..=18).contains(&digits) {
        return None;
    }
    Some(candidate.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn clean_url(raw: &str) -> Option<String> {
    let url = raw.trim().trim_end_matches([')', ']', ',', '.', ';']);
    if url.is_empty() {
        return None;
    }
    if url.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("www.")) {
        Some(format!("https://{url}"))
    } else {
        Some(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESUME: &str = "Jane Doe\nSenior Engineer\njane.doe@example.com | +1 (555) 010-0199\n\
        https://www.linkedin.com/in/janedoe, github.com/janedoe\nPortfolio: www.janedoe.dev.\n";

    #[test]
    fn test_detect_pdf_by_magic_bytes() {
        assert_eq!(
            DocumentKind::detect("application/octet-stream", b"%PDF-1.7"),
            Some(DocumentKind::Pdf)
        );
    }

    #[test]
    fn test_detect_docx_by_mime_and_magic() {
        assert_eq!(DocumentKind::detect(DOCX_MIME, b""), Some(DocumentKind::Docx));
        assert_eq!(
            DocumentKind::detect("application/octet-stream", b"PK\x03\x04rest"),
            Some(DocumentKind::Docx)
        );
        assert_eq!(DocumentKind::detect("image/png", b"\x89PNG"), None);
    }

    fn docx(document_xml: &str) -> Bytes {
        use std::io::Write;

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file(DOCX_BODY, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(document_xml.as_bytes()).unwrap();
        Bytes::from(writer.finish().unwrap().into_inner())
    }

    #[tokio::test]
    async fn test_docx_extraction() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p><w:r><w:t>Jane Doe</w:t></w:r></w:p>
<w:p><w:r><w:t xml:space="preserve">jane@x.com </w:t></w:r><w:r><w:tab/><w:t>R&amp;D &#233;quipe</w:t></w:r></w:p>
<w:tbl><w:tr><w:tc><w:p><w:r><w:t>Rust</w:t></w:r></w:p></w:tc></w:tr></w:tbl>
</w:body></w:document>"#;

        let text = extract_text(docx(xml), DOCX_MIME).await.unwrap();

        assert_eq!(text, "Jane Doe\njane@x.com \tR&D équipe\nRust");
        assert_eq!(contact_from_text(&text).email.as_deref(), Some("jane@x.com"));
    }

    #[tokio::test]
    async fn test_zip_without_document_body_is_an_error() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("notes.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        let bytes = Bytes::from(writer.finish().unwrap().into_inner());

        let err = extract_text(bytes, DOCX_MIME).await.unwrap_err();
        assert!(format!("{err:#}").contains(DOCX_BODY));
    }

    #[tokio::test]
    async fn test_plain_text_extraction() {
        let text = extract_text(Bytes::from_static(b"Jane Doe\n\n\n\nEngineer   \n"), "text/plain")
            .await
            .unwrap();
        assert_eq!(text, "Jane Doe\n\nEngineer");
    }

    #[tokio::test]
    async fn test_whitespace_only_text_is_an_error() {
        let err = extract_text(Bytes::from_static(b"  \n\n \t"), "text/plain")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unable to extract text"));
    }

    #[test]
    fn test_normalize_caps_length() {
        let long = "é".repeat(MAX_RESUME_CHARS + 10);
        assert_eq!(normalize_text(&long).chars().count(), MAX_RESUME_CHARS);
    }

    #[test]
    fn test_contact_from_text() {
        let contact = contact_from_text(RESUME);
        assert_eq!(contact.email.as_deref(), Some("jane.doe@example.com"));
        assert_eq!(contact.phone.as_deref(), Some("+1 (555) 010-0199"));
        assert_eq!(
            contact.linkedin.as_deref(),
            Some("https://www.linkedin.com/in/janedoe")
        );
        assert!(contact.links.contains(&"https://www.janedoe.dev".to_string()));
    }

    #[test]
    fn test_short_digit_runs_are_not_phones() {
        assert_eq!(contact_from_text("Class of 2019 - 2023").phone, None);
    }

    #[test]
    fn test_merge_prefers_model_values() {
        let parsed = ContactInfo {
            name: Some("Jane Doe".to_string()),
            email: Some("jane@work.com".to_string()),
            phone: Some("  ".to_string()),
            ..Default::default()
        };
        let merged = merge_contact(Some(parsed), contact_from_text(RESUME));

        assert_eq!(merged.name.as_deref(), Some("Jane Doe"));
        assert_eq!(merged.email.as_deref(), Some("jane@work.com"));
        assert_eq!(merged.phone.as_deref(), Some("+1 (555) 010-0199"));
        assert!(!merged
            .links
            .iter()
            .any(|l| l.eq_ignore_ascii_case("https://www.linkedin.com/in/janedoe")));
    }

    #[test]
    fn test_merge_without_model_contact() {
        let merged = merge_contact(None, contact_from_text("reach me at jd@x.io"));
        assert_eq!(merged.email.as_deref(), Some("jd@x.io"));
    }
}
