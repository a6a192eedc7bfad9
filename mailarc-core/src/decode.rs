//! Message decoding into text, HTML and attachment files.
//!
//! Output layout for a folder decoded into `out`:
//!
//! ```text
//! out/
//!   101.eml.txt               # header summary + text body
//!   101.eml.html              # header summary + cleaned HTML body
//!   101.eml_attachments/      # only with attachment extraction enabled
//!     report.pdf
//! ```

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use mail_parser::{Address, Message, MessageParser, MessagePart, MimeHeaders, PartType};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::html::strip_styling;
use crate::store::MessageStore;

/// Which outputs [`write_outputs`] produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    pub text: bool,
    pub html: bool,
    pub attachments: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            text: true,
            html: true,
            attachments: false,
        }
    }
}

/// Subject, sender and date of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSummary {
    pub subject: String,
    pub from: String,
    pub date: String,
}

impl HeaderSummary {
    /// Plain-text block written ahead of the text body.
    pub fn to_text(&self) -> String {
        format!(
            "Subject: {}\nFrom: {}\nDate: {}\n",
            self.subject, self.from, self.date
        )
    }

    /// Escaped HTML block written ahead of the HTML body.
    pub fn to_html(&self) -> String {
        format!(
            "<div>\n<p>Subject: {}</p>\n<p>From: {}</p>\n<p>Date: {}</p>\n</div>\n",
            html_escape::encode_text(&self.subject),
            html_escape::encode_text(&self.from),
            html_escape::encode_text(&self.date)
        )
    }
}

/// A non-body part carrying a file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Extracted view of one raw message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedMessage {
    pub summary: HeaderSummary,
    pub text: Option<String>,
    /// Cleaned HTML body (no `<style>`, no `style`/`class` attributes).
    pub html: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// Decode raw message bytes.
///
/// For multipart messages the last `text/plain` and the last `text/html`
/// parts win. A single-part message's whole payload is the text body.
pub fn decode(raw: &[u8]) -> Result<DecodedMessage> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| Error::Parse("no message headers found".to_string()))?;

    let mut decoded = DecodedMessage {
        summary: summarize(&message),
        ..Default::default()
    };

    if message.root_part().is_multipart() {
        let mut text = None;
        let mut html = None;
        walk_parts(&message, &mut text, &mut html, &mut decoded.attachments);
        decoded.text = text;
        decoded.html = html.map(|body| strip_styling(&body));
    } else {
        let root = message.root_part();
        let body = match root.text_contents() {
            Some(text) => text.to_string(),
            None => String::from_utf8_lossy(root.contents()).into_owned(),
        };
        decoded.text = Some(body);
    }

    decoded.text = decoded.text.filter(|t| !t.is_empty());
    decoded.html = decoded.html.filter(|h| !h.is_empty());
    Ok(decoded)
}

fn walk_parts(
    message: &Message<'_>,
    text: &mut Option<String>,
    html: &mut Option<String>,
    attachments: &mut Vec<Attachment>,
) {
    for part in &message.parts {
        match &part.body {
            PartType::Multipart(_) => {}
            PartType::Message(nested) => {
                if let Some(name) = part.attachment_name() {
                    attachments.push(Attachment {
                        name: name.to_string(),
                        content_type: mime_type(part),
                        data: part.contents().to_vec(),
                    });
                }
                walk_parts(nested, text, html, attachments);
            }
            _ => match mime_type(part).as_str() {
                "text/plain" => *text = part.text_contents().map(str::to_string),
                "text/html" => *html = part.text_contents().map(str::to_string),
                other => {
                    if let Some(name) = part.attachment_name() {
                        attachments.push(Attachment {
                            name: name.to_string(),
                            content_type: other.to_string(),
                            data: part.contents().to_vec(),
                        });
                    }
                }
            },
        }
    }
}

/// Lower-cased `type/subtype`; parts without a Content-Type are text/plain.
fn mime_type(part: &MessagePart<'_>) -> String {
    match part.content_type() {
        Some(ct) => match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub).to_ascii_lowercase(),
            None => ct.ctype().to_ascii_lowercase(),
        },
        None => "text/plain".to_string(),
    }
}

fn summarize(message: &Message<'_>) -> HeaderSummary {
    let date = message
        .header_raw("Date")
        .map(unfold)
        .filter(|raw| !raw.is_empty())
        .or_else(|| message.date().map(|d| d.to_rfc822()))
        .unwrap_or_default();

    HeaderSummary {
        subject: message.subject().unwrap_or_default().to_string(),
        from: message.from().map(format_address).unwrap_or_default(),
        date,
    }
}

/// Folded header value on one line, whitespace runs collapsed.
fn unfold(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn format_address(address: &Address<'_>) -> String {
    address
        .iter()
        .map(|addr| match (&addr.name, &addr.address) {
            (Some(name), Some(email)) => format!("{name} <{email}>"),
            (None, Some(email)) => email.to_string(),
            (Some(name), None) => name.to_string(),
            (None, None) => String::new(),
        })
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Files written for one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeOutputs {
    pub text: Option<PathBuf>,
    pub html: Option<PathBuf>,
    pub attachments: Vec<PathBuf>,
}

/// Persist the enabled outputs of `decoded` under `out_dir`.
///
/// `file_name` is the raw message file name; outputs append `.txt`/`.html`.
/// The text file is written even without a text body, carrying only the
/// header summary.
pub fn write_outputs(
    decoded: &DecodedMessage,
    out_dir: &Path,
    file_name: &str,
    opts: DecodeOptions,
) -> Result<DecodeOutputs> {
    fs::create_dir_all(out_dir)?;
    let mut outputs = DecodeOutputs::default();

    if opts.text {
        let path = out_dir.join(format!("{file_name}.txt"));
        let mut content = decoded.summary.to_text();
        if let Some(text) = &decoded.text {
            content.push_str(text);
        }
        fs::write(&path, content)?;
        outputs.text = Some(path);
    }

    if opts.html {
        if let Some(html) = &decoded.html {
            let path = out_dir.join(format!("{file_name}.html"));
            fs::write(&path, format!("{}{}", decoded.summary.to_html(), html))?;
            outputs.html = Some(path);
        }
    }

    if opts.attachments && !decoded.attachments.is_empty() {
        let dir = out_dir.join(format!("{file_name}_attachments"));
        fs::create_dir_all(&dir)?;
        let mut used = HashSet::new();
        for attachment in &decoded.attachments {
            let name = unique_name(&sanitize_file_name(&attachment.name), &mut used);
            let path = dir.join(name);
            fs::write(&path, &attachment.data)?;
            debug!("saved attachment {}", path.display());
            outputs.attachments.push(path);
        }
    }

    Ok(outputs)
}

/// Delete whatever [`write_outputs`] wrote for `file_name` in `out_dir`.
pub fn remove_outputs(out_dir: &Path, file_name: &str) -> Result<()> {
    for ext in ["txt", "html"] {
        match fs::remove_file(out_dir.join(format!("{file_name}.{ext}"))) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
    }
    let attachments = out_dir.join(format!("{file_name}_attachments"));
    if attachments.is_dir() {
        fs::remove_dir_all(attachments)?;
    }
    Ok(())
}

/// Keep only the final path component and drop characters that are unsafe in file names.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_control() || c == ':' { '_' } else { c })
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => "attachment".to_string(),
        trimmed => trimmed.to_string(),
    }
}

fn unique_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    let mut n = 1;
    loop {
        let candidate = match ext {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Outcome of decoding every message of one folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecodeReport {
    pub decoded: usize,
    pub failed: usize,
    /// HTML files written, in message order.
    pub html_files: Vec<PathBuf>,
}

/// Decode every stored message of a folder into `out_dir`.
///
/// A message that cannot be read or parsed is logged and counted; the rest
/// of the folder is still decoded.
pub fn decode_folder(store: &MessageStore, out_dir: &Path, opts: DecodeOptions) -> Result<DecodeReport> {
    fs::create_dir_all(out_dir)?;
    let mut report = DecodeReport::default();

    for message in store.list()? {
        if !message.is_present() {
            debug!("skipping empty record {}", message.path.display());
            continue;
        }

        let file_name = message.file_name();
        let result = message
            .read_bytes()
            .and_then(|raw| decode(&raw))
            .and_then(|decoded| write_outputs(&decoded, out_dir, &file_name, opts));

        match result {
            Ok(outputs) => {
                report.decoded += 1;
                report.html_files.extend(outputs.html);
            }
            Err(err) => {
                warn!("failed to decode {}: {err}", message.path.display());
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageId;
    use tempfile::TempDir;

    const TWO_HTML_PARTS: &[u8] = b"From: Alice <alice@example.com>\r\n\
Subject: Two bodies\r\n\
Date: Mon, 4 Mar 2024 10:00:00 +0000\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"XX\"\r\n\
\r\n\
--XX\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
first text\r\n\
--XX\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>first html</p>\r\n\
--XX\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
second text\r\n\
--XX\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p style=\"color:red\" class=\"c\">second html</p><style>p{}</style>\r\n\
--XX\r\n\
Content-Type: application/pdf; name=\"report.pdf\"\r\n\
Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0=\r\n\
--XX--\r\n";

    const PLAIN: &[u8] = b"From: bob@example.com\r\n\
Subject: Plain\r\n\
Date: Tue, 5 Mar 2024 09:00:00 +0000\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Just text.\r\n";

    #[test]
    fn test_last_part_wins() {
        let decoded = decode(TWO_HTML_PARTS).unwrap();
        let html = decoded.html.unwrap();
        assert!(html.contains("second html"));
        assert!(!html.contains("first html"));
        assert!(decoded.text.unwrap().contains("second text"));
    }

    #[test]
    fn test_html_is_cleaned() {
        let html = decode(TWO_HTML_PARTS).unwrap().html.unwrap();
        assert!(!html.contains("style"));
        assert!(!html.contains("class="));
        assert!(html.contains("<p>second html</p>"));
    }

    #[test]
    fn test_summary() {
        let decoded = decode(TWO_HTML_PARTS).unwrap();
        assert_eq!(decoded.summary.subject, "Two bodies");
        assert_eq!(decoded.summary.from, "Alice <alice@example.com>");
        assert_eq!(decoded.summary.date, "Mon, 4 Mar 2024 10:00:00 +0000");
    }

    #[test]
    fn test_attachment_extracted() {
        let decoded = decode(TWO_HTML_PARTS).unwrap();
        assert_eq!(decoded.attachments.len(), 1);
        assert_eq!(decoded.attachments[0].name, "report.pdf");
        assert_eq!(decoded.attachments[0].content_type, "application/pdf");
        assert_eq!(decoded.attachments[0].data, b"%PDF-");
    }

    const FORWARDED: &[u8] = b"From: carol@example.com\r\n\
Subject: Fwd: original\r\n\
Date: Mon, 4 Mar 2024\r\n 10:00:00 +0000\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"FW\"\r\n\
\r\n\
--FW\r\n\
Content-Type: message/rfc822\r\n\
Content-Disposition: attachment; filename=\"orig.eml\"\r\n\
\r\n\
From: dave@example.com\r\n\
Subject: original\r\n\
Content-Type: text/plain\r\n\
\r\n\
inner text\r\n\
--FW--\r\n";

    #[test]
    fn test_forwarded_message_kept_as_attachment() {
        let decoded = decode(FORWARDED).unwrap();
        assert_eq!(decoded.attachments.len(), 1);
        let attachment = &decoded.attachments[0];
        assert_eq!(attachment.name, "orig.eml");
        assert_eq!(attachment.content_type, "message/rfc822");
        let data = String::from_utf8_lossy(&attachment.data);
        assert!(data.contains("Subject: original"));
        assert!(data.contains("inner text"));
        // the forwarded body still takes part in last-wins
        assert_eq!(decoded.text.as_deref().map(str::trim), Some("inner text"));
    }

    #[test]
    fn test_folded_date_is_unfolded() {
        let decoded = decode(FORWARDED).unwrap();
        assert_eq!(decoded.summary.date, "Mon, 4 Mar 2024 10:00:00 +0000");
        assert!(
            decoded
                .summary
                .to_text()
                .contains("Date: Mon, 4 Mar 2024 10:00:00 +0000\n")
        );
    }

    #[test]
    fn test_single_part_is_text() {
        let decoded = decode(PLAIN).unwrap();
        assert_eq!(decoded.text.as_deref().map(str::trim_end), Some("Just text."));
        assert!(decoded.html.is_none());
        assert!(decoded.attachments.is_empty());
    }

    #[test]
    fn test_empty_input_is_parse_error() {
        assert!(matches!(decode(b""), Err(Error::Parse(_))));
        assert!(matches!(decode(b"   "), Err(Error::Parse(_))));
    }

    #[test]
    fn test_write_outputs_respects_toggles() {
        let temp = TempDir::new().unwrap();
        let decoded = decode(TWO_HTML_PARTS).unwrap();

        let outputs = write_outputs(&decoded, temp.path(), "1.eml", DecodeOptions::default()).unwrap();
        let text = fs::read_to_string(outputs.text.unwrap()).unwrap();
        assert!(text.starts_with("Subject: Two bodies\nFrom: Alice <alice@example.com>\n"));
        assert!(text.contains("second text"));
        let html = fs::read_to_string(outputs.html.unwrap()).unwrap();
        assert!(html.contains("<p>Subject: Two bodies</p>"));
        assert!(outputs.attachments.is_empty());

        let opts = DecodeOptions {
            text: false,
            html: false,
            attachments: true,
        };
        let outputs = write_outputs(&decoded, temp.path(), "2.eml", opts).unwrap();
        assert!(outputs.text.is_none());
        assert!(outputs.html.is_none());
        assert_eq!(
            outputs.attachments,
            vec![temp.path().join("2.eml_attachments").join("report.pdf")]
        );
    }

    #[test]
    fn test_text_file_written_without_text_body() {
        let temp = TempDir::new().unwrap();
        let decoded = DecodedMessage {
            summary: HeaderSummary {
                subject: "S".into(),
                from: "F".into(),
                date: "D".into(),
            },
            ..Default::default()
        };
        let outputs = write_outputs(&decoded, temp.path(), "3.eml", DecodeOptions::default()).unwrap();
        assert_eq!(
            fs::read_to_string(outputs.text.unwrap()).unwrap(),
            "Subject: S\nFrom: F\nDate: D\n"
        );
        assert!(outputs.html.is_none());
    }

    #[test]
    fn test_sanitize_and_unique_names() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\x\\a.txt"), "a.txt");
        assert_eq!(sanitize_file_name(".."), "attachment");

        let mut used = HashSet::new();
        assert_eq!(unique_name("a.pdf", &mut used), "a.pdf");
        assert_eq!(unique_name("a.pdf", &mut used), "a (1).pdf");
        assert_eq!(unique_name("a.pdf", &mut used), "a (2).pdf");
        assert_eq!(unique_name("README", &mut used), "README");
        assert_eq!(unique_name("README", &mut used), "README (1)");
    }

    #[test]
    fn test_decode_folder_counts_failures() {
        let temp = TempDir::new().unwrap();
        let store = MessageStore::open(temp.path().join("raw")).unwrap();
        store.write(&MessageId::from(1), TWO_HTML_PARTS).unwrap();
        store.write(&MessageId::from(2), b"   ").unwrap();
        store.write(&MessageId::from(3), PLAIN).unwrap();
        fs::write(store.path_for(&MessageId::from(4)), b"").unwrap();

        let out = temp.path().join("txt");
        let report = decode_folder(&store, &out, DecodeOptions::default()).unwrap();
        assert_eq!(report.decoded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.html_files, vec![out.join("1.eml.html")]);
        assert!(out.join("3.eml.txt").exists());
        assert!(!out.join("4.eml.txt").exists());
    }
}
