//! Digest pages built from decoded HTML bodies.
//!
//! `result.html` holds every letter plus a navigation list; each
//! `batch_<NNN>_<start>-<end>.html` holds one fixed-size slice of them.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::html::inner_content;
use crate::types::MessageId;

/// Name of the cumulative digest page.
pub const SUMMARY_FILE: &str = "result.html";

/// Prefix of batch page names.
pub const BATCH_PREFIX: &str = "batch_";

/// Default number of letters per batch page.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Labels used around every letter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
    pub start: String,
    pub end: String,
    pub title: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            start: "start of letter".to_string(),
            end: "end of letter".to_string(),
            title: "Merged letters".to_string(),
        }
    }
}

/// One rendered batch page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFile {
    /// 1-based batch number.
    pub number: usize,
    /// First letter index covered (1-based, inclusive).
    pub start: usize,
    /// Last letter index covered (inclusive).
    pub end: usize,
    pub path: PathBuf,
}

impl BatchFile {
    fn file_name(number: usize, start: usize, end: usize) -> String {
        format!("{BATCH_PREFIX}{number:03}_{start}-{end}.html")
    }
}

/// Files produced by [`render`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Digest {
    pub summary_path: PathBuf,
    pub batches: Vec<BatchFile>,
    /// Letters replaced by an error block.
    pub failed: usize,
}

/// Render `files` into `out_dir/result.html` and batch pages of `batch_size` letters.
///
/// A file that cannot be read is replaced by an error block at its position;
/// the digest is still completed.
pub fn render(out_dir: &Path, files: &[PathBuf], batch_size: usize, markers: &Markers) -> Result<Digest> {
    if batch_size == 0 {
        return Err(Error::Config("digest batch size must be at least 1".to_string()));
    }
    fs::create_dir_all(out_dir)?;
    remove_batch_pages(out_dir)?;

    let summary_path = out_dir.join(SUMMARY_FILE);
    let mut summary = BufWriter::new(File::create(&summary_path)?);
    summary.write_all(document_head(&markers.title).as_bytes())?;

    let mut batches = Vec::new();
    let mut pending = String::new();
    let mut pending_count = 0;
    let mut batch_start = 1;
    let mut failed = 0;

    for (offset, file) in files.iter().enumerate() {
        let index = offset + 1;
        let entry = match fs::read_to_string(file) {
            Ok(content) => {
                debug!("added {} as letter {index}", file.display());
                letter_block(index, &inner_content(&content), markers)
            }
            Err(err) => {
                warn!("failed to add {} to digest: {err}", file.display());
                failed += 1;
                error_block(index, file, &err.to_string(), markers)
            }
        };

        summary.write_all(entry.as_bytes())?;
        pending.push_str(&entry);
        pending_count += 1;

        if pending_count == batch_size || index == files.len() {
            let number = batches.len() + 1;
            let path = out_dir.join(BatchFile::file_name(number, batch_start, index));
            let title = format!("{} {batch_start}-{index}", markers.title);
            fs::write(&path, format!("{}{pending}{}", document_head(&title), DOCUMENT_TAIL))?;

            batches.push(BatchFile {
                number,
                start: batch_start,
                end: index,
                path,
            });
            pending.clear();
            pending_count = 0;
            batch_start = index + 1;
        }
    }

    summary.write_all(navigation(&batches).as_bytes())?;
    summary.write_all(DOCUMENT_TAIL.as_bytes())?;
    summary.flush()?;

    info!(
        "digest {} written with {} letters in {} batches",
        summary_path.display(),
        files.len(),
        batches.len()
    );

    Ok(Digest {
        summary_path,
        batches,
        failed,
    })
}

/// Delete batch pages left by an earlier render; batches are always rebuilt in full.
fn remove_batch_pages(out_dir: &Path) -> Result<()> {
    for entry in fs::read_dir(out_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(BATCH_PREFIX) && name.ends_with(".html") && entry.file_type()?.is_file() {
            debug!("removing old batch page {name}");
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

/// Decoded HTML bodies in `out_dir`, ordered by message id.
///
/// Digest pages produced by earlier runs are not inputs.
pub fn digest_inputs(out_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();

    for entry in fs::read_dir(out_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.ends_with(".html") || name == SUMMARY_FILE || name.starts_with(BATCH_PREFIX) {
            continue;
        }
        inputs.push((message_id_of(&name), entry.path()));
    }

    inputs.sort();
    Ok(inputs.into_iter().map(|(_, path)| path).collect())
}

/// `101.eml.html` -> `101`.
fn message_id_of(file_name: &str) -> MessageId {
    MessageId::new(file_name.split('.').next().unwrap_or(file_name))
}

const DOCUMENT_TAIL: &str = "</body>\n</html>";

fn document_head(title: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<title>{}</title>\n</head>\n<body>\n",
        html_escape::encode_text(title)
    )
}

fn letter_block(index: usize, content: &str, markers: &Markers) -> String {
    format!(
        "<div>\n<h3>= {start} {index} =</h3>\n<hr>\n{content}<hr>\n<h3>= {end} {index} =</h3>\n</div>\n\n",
        start = html_escape::encode_text(&markers.start),
        end = html_escape::encode_text(&markers.end),
    )
}

fn error_block(index: usize, file: &Path, error: &str, markers: &Markers) -> String {
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file.display().to_string());
    format!(
        "<div class=\"digest-error\" style=\"border: 2px solid red; padding: 10px; margin: 20px 0; background-color: #ffe6e6;\">\n\
<h3 style=\"color: red;\">ERROR: {start} {index}</h3>\n\
<p>Could not load file: {name}</p>\n\
<p>Error: {error}</p>\n\
<h3 style=\"color: red;\">{end} {index}</h3>\n\
</div>\n\n",
        start = html_escape::encode_text(&markers.start),
        end = html_escape::encode_text(&markers.end),
        name = html_escape::encode_text(&name),
        error = html_escape::encode_text(error),
    )
}

fn navigation(batches: &[BatchFile]) -> String {
    let mut nav = String::from("<nav>\n<h2>Batches</h2>\n<ul>\n");
    for batch in batches {
        let href = batch
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        nav.push_str(&format!(
            "<li><a href=\"{}\">Batch {}: letters {}-{}</a></li>\n",
            html_escape::encode_double_quoted_attribute(&href),
            batch.number,
            batch.start,
            batch.end
        ));
    }
    nav.push_str("</ul>\n</nav>\n");
    nav
}
