/// Text manifest (`zip_structure.txt`) — the structural index on disk.
///
/// ```text
/// Path = D:\Mods\cars.zip
/// Path = vehicles\
/// Path = vehicles\roamer\
/// Path = vehicles\roamer\classic.pc
///
/// Path = D:\Mods\vanilla.zip
/// ...
/// ```
///
/// One block per archive: the archive path, then its directory entries, then
/// its file entries (each group sorted), then a blank line. Entry separators
/// are written as `\` and converted back to `/` on read. An archive that could
/// not be opened is written as a bare header.
use crate::error::{PipelineError, Result};
use crate::fsio;
use crate::model::ArchiveRecord;
use std::fmt::Write as _;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

const LINE_PREFIX: &str = "Path";

/// Order entry names the way the manifest lists them: directory markers
/// first, then files, each group sorted by its `\`-separated form.
pub fn canonical_entry_order(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut dirs: Vec<(String, String)> = Vec::new();
    let mut files: Vec<(String, String)> = Vec::new();
    for name in names {
        let key = name.replace('/', "\\");
        if name.ends_with('/') {
            dirs.push((key, name));
        } else {
            files.push((key, name));
        }
    }
    dirs.sort();
    dirs.dedup_by(|a, b| a.0 == b.0);
    files.sort();
    files.dedup_by(|a, b| a.0 == b.0);
    dirs.into_iter().chain(files).map(|(_, name)| name).collect()
}

/// Render records in manifest form.
pub fn render_manifest(records: &[ArchiveRecord]) -> String {
    let mut out = String::new();
    for record in records {
        let _ = writeln!(out, "{LINE_PREFIX} = {}", record.path.display());
        for entry in &record.entries {
            let _ = writeln!(out, "{LINE_PREFIX} = {}", entry.replace('/', "\\"));
        }
        out.push('\n');
    }
    out
}

pub fn write_manifest(path: &Path, records: &[ArchiveRecord]) -> Result<()> {
    fsio::write_atomic(path, render_manifest(records).as_bytes())?;
    debug!("Wrote manifest for {} archive(s) to {}", records.len(), path.display());
    Ok(())
}

/// Records parsed from a manifest, plus one error per line that could not
/// be understood.
#[derive(Debug, Default)]
pub struct ManifestContents {
    pub records: Vec<ArchiveRecord>,
    pub errors: Vec<PipelineError>,
}

/// Parse manifest text.
///
/// A `Path = ` line opens a new archive when it follows a blank line (or the
/// start of the file), or when its value ends with `.<extension>`. Any other
/// non-empty line that is not a `Path = ` line is reported as malformed and
/// skipped.
pub fn parse_manifest(text: &str, extension: &str) -> ManifestContents {
    let suffix = format!(".{}", extension.to_ascii_lowercase());
    let mut contents = ManifestContents::default();
    let mut current: Option<(String, Vec<String>)> = None;
    let mut expect_header = true;

    let flush = |current: &mut Option<(String, Vec<String>)>,
                     records: &mut Vec<ArchiveRecord>| {
        if let Some((header, entries)) = current.take() {
            records.push(ArchiveRecord::new(header, None, entries));
        }
    };

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            expect_header = true;
            continue;
        }
        let Some(value) = path_value(line) else {
            contents.errors.push(PipelineError::MalformedManifestLine {
                line: idx + 1,
                text: line.to_string(),
            });
            continue;
        };

        if expect_header || value.to_ascii_lowercase().ends_with(&suffix) {
            flush(&mut current, &mut contents.records);
            current = Some((value.to_string(), Vec::new()));
            expect_header = false;
        } else if let Some((_, entries)) = current.as_mut() {
            entries.push(value.replace('\\', "/"));
        }
    }
    flush(&mut current, &mut contents.records);
    contents
}

/// `Path = <value>` → `<value>`, tolerating any spacing around `=`.
fn path_value(line: &str) -> Option<&str> {
    let rest = line.strip_prefix(LINE_PREFIX)?;
    let rest = rest.trim_start().strip_prefix('=')?;
    let value = rest.trim();
    (!value.is_empty()).then_some(value)
}

/// Read the manifest, retrying transient failures with exponential back-off.
///
/// A missing file is fatal immediately. Other I/O errors (typically the
/// producer still holding the file) are retried up to `attempts` times.
/// Invalid UTF-8 is replaced rather than rejected.
pub fn read_with_retry(path: &Path, attempts: u32, backoff: Duration) -> Result<String> {
    let attempts = attempts.max(1);
    let mut delay = backoff;
    for attempt in 1..=attempts {
        match fs::read(path) {
            Ok(bytes) => return Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PipelineError::ManifestMissing(path.to_path_buf()));
            }
            Err(e) if attempt == attempts => return Err(PipelineError::io(path, e)),
            Err(e) => {
                warn!(
                    "Manifest {} unreadable (attempt {attempt}/{attempts}): {e}; retrying in {delay:?}",
                    path.display()
                );
                thread::sleep(delay);
                delay = delay.saturating_mul(2);
            }
        }
    }
    Err(PipelineError::ManifestMissing(path.to_path_buf()))
}

/// Read and parse the manifest in one step.
pub fn load_manifest(
    path: &Path,
    extension: &str,
    attempts: u32,
    backoff: Duration,
) -> Result<ManifestContents> {
    let text = read_with_retry(path, attempts, backoff)?;
    let contents = parse_manifest(&text, extension);
    for err in &contents.errors {
        warn!("{}: {err}", path.display());
    }
    Ok(contents)
}
