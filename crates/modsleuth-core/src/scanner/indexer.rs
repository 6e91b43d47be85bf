/// Structural indexer — opens each archive and classifies its entries.
///
/// Runs synchronously on the coordinating thread: listing a zip's central
/// directory is cheap compared to extraction. A corrupt or unreadable
/// archive becomes an empty record plus one error; the batch continues.
use super::locator::LocatedArchive;
use super::manifest::canonical_entry_order;
use crate::error::{PipelineError, Result};
use crate::model::archive::order_by_priority;
use crate::model::ArchiveRecord;
use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, error};

/// Records in processing order (prioritized first) and the archives that
/// could not be read.
#[derive(Debug, Default)]
pub struct IndexReport {
    pub records: Vec<ArchiveRecord>,
    pub errors: Vec<PipelineError>,
}

impl IndexReport {
    pub fn prioritized_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_prioritized()).count()
    }
}

/// Open a zip archive, mapping failures onto the pipeline taxonomy.
pub fn open_archive(path: &Path) -> Result<zip::ZipArchive<File>> {
    let file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => PipelineError::ArchiveNotFound {
            path: path.to_path_buf(),
        },
        _ => PipelineError::io(path, e),
    })?;
    zip::ZipArchive::new(file).map_err(|source| PipelineError::CorruptArchive {
        path: path.to_path_buf(),
        source,
    })
}

/// List an archive's entry names in manifest order.
pub fn read_entry_names(path: &Path) -> Result<Vec<String>> {
    let archive = open_archive(path)?;
    Ok(canonical_entry_order(
        archive.file_names().map(|n| n.replace('\\', "/")),
    ))
}

/// Index one archive. On failure the record is empty and the error is
/// returned alongside it.
pub fn index_archive(located: &LocatedArchive) -> (ArchiveRecord, Option<PipelineError>) {
    match read_entry_names(&located.path) {
        Ok(entries) => (
            ArchiveRecord::new(&located.path, Some(located.modified), entries),
            None,
        ),
        Err(err) => {
            error!(
                "[{}] Failed to index {}: {err}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                located.path.display()
            );
            (
                ArchiveRecord::unreadable(&located.path, Some(located.modified)),
                Some(err),
            )
        }
    }
}

/// Index every archive and order the result prioritized-first. The input
/// order is kept within each group.
pub fn index_archives<'a>(archives: impl IntoIterator<Item = &'a LocatedArchive>) -> IndexReport {
    let mut report = IndexReport::default();
    for located in archives {
        let (record, err) = index_archive(located);
        report.records.push(record);
        report.errors.extend(err);
    }
    order_by_priority(&mut report.records);
    debug!(
        "Indexed {} archive(s): {} prioritized, {} error(s)",
        report.records.len(),
        report.prioritized_count(),
        report.errors.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind as PipelineErrorKind;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, files: &[&str]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for name in files {
            if name.ends_with('/') {
                zip.add_directory(name.trim_end_matches('/'), SimpleFileOptions::default())
                    .unwrap();
            } else {
                zip.start_file(*name, SimpleFileOptions::default()).unwrap();
                zip.write_all(b"{}").unwrap();
            }
        }
        zip.finish().unwrap();
    }

    fn located(path: &Path) -> LocatedArchive {
        LocatedArchive {
            path: path.to_path_buf(),
            modified: 1.0,
        }
    }

    #[test]
    fn indexes_real_archive() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("cars.zip");
        write_zip(
            &path,
            &[
                "vehicles/roamer/classic.pc",
                "vehicles/roamer/info.json",
                "vehicles/roamer/",
            ],
        );

        let (record, err) = index_archive(&located(&path));
        assert!(err.is_none());
        assert_eq!(record.entries[0], "vehicles/roamer/");
        assert_eq!(record.folders.len(), 1);
        assert!(record.is_prioritized());
    }

    #[test]
    fn corrupt_archive_yields_empty_record_and_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("broken.zip");
        std::fs::write(&path, b"definitely not a zip").unwrap();

        let (record, err) = index_archive(&located(&path));
        assert!(record.folders.is_empty());
        assert_eq!(err.unwrap().kind(), PipelineErrorKind::CorruptArchive);
    }

    #[test]
    fn missing_archive_is_source_not_found() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (_, err) = index_archive(&located(&tmp.path().join("gone.zip")));
        assert_eq!(err.unwrap().kind(), PipelineErrorKind::SourceNotFound);
    }

    #[test]
    fn prioritized_archives_come_first_and_errors_do_not_stop_batch() {
        let tmp = tempfile::TempDir::new().unwrap();
        let addon = tmp.path().join("addon.zip");
        let base = tmp.path().join("base.zip");
        let broken = tmp.path().join("broken.zip");
        write_zip(&addon, &["vehicles/van/extra.pc"]);
        write_zip(&base, &["vehicles/van/base.pc", "vehicles/van/info.json"]);
        std::fs::write(&broken, b"nope").unwrap();

        let inputs = [located(&addon), located(&broken), located(&base)];
        let report = index_archives(&inputs);
        let ids: Vec<&str> = report.records.iter().map(|r| r.archive_id.as_str()).collect();
        assert_eq!(ids, ["base.zip", "addon.zip", "broken.zip"]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.prioritized_count(), 1);
    }
}
