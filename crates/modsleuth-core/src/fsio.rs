/// Small file helpers shared by every stage that writes a derived file.
use crate::error::{PipelineError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Write `contents` to a sibling temp file, then rename it over `path`, so
/// readers never observe a half-written file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    let tmp = temp_sibling(path);
    fs::write(&tmp, contents).map_err(|e| PipelineError::io(&tmp, e))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(PipelineError::io(path, e));
    }
    Ok(())
}

/// `<path>.tmp`, in the same directory so the rename stays on one filesystem.
pub fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Remove `path`, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(PipelineError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_replaces_contents_and_leaves_no_temp() {
        let tmp = tempfile::TempDir::new().unwrap();
        let target = tmp.path().join("sub").join("out.txt");
        write_atomic(&target, b"first").unwrap();
        write_atomic(&target, b"second").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "second");
        assert!(!temp_sibling(&target).exists());
    }

    #[test]
    fn removing_missing_file_is_ok() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(!remove_if_exists(&tmp.path().join("nope")).unwrap());
    }
}
