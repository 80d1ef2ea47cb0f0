//! ZIP validation and extraction into the cache directory
//!
//! Extraction is staged: entries are unpacked into a hidden directory next to
//! their destination and only moved into place once the whole archive has
//! been read. A corrupt member therefore leaves the cache as it was.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

const STAGING_DIR_NAME: &str = ".extracting";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("{path} is not a valid ZIP archive: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Extraction task failed: {0}")]
    Task(String),
}

/// Whether the downloaded file is expected to be a ZIP archive, judged by name.
pub fn is_zip_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

/// Remove every `*.xml` file directly inside `dir`. Returns how many were removed.
pub fn purge_stale_xml(dir: &Path) -> std::io::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_xml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
        if path.is_file() && is_xml {
            fs::remove_file(&path)?;
            debug!(path = %path.display(), "Removed stale XML");
            removed += 1;
        }
    }

    if removed > 0 {
        info!(dir = %dir.display(), removed, "Purged XML from previous run");
    }
    Ok(removed)
}

/// Validate and extract `archive` into `dest` on the blocking pool.
pub async fn extract_zip(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || extract_zip_blocking(&archive, &dest))
        .await
        .map_err(|e| ArchiveError::Task(e.to_string()))?
}

/// Validate and extract `archive` into `dest`. Returns the paths placed in
/// `dest` (top-level entries only).
pub fn extract_zip_blocking(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|source| ArchiveError::Invalid {
        path: archive.to_path_buf(),
        source,
    })?;

    info!(archive = %archive.display(), entries = zip.len(), "Extracting archive");

    fs::create_dir_all(dest)?;
    let staging = dest.join(STAGING_DIR_NAME);
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    if let Err(source) = zip.extract(&staging) {
        discard_staging(&staging);
        return Err(ArchiveError::Invalid {
            path: archive.to_path_buf(),
            source,
        });
    }

    let placed = match promote(&staging, dest) {
        Ok(placed) => placed,
        Err(e) => {
            discard_staging(&staging);
            return Err(e.into());
        },
    };
    fs::remove_dir_all(&staging)?;

    info!(dest = %dest.display(), files = placed.len(), "Archive extracted");
    Ok(placed)
}

/// Delete the archive after extraction. Failure is only logged.
pub fn remove_archive(archive: &Path) {
    match fs::remove_file(archive) {
        Ok(()) => debug!(path = %archive.display(), "Archive removed"),
        Err(e) => warn!(path = %archive.display(), error = %e, "Could not remove archive"),
    }
}

fn promote(staging: &Path, dest: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut placed = Vec::new();
    for entry in fs::read_dir(staging)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if target.is_dir() {
            fs::remove_dir_all(&target)?;
        }
        fs::rename(entry.path(), &target)?;
        placed.push(target);
    }
    placed.sort();
    Ok(placed)
}

fn discard_staging(staging: &Path) {
    if let Err(e) = fs::remove_dir_all(staging) {
        warn!(path = %staging.display(), error = %e, "Could not remove staging directory");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, body) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_is_zip_path() {
        assert!(is_zip_path(Path::new("/cache/data-2024.zip")));
        assert!(is_zip_path(Path::new("DATA.ZIP")));
        assert!(!is_zip_path(Path::new("/cache/data.xml")));
        assert!(!is_zip_path(Path::new("/cache/zip")));
    }

    #[test]
    fn test_extract_places_entries_in_dest() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("data.zip");
        write_zip(&archive, &[("a.xml", "<A/>"), ("b.xml", "<B/>")]);

        let placed = extract_zip_blocking(&archive, dir.path()).unwrap();
        assert_eq!(placed, vec![dir.path().join("a.xml"), dir.path().join("b.xml")]);
        assert_eq!(fs::read_to_string(dir.path().join("b.xml")).unwrap(), "<B/>");
        assert!(!dir.path().join(STAGING_DIR_NAME).exists());
    }

    #[test]
    fn test_corrupt_archive_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("data.zip");
        fs::write(&archive, b"this is not a zip archive").unwrap();
        fs::write(dir.path().join("keep.xml"), "<Old/>").unwrap();

        let err = extract_zip_blocking(&archive, dir.path()).unwrap_err();
        assert!(matches!(err, ArchiveError::Invalid { .. }));
        assert_eq!(fs::read_to_string(dir.path().join("keep.xml")).unwrap(), "<Old/>");
        assert!(!dir.path().join(STAGING_DIR_NAME).exists());
    }

    #[test]
    fn test_purge_stale_xml_only_touches_xml() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("old.xml"), "<Old/>").unwrap();
        fs::write(dir.path().join("OLDER.XML"), "<Old/>").unwrap();
        fs::write(dir.path().join("data.zip"), "zip").unwrap();

        assert_eq!(purge_stale_xml(dir.path()).unwrap(), 2);
        assert!(dir.path().join("data.zip").exists());
        assert_eq!(purge_stale_xml(&dir.path().join("missing")).unwrap(), 0);
    }

    #[test]
    fn test_remove_archive_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("gone.zip");
        remove_archive(&archive);
        fs::write(&archive, "zip").unwrap();
        remove_archive(&archive);
        assert!(!archive.exists());
    }

    #[tokio::test]
    async fn test_extract_zip_async() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("data.zip");
        write_zip(&archive, &[("certs.xml", "<Certificates/>")]);

        let placed = extract_zip(&archive, dir.path()).await.unwrap();
        assert_eq!(placed.len(), 1);
    }
}
