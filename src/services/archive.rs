//! Zip archiving of raw downloads. Existing archives are never overwritten;
//! a numeric suffix is probed instead.

use chrono::NaiveDate;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

use crate::error::{AppError, Result};

/// First free archive path for `base`: `base.zip`, `base.1.zip`, ...
pub fn next_archive_path(base: &Path) -> PathBuf {
    let mut candidate = base.with_extension("zip");
    let mut counter = 0;

    while candidate.exists() {
        counter += 1;
        candidate = base.with_extension(format!("{}.zip", counter));
    }

    candidate
}

fn options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Archive one instrument's raw end-of-day download pair.
pub fn archive_eod_pair(
    directory: &Path,
    base_name: &str,
    session_date: NaiveDate,
    unadjusted: &[u8],
    adjusted: &[u8],
) -> Result<PathBuf> {
    let stamp = session_date.format("%Y-%m-%d");
    let path = next_archive_path(&directory.join(format!("{}_{}", base_name, stamp)));

    let file = File::create(&path).map_err(|e| {
        AppError::Io(format!("cannot create zip file '{}': {}", path.display(), e))
    })?;
    let mut zip = zip::ZipWriter::new(file);

    for (suffix, contents) in [("unadjusted", unadjusted), ("adjusted", adjusted)] {
        let entry = format!("{}_{}_{}.csv", base_name, stamp, suffix);
        zip.start_file(entry.as_str(), options())
            .map_err(|e| AppError::Io(format!("cannot create zip entry '{}': {}", entry, e)))?;
        zip.write_all(contents)
            .map_err(|e| AppError::Io(format!("cannot write zip entry '{}': {}", entry, e)))?;
    }

    zip.finish()
        .map_err(|e| AppError::Io(format!("cannot finish zip file '{}': {}", path.display(), e)))?;

    Ok(path)
}

/// Zip a folder (including the folder itself) into `dest`. Returns the
/// number of files archived.
pub fn zip_folder(src_dir: &Path, dest: &Path) -> Result<usize> {
    let file = File::create(dest).map_err(|e| {
        AppError::Io(format!("cannot create zip file '{}': {}", dest.display(), e))
    })?;
    let mut zip = zip::ZipWriter::new(file);

    let parent = src_dir.parent().unwrap_or(Path::new(""));
    let mut count = 0;
    add_directory(&mut zip, src_dir, parent, &mut count)?;

    zip.finish()
        .map_err(|e| AppError::Io(format!("cannot finish zip file '{}': {}", dest.display(), e)))?;

    Ok(count)
}

fn add_directory(
    zip: &mut zip::ZipWriter<File>,
    directory: &Path,
    root: &Path,
    count: &mut usize,
) -> Result<()> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(directory)
        .map_err(|e| {
            AppError::Io(format!(
                "cannot read directory '{}': {}",
                directory.display(),
                e
            ))
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for path in entries {
        if path.is_dir() {
            add_directory(zip, &path, root, count)?;
            continue;
        }

        let relative = path
            .strip_prefix(root)
            .map_err(|e| AppError::Io(format!("cannot relativize '{}': {}", path.display(), e)))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        zip.start_file(name.as_str(), options())
            .map_err(|e| AppError::Io(format!("cannot create zip entry '{}': {}", name, e)))?;

        let mut contents = Vec::new();
        File::open(&path)
            .and_then(|mut f| f.read_to_end(&mut contents))
            .map_err(|e| AppError::Io(format!("cannot read '{}': {}", path.display(), e)))?;
        zip.write_all(&contents)
            .map_err(|e| AppError::Io(format!("cannot write zip entry '{}': {}", name, e)))?;

        *count += 1;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_archive_path_probes_counters() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("cla_2024-06-03");

        assert_eq!(
            next_archive_path(&base),
            dir.path().join("cla_2024-06-03.zip")
        );

        std::fs::write(dir.path().join("cla_2024-06-03.zip"), "x").unwrap();
        assert_eq!(
            next_archive_path(&base),
            dir.path().join("cla_2024-06-03.1.zip")
        );

        std::fs::write(dir.path().join("cla_2024-06-03.1.zip"), "x").unwrap();
        assert_eq!(
            next_archive_path(&base),
            dir.path().join("cla_2024-06-03.2.zip")
        );
    }

    #[test]
    fn test_archive_eod_pair_entries() {
        let dir = tempfile::tempdir().unwrap();
        let session = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();

        let path = archive_eod_pair(dir.path(), "cla_fr_xpar", session, b"raw", b"adj").unwrap();
        assert!(path.exists());

        let mut archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(archive.len(), 2);

        let mut unadjusted = String::new();
        archive
            .by_name("cla_fr_xpar_2024-06-03_unadjusted.csv")
            .unwrap()
            .read_to_string(&mut unadjusted)
            .unwrap();
        assert_eq!(unadjusted, "raw");

        let mut adjusted = String::new();
        archive
            .by_name("cla_fr_xpar_2024-06-03_adjusted.csv")
            .unwrap()
            .read_to_string(&mut adjusted)
            .unwrap();
        assert_eq!(adjusted, "adj");
    }

    #[test]
    fn test_zip_folder_keeps_relative_layout() {
        let dir = tempfile::tempdir().unwrap();
        let downloads = dir.path().join("20240603");
        std::fs::create_dir_all(downloads.join("sub")).unwrap();
        std::fs::write(downloads.join("a.json"), "{}").unwrap();
        std::fs::write(downloads.join("sub/b.json"), "{}").unwrap();

        let dest = dir.path().join("enx_eoi.zip");
        assert_eq!(zip_folder(&downloads, &dest).unwrap(), 2);

        let archive = zip::ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        assert!(names.contains(&"20240603/a.json"));
        assert!(names.contains(&"20240603/sub/b.json"));
    }
}
