// drbackup/src/backup/archive.rs
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use glob::Pattern;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tar::Builder;
use walkdir::WalkDir;

use crate::errors::{AppError, Result};

/// Totals for the entries that made it into an archive.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveStats {
    pub file_count: u64,
    pub total_bytes: u64,
}

/// Creates a GZipped TAR archive from a list of source files/directories.
///
/// Each directory source is walked recursively in sorted order. An entry is
/// skipped when any exclude pattern matches its full path or its base name;
/// an excluded directory prunes its whole subtree. File contents are streamed
/// into the tar writer, so peak memory stays bounded by the largest single
/// file rather than the archive size.
///
/// All source paths are checked before the destination file is created, so a
/// missing source never leaves a partial archive behind. Failures later in
/// the walk do: callers are expected to delete the destination on error.
pub fn build_archive(
    sources: &[PathBuf],
    exclude_patterns: &[String],
    archive_dest_path: &Path,
) -> Result<ArchiveStats> {
    let patterns = compile_patterns(exclude_patterns)?;

    for source in sources {
        if !source.exists() {
            return Err(AppError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("source path does not exist: {}", source.display()),
            )));
        }
    }

    ensure_parent_dir(archive_dest_path)?;

    let archive_file = File::create(archive_dest_path)?;
    let enc = GzEncoder::new(archive_file, Compression::default());
    let mut tar_builder = Builder::new(enc);

    let mut stats = ArchiveStats::default();
    for source in sources {
        append_source(&mut tar_builder, source, &patterns, &mut stats)?;
    }

    let encoder = tar_builder.into_inner()?;
    encoder.finish()?;

    Ok(stats)
}

/// Creates a GZipped TAR archive holding a single file under its base name.
/// Used for database dumps, which are always one SQL file per artifact.
pub fn archive_file(input_path: &Path, archive_dest_path: &Path) -> Result<ArchiveStats> {
    if !input_path.is_file() {
        return Err(AppError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("input file does not exist: {}", input_path.display()),
        )));
    }
    let entry_name = input_path.file_name().ok_or_else(|| {
        AppError::Validation(format!("input path has no file name: {}", input_path.display()))
    })?;

    ensure_parent_dir(archive_dest_path)?;

    let archive_out = File::create(archive_dest_path)?;
    let enc = GzEncoder::new(archive_out, Compression::default());
    let mut tar_builder = Builder::new(enc);

    let mut input = File::open(input_path)?;
    let total_bytes = input.metadata()?.len();
    tar_builder.append_file(Path::new(entry_name), &mut input)?;

    let encoder = tar_builder.into_inner()?;
    encoder.finish()?;

    Ok(ArchiveStats { file_count: 1, total_bytes })
}

/// Extracts the regular-file entries of a `.tar.gz` stream into
/// `destination_dir`, flattening each entry to its base name, and returns the
/// path of the last file written. Directories and special entries are
/// ignored. This is the restore-side counterpart of [`archive_file`].
pub fn extract_single_file(archive_path: &Path, destination_dir: &Path) -> Result<PathBuf> {
    if !archive_path.is_file() {
        return Err(AppError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("archive does not exist: {}", archive_path.display()),
        )));
    }
    fs::create_dir_all(destination_dir)?;

    let archive_in = File::open(archive_path)?;
    let gz_decoder = GzDecoder::new(archive_in);
    let mut archive = tar::Archive::new(gz_decoder);

    let mut last_file: Option<PathBuf> = None;
    let entries = archive
        .entries()
        .map_err(|e| AppError::Format(format!("invalid archive: {}", e)))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| AppError::Format(format!("invalid archive entry: {}", e)))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let file_name = entry
            .path()
            .map_err(|e| AppError::Format(format!("invalid entry path: {}", e)))?
            .file_name()
            .map(|name| name.to_os_string());
        let Some(file_name) = file_name else {
            continue;
        };

        let dest_path = destination_dir.join(file_name);
        let mut output = File::create(&dest_path)?;
        io::copy(&mut entry, &mut output).map_err(map_stream_error)?;
        last_file = Some(dest_path);
    }

    last_file.ok_or_else(|| AppError::Archive("archive contains no file entries".to_string()))
}

fn append_source(
    tar_builder: &mut Builder<GzEncoder<File>>,
    source: &Path,
    patterns: &[Pattern],
    stats: &mut ArchiveStats,
) -> Result<()> {
    if source.is_file() {
        if !is_excluded(source, patterns) {
            let size = fs::metadata(source)?.len();
            let mut file = File::open(source)?;
            tar_builder.append_file(entry_name_for(source), &mut file)?;
            stats.file_count += 1;
            stats.total_bytes += size;
        }
        return Ok(());
    }

    let walker = WalkDir::new(source)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_excluded(entry.path(), patterns));

    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        let path = entry.path();
        let name = entry_name_for(path);

        if entry.file_type().is_dir() {
            tar_builder.append_dir(name, path)?;
        } else if entry.file_type().is_file() {
            let size = entry.metadata().map_err(io::Error::from)?.len();
            let mut file = File::open(path)?;
            tar_builder.append_file(name, &mut file)?;
            stats.file_count += 1;
            stats.total_bytes += size;
        }
    }

    Ok(())
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|raw| {
            Pattern::new(raw)
                .map_err(|e| AppError::Validation(format!("invalid exclude pattern {:?}: {}", raw, e)))
        })
        .collect()
}

/// An entry is excluded when any pattern matches its full path or its base
/// name, so `*.log` works without a leading `**/`.
fn is_excluded(path: &Path, patterns: &[Pattern]) -> bool {
    patterns.iter().any(|pattern| {
        if pattern.matches_path(path) {
            return true;
        }
        path.file_name()
            .map(|name| pattern.matches(&name.to_string_lossy()))
            .unwrap_or(false)
    })
}

/// Tar entry names must be relative.
fn entry_name_for(path: &Path) -> &Path {
    path.strip_prefix("/").unwrap_or(path)
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Read failures while draining a compressed stream usually mean the framing
/// is corrupt, not that the disk failed.
fn map_stream_error(e: io::Error) -> AppError {
    match e.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput | io::ErrorKind::UnexpectedEof => {
            AppError::Format(format!("corrupt compressed stream: {}", e))
        }
        _ => AppError::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn entry_names(archive_path: &Path) -> Vec<String> {
        let file = File::open(archive_path).unwrap();
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        archive
            .entries()
            .unwrap()
            .map(|entry| entry.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_single_file_roundtrip_is_byte_identical() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("dump.sql");
        fs::write(&source, b"CREATE TABLE t (id int);\nINSERT INTO t VALUES (1);\n")?;

        let archive_path = dir.path().join("dump.tar.gz");
        let stats = archive_file(&source, &archive_path)?;
        assert_eq!(stats.file_count, 1);
        assert_eq!(stats.total_bytes, fs::metadata(&source)?.len());

        let extract_dir = dir.path().join("extract");
        let extracted = extract_single_file(&archive_path, &extract_dir)?;
        assert_eq!(fs::read(&extracted)?, fs::read(&source)?);
        Ok(())
    }

    #[test]
    fn test_exclude_pattern_matches_base_name() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("data");
        fs::create_dir(&source)?;
        fs::write(source.join("a.log"), b"log line")?;
        fs::write(source.join("b.txt"), b"keep me")?;

        let archive_path = dir.path().join("data.tar.gz");
        let stats = build_archive(
            &[source],
            &["*.log".to_string()],
            &archive_path,
        )?;

        assert_eq!(stats.file_count, 1);
        let names = entry_names(&archive_path);
        assert!(names.iter().any(|n| n.ends_with("b.txt")));
        assert!(!names.iter().any(|n| n.ends_with("a.log")));
        Ok(())
    }

    #[test]
    fn test_excluded_directory_prunes_subtree() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("data");
        fs::create_dir_all(source.join("tmp"))?;
        fs::write(source.join("keep.txt"), b"keep")?;
        fs::write(source.join("tmp").join("x.txt"), b"drop")?;

        let archive_path = dir.path().join("data.tar.gz");
        let stats = build_archive(&[source], &["tmp".to_string()], &archive_path)?;

        assert_eq!(stats.file_count, 1);
        let names = entry_names(&archive_path);
        assert!(names.iter().any(|n| n.ends_with("keep.txt")));
        assert!(!names.iter().any(|n| n.contains("tmp")));
        Ok(())
    }

    #[test]
    fn test_missing_source_fails_before_any_write() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("out.tar.gz");

        let result = build_archive(
            &[dir.path().join("does-not-exist")],
            &[],
            &archive_path,
        );

        assert!(matches!(result, Err(AppError::Io(_))));
        assert!(!archive_path.exists());
    }

    #[test]
    fn test_invalid_exclude_pattern_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = build_archive(
            &[dir.path().to_path_buf()],
            &["[".to_string()],
            &dir.path().join("out.tar.gz"),
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_extract_rejects_archive_without_file_entries() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("empty");
        fs::create_dir(&source)?;

        let archive_path = dir.path().join("empty.tar.gz");
        build_archive(&[source], &[], &archive_path)?;

        let result = extract_single_file(&archive_path, &dir.path().join("extract"));
        assert!(matches!(result, Err(AppError::Archive(_))));
        Ok(())
    }

    #[test]
    fn test_extract_rejects_garbage_input() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let bogus = dir.path().join("bogus.tar.gz");
        fs::write(&bogus, b"this is not a gzip stream at all")?;

        let result = extract_single_file(&bogus, &dir.path().join("extract"));
        assert!(matches!(result, Err(AppError::Format(_))));
        Ok(())
    }

    #[test]
    fn test_extract_returns_last_file_entry() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("data");
        fs::create_dir(&source)?;
        fs::write(source.join("a.sql"), b"first")?;
        fs::write(source.join("b.sql"), b"second")?;

        let archive_path = dir.path().join("data.tar.gz");
        build_archive(&[source], &[], &archive_path)?;

        let extracted = extract_single_file(&archive_path, &dir.path().join("extract"))?;
        assert_eq!(extracted.file_name().unwrap(), "b.sql");
        assert_eq!(fs::read(&extracted)?, b"second");
        Ok(())
    }
}
