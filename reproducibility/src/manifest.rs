//! Chunk manifests: the slice of the collection every engine indexes.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::args::{ensure_parent, path_text};

/// Every file under `chunk_dir` whose file name contains a match for
/// `pattern`, as absolute paths sorted lexicographically.
pub fn collect_chunks(chunk_dir: &Path, pattern: &Regex) -> Result<Vec<PathBuf>> {
    let root = chunk_dir
        .canonicalize()
        .with_context(|| format!("resolving chunk directory {}", chunk_dir.display()))?;

    let mut chunks = Vec::new();
    for entry in WalkDir::new(&root) {
        let entry =
            entry.with_context(|| format!("walking chunk directory {}", root.display()))?;
        let is_file = entry.file_type().is_file()
            || (entry.path_is_symlink() && entry.path().is_file());
        if !is_file {
            continue;
        }
        if pattern.is_match(&entry.file_name().to_string_lossy()) {
            chunks.push(entry.into_path());
        }
    }
    chunks.sort();
    Ok(chunks)
}

/// Write the manifest for `chunk_dir`, replacing any previous one.
pub fn build_chunk_manifest(chunk_dir: &Path, pattern: &str, manifest: &Path) -> Result<Vec<PathBuf>> {
    let regex =
        Regex::new(pattern).with_context(|| format!("compiling chunk pattern {pattern:?}"))?;
    let chunks = collect_chunks(chunk_dir, &regex)?;

    for chunk in &chunks {
        debug!(chunk = %chunk.display(), "Selected chunk");
    }
    if chunks.is_empty() {
        warn!(
            chunk_dir = %chunk_dir.display(),
            pattern,
            "No chunk files matched; writing an empty manifest"
        );
    }

    let lines = chunks
        .iter()
        .map(|chunk| path_text(chunk))
        .collect::<Result<Vec<_>>>()?;

    ensure_parent(manifest)?;
    info!(manifest = %manifest.display(), chunks = chunks.len(), "Writing manifest");
    let mut writer = BufWriter::new(
        File::create(manifest)
            .with_context(|| format!("creating manifest {}", manifest.display()))?,
    );
    for line in &lines {
        writeln!(writer, "{line}")
            .with_context(|| format!("writing manifest {}", manifest.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("flushing manifest {}", manifest.display()))?;

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn chunk_tree() -> Result<tempfile::TempDir> {
        let temp = tempdir().context("creating temp directory")?;
        let chunks = temp.path().join("chunks");
        fs::create_dir_all(chunks.join("sub"))?;
        fs::write(chunks.join("GX001.dat"), "a")?;
        fs::write(chunks.join("readme.txt"), "b")?;
        fs::write(chunks.join("sub").join("GX002.dat"), "c")?;
        Ok(temp)
    }

    #[test]
    fn manifest_lists_matching_files_anywhere_in_tree() -> Result<()> {
        let temp = chunk_tree()?;
        let chunk_dir = temp.path().join("chunks");
        let manifest = temp.path().join("index").join("exp").join("exp-manifest.txt");

        let chunks = build_chunk_manifest(&chunk_dir, "GX.*", &manifest)?;

        let root = chunk_dir.canonicalize()?;
        let expected = vec![root.join("GX001.dat"), root.join("sub").join("GX002.dat")];
        assert_eq!(chunks, expected);

        let written = fs::read_to_string(&manifest)?;
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|line| Path::new(line).is_absolute()));
        assert!(!written.contains("readme.txt"));
        Ok(())
    }

    #[test]
    fn pattern_matches_anywhere_in_file_name_only() -> Result<()> {
        let temp = chunk_tree()?;
        let chunk_dir = temp.path().join("chunks");

        let by_suffix = collect_chunks(&chunk_dir, &Regex::new(r"\.dat")?)?;
        assert_eq!(by_suffix.len(), 2);

        // Directory names are not part of the match.
        let by_dir = collect_chunks(&chunk_dir, &Regex::new("sub")?)?;
        assert!(by_dir.is_empty());
        Ok(())
    }

    #[test]
    fn manifest_is_overwritten() -> Result<()> {
        let temp = chunk_tree()?;
        let chunk_dir = temp.path().join("chunks");
        let manifest = temp.path().join("manifest.txt");
        fs::write(&manifest, "stale\nstale\nstale\n")?;

        build_chunk_manifest(&chunk_dir, "GX001", &manifest)?;

        let written = fs::read_to_string(&manifest)?;
        assert_eq!(written.lines().count(), 1);
        assert!(!written.contains("stale"));
        Ok(())
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn chunk_names_that_are_not_utf8_fail_the_manifest() -> Result<()> {
        use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

        let temp = chunk_tree()?;
        let chunk_dir = temp.path().join("chunks");
        fs::write(chunk_dir.join(OsStr::from_bytes(b"GX\xff.dat")), "d")?;
        let manifest = temp.path().join("manifest.txt");

        let err = build_chunk_manifest(&chunk_dir, "GX.*", &manifest)
            .expect_err("non UTF-8 chunk name must not be written");

        assert!(format!("{err:#}").contains("not valid UTF-8"));
        assert!(!manifest.exists());
        Ok(())
    }

    #[test]
    fn invalid_pattern_and_missing_directory_are_errors() {
        let temp = tempdir().expect("tempdir");
        let manifest = temp.path().join("manifest.txt");

        assert!(build_chunk_manifest(temp.path(), "GX(", &manifest).is_err());
        assert!(build_chunk_manifest(&temp.path().join("absent"), "GX", &manifest).is_err());
    }
}
