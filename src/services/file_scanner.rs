//! Audio input discovery
//!
//! CLI inputs may be individual files or directories; directories are
//! walked recursively. Results are deduplicated and sorted so batch
//! ordering (and everything derived from job index, like seeds) is
//! stable across runs.

use crate::error::{GeneratorError, Result};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// File extensions the pipeline accepts
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["mp3", "wav", "flv", "raw", "ogg", "egg"];

/// Recursive audio file scanner
pub struct FileScanner {
    ignore_patterns: Vec<String>,
}

impl FileScanner {
    /// Create a scanner with default ignore patterns for system litter
    pub fn new() -> Self {
        Self {
            ignore_patterns: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
            ],
        }
    }

    /// Expand CLI inputs into a sorted, deduplicated list of audio files
    ///
    /// A nonexistent input is a hard error; unreadable entries inside a
    /// directory are logged and skipped so one bad subtree does not
    /// abort the scan.
    pub fn scan(&self, inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut found = BTreeSet::new();

        for input in inputs {
            if !input.exists() {
                return Err(GeneratorError::Config(format!(
                    "input path not found: {}",
                    input.display()
                )));
            }

            if input.is_dir() {
                self.scan_directory(input, &mut found);
            } else if is_supported(input) {
                found.insert(input.clone());
            } else {
                tracing::warn!(
                    "Skipping {} (unsupported extension, expected one of: {})",
                    input.display(),
                    SUPPORTED_EXTENSIONS.join(", ")
                );
            }
        }

        Ok(found.into_iter().collect())
    }

    fn scan_directory(&self, root: &Path, found: &mut BTreeSet<PathBuf>) {
        let mut symlink_visited = HashSet::new();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| self.should_process_entry(e, &mut symlink_visited));

        for entry in walker {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() && is_supported(entry.path()) {
                        found.insert(entry.path().to_path_buf());
                    }
                }
                Err(e) => {
                    // Continue scanning, don't abort
                    tracing::warn!("Error accessing entry: {}", e);
                }
            }
        }
    }

    fn should_process_entry(
        &self,
        entry: &DirEntry,
        symlink_visited: &mut HashSet<PathBuf>,
    ) -> bool {
        let file_name = entry.file_name().to_string_lossy();
        for pattern in &self.ignore_patterns {
            if file_name.contains(pattern.as_str()) {
                return false;
            }
        }

        if entry.file_type().is_symlink() {
            if let Ok(canonical) = entry.path().canonicalize() {
                if !symlink_visited.insert(canonical) {
                    tracing::warn!("Symlink loop detected: {}", entry.path().display());
                    return false;
                }
            }
        }

        true
    }
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether the file carries a supported audio extension
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let lower = ext.to_string_lossy().to_lowercase();
            SUPPORTED_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_supported_extension_detection() {
        assert!(is_supported(Path::new("song.mp3")));
        assert!(is_supported(Path::new("song.OGG")));
        assert!(is_supported(Path::new("song.egg")));
        assert!(!is_supported(Path::new("song.txt")));
        assert!(!is_supported(Path::new("noext")));
    }

    #[test]
    fn test_scan_nonexistent_input_is_an_error() {
        let scanner = FileScanner::new();
        let result = scanner.scan(&[PathBuf::from("/nonexistent/input.ogg")]);
        assert!(matches!(result, Err(GeneratorError::Config(_))));
    }

    #[test]
    fn test_scan_walks_directories_and_filters_extensions() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.ogg"), b"x").unwrap();
        fs::write(dir.path().join("sub/b.mp3"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let scanner = FileScanner::new();
        let files = scanner.scan(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|f| f.ends_with("a.ogg")));
        assert!(files.iter().any(|f| f.ends_with("sub/b.mp3")));
    }

    #[test]
    fn test_scan_deduplicates_overlapping_inputs() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.wav");
        fs::write(&file, b"x").unwrap();

        let scanner = FileScanner::new();
        let files = scanner
            .scan(&[dir.path().to_path_buf(), file.clone()])
            .unwrap();
        assert_eq!(files, vec![file]);
    }

    #[test]
    fn test_scan_skips_unsupported_explicit_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("cover.jpg");
        fs::write(&file, b"x").unwrap();

        let scanner = FileScanner::new();
        let files = scanner.scan(&[file]).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_scan_output_is_sorted() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("zed.ogg"), b"x").unwrap();
        fs::write(dir.path().join("alpha.ogg"), b"x").unwrap();

        let scanner = FileScanner::new();
        let files = scanner.scan(&[dir.path().to_path_buf()]).unwrap();
        assert!(files[0].ends_with("alpha.ogg"));
        assert!(files[1].ends_with("zed.ogg"));
    }
}
