//! Per-test artefact matching.
//!
//! Artefacts are associated with a test purely by file name: a file belongs
//! to a test when its name starts with the test's *artefact prefix*, the
//! dotted test name with `.` replaced by `_` plus a trailing `_`.
//!
//! ```text
//! test name        pkg.mod.test_foo
//! artefact prefix  pkg_mod_test_foo_
//! file             pkg_mod_test_foo_screenshot.png  →  "screenshot.png"
//! ```
//!
//! The directory is listed once with [`ArtefactIndex::scan`]; matching
//! against that listing is pure.

use std::path::{Path, PathBuf};

use tracing::debug;

/// Returns the artefact prefix for a dotted test name.
pub fn artefact_prefix(test_name: &str) -> String {
    let mut prefix = test_name.split('.').collect::<Vec<_>>().join("_");
    prefix.push('_');
    prefix
}

/// A file matched to a test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtefactMatch {
    pub path: PathBuf,
    /// File name with the artefact prefix removed.
    pub display_name: String,
}

/// Filters `files` down to the artefacts belonging to `test_name`.
///
/// Only the file name is compared, and only as a prefix.
pub fn match_artefacts(files: &[PathBuf], test_name: &str) -> Vec<ArtefactMatch> {
    let prefix = artefact_prefix(test_name);

    files
        .iter()
        .filter_map(|path| {
            let file_name = path.file_name()?.to_str()?;
            let display_name = file_name.strip_prefix(prefix.as_str())?;
            Some(ArtefactMatch {
                path: path.clone(),
                display_name: display_name.to_string(),
            })
        })
        .collect()
}

/// Listing of an artefacts directory, taken once per upload.
#[derive(Debug, Clone, Default)]
pub struct ArtefactIndex {
    files: Vec<PathBuf>,
}

impl ArtefactIndex {
    /// An index with no files, used when no directory was configured.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Lists the regular files directly inside `dir`.
    ///
    /// Subdirectories are not descended into. Entries are sorted by path so
    /// upload order does not depend on the filesystem.
    pub async fn scan(dir: &Path) -> std::io::Result<Self> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            // Follows symlinks; dangling links are skipped.
            let is_file = tokio::fs::metadata(&path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false);
            if is_file {
                files.push(path);
            }
        }

        files.sort();
        debug!("Found {} artefact file(s) in {}", files.len(), dir.display());

        Ok(Self { files })
    }

    /// Artefacts belonging to `test_name`.
    pub fn matching(&self, test_name: &str) -> Vec<ArtefactMatch> {
        match_artefacts(&self.files, test_name)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
