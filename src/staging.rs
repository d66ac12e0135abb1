//! Distributed-cache staging.
//!
//! YARN containers start in a scratch directory holding one entry per cached
//! file, named by basename. The stager decides which local files go into the
//! cache and rewrites command tokens that referenced them to `./<basename>`.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::config::SupportArtifacts;

/// Last `/`-separated component of a command token.
pub fn basename(token: &str) -> &str {
    token.rsplit('/').next().unwrap_or(token)
}

/// Answers whether a command token names something on the local file system.
pub trait PathProbe: Send + Sync {
    /// Absolute path for `token` if it exists locally, `None` for literal arguments.
    fn resolve(&self, token: &str) -> Option<PathBuf>;
}

/// [`PathProbe`] backed by the real file system, relative to a fixed working directory.
#[derive(Debug, Clone)]
pub struct LocalFs {
    cwd: PathBuf,
}

impl LocalFs {
    pub fn new() -> io::Result<Self> {
        Ok(Self::with_cwd(std::env::current_dir()?))
    }

    pub fn with_cwd(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into() }
    }
}

impl PathProbe for LocalFs {
    fn resolve(&self, token: &str) -> Option<PathBuf> {
        if token.is_empty() {
            return None;
        }
        let path = Path::new(token);
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        };
        absolute.exists().then(|| normalize(&absolute))
    }
}

/// Lexically drop `.` and fold `..` so different spellings of one file compare equal.
/// Symlinks are left alone; the basename the user typed is the one the container sees.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Split repeated `-f a#b` values into individual paths.
pub fn split_file_groups(groups: &[String]) -> impl Iterator<Item = &str> {
    groups
        .iter()
        .flat_map(|group| group.split('#'))
        .map(str::trim)
        .filter(|f| !f.is_empty())
}

/// Deduplicated set of local paths to upload into the distributed cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StagedFileSet {
    paths: BTreeSet<PathBuf>,
}

impl StagedFileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the path was already staged.
    pub fn insert(&mut self, path: impl Into<PathBuf>) -> bool {
        self.paths.insert(path.into())
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.paths.contains(path.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.paths.iter()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Names the staged entries will have inside a container.
    pub fn basenames(&self) -> BTreeSet<String> {
        self.paths.iter().map(|p| cache_name(p)).collect()
    }

    /// Basenames shared by more than one staged path.
    pub fn collisions(&self) -> BTreeMap<String, Vec<&PathBuf>> {
        let mut by_name: BTreeMap<String, Vec<&PathBuf>> = BTreeMap::new();
        for path in &self.paths {
            by_name.entry(cache_name(path)).or_default().push(path);
        }
        by_name.retain(|_, paths| paths.len() > 1);
        by_name
    }
}

fn cache_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| basename(&path.to_string_lossy()).to_string())
}

/// Result of staging one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Staging {
    pub files: StagedFileSet,
    /// User command with staged tokens replaced by `./<basename>`
    pub command: Vec<String>,
}

pub struct FileStager<'a, P: PathProbe + ?Sized> {
    probe: &'a P,
}

impl<'a, P: PathProbe + ?Sized> FileStager<'a, P> {
    pub fn new(probe: &'a P) -> Self {
        Self { probe }
    }

    /// Build the staged set and rewritten command.
    ///
    /// Tokens that do not resolve are passed through untouched; a typo'd path
    /// surfaces as a missing file inside the container, not here.
    pub fn stage(
        &self,
        command: &[String],
        auto_file_cache: bool,
        file_groups: &[String],
        support: &SupportArtifacts,
    ) -> Staging {
        let mut files = StagedFileSet::new();
        let mut rewritten = command.to_vec();

        if auto_file_cache {
            for token in rewritten.iter_mut() {
                if let Some(path) = self.probe.resolve(token) {
                    let local = format!("./{}", cache_name(&path));
                    if files.insert(path) {
                        tracing::debug!(token = %token, "Caching command file");
                    }
                    *token = local;
                }
            }
        }

        for file in split_file_groups(file_groups) {
            files.insert(self.probe.resolve(file).unwrap_or_else(|| PathBuf::from(file)));
        }

        for artifact in [&support.client_jar, &support.bootstrap_script] {
            let token = artifact.to_string_lossy();
            files.insert(self.probe.resolve(&token).unwrap_or_else(|| artifact.clone()));
        }

        for (name, paths) in files.collisions() {
            tracing::warn!(
                name = %name,
                paths = ?paths,
                "Staged files share a basename, only one will be visible in the container"
            );
        }

        Staging {
            files,
            command: rewritten,
        }
    }
}
