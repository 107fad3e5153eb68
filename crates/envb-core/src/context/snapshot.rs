use std::{
    fs, io,
    path::{Path, PathBuf},
};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::{debug, trace};
use walkdir::WalkDir;

const GITIGNORE: &str = ".gitignore";
const ALWAYS_SKIPPED: &[&str] = &[".git"];

/// Ignore rules of a project, read from its top-level `.gitignore`.
///
/// Supports comments, blank lines, `dir/` patterns and leading-`/` anchoring. Negated
/// patterns are not supported and are skipped.
#[derive(Debug)]
pub(crate) struct IgnoreRules {
    any: GlobSet,
    dirs: GlobSet,
}

impl IgnoreRules {
    pub(crate) fn load(project_root: &Path) -> io::Result<Self> {
        match fs::read_to_string(project_root.join(GITIGNORE)) {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Self::parse(""),
            Err(e) => Err(e),
        }
    }

    pub(crate) fn parse(content: &str) -> io::Result<Self> {
        let mut any = GlobSetBuilder::new();
        let mut dirs = GlobSetBuilder::new();

        for name in ALWAYS_SKIPPED {
            any.add(glob(&format!("**/{name}"))?);
        }

        for raw in content.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with('!') {
                debug!(target: "envb.core.snapshot", pattern = line, "negated ignore pattern skipped");
                continue;
            }

            let (line, dir_only) = match line.strip_suffix('/') {
                Some(rest) => (rest, true),
                None => (line, false),
            };
            let anchored = line.starts_with('/') || line.trim_start_matches('/').contains('/');
            let body = line.trim_start_matches('/');
            if body.is_empty() {
                continue;
            }
            let pattern = if anchored {
                body.to_string()
            } else {
                format!("**/{body}")
            };

            let g = glob(&pattern)?;
            if dir_only {
                dirs.add(g);
            } else {
                any.add(g);
            }
        }

        Ok(Self {
            any: any.build().map_err(io::Error::other)?,
            dirs: dirs.build().map_err(io::Error::other)?,
        })
    }

    /// `relative` is relative to the project root.
    pub(crate) fn is_ignored(&self, relative: &Path, is_dir: bool) -> bool {
        self.any.is_match(relative) || (is_dir && self.dirs.is_match(relative))
    }
}

fn glob(pattern: &str) -> io::Result<globset::Glob> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(io::Error::other)
}

/// Copy `source` into `destination`, skipping ignored entries.
///
/// Ignored directories are pruned, not descended into. Symlinks are recreated, not followed.
/// Returns the number of copied files.
pub(crate) fn copy_tree(source: &Path, destination: &Path, rules: &IgnoreRules) -> io::Result<u64> {
    fs::create_dir_all(destination)?;
    let mut copied = 0;

    let walker = WalkDir::new(source)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || entry
                    .path()
                    .strip_prefix(source)
                    .map(|rel| !rules.is_ignored(rel, entry.file_type().is_dir()))
                    .unwrap_or(false)
        });

    for entry in walker {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target: PathBuf = destination.join(relative);
        let kind = entry.file_type();

        if kind.is_dir() {
            fs::create_dir_all(&target)?;
        } else if kind.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            copied += 1;
            trace!(target: "envb.core.snapshot", path = %relative.display(), "copied");
        }
    }

    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> io::Result<()> {
    let points_to = fs::read_link(link)?;
    std::os::unix::fs::symlink(points_to, target)
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, _target: &Path) -> io::Result<()> {
    debug!(target: "envb.core.snapshot", path = %link.display(), "symlink skipped on this platform");
    Ok(())
}
