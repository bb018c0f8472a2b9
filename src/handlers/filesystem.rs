//! Filesystem handler: directories, copies, globs and archives.
//!
//! Every operation is idempotent and tolerant of expected absence: creating
//! an existing directory or removing a missing one only logs. Operations run
//! natively first; a permission failure is retried as the equivalent
//! elevated command through the [`Runner`].

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use glob::{MatchOptions, Pattern};
use std::fs::{self, File};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::context::PackContext;
use crate::error::{Error, IoResultExt, Result};
use crate::log::LogContext;
use crate::process::{Cmd, Runner};

/// What currently sits at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PathState {
    pub is_dir: bool,
    pub is_file: bool,
}

impl PathState {
    pub fn exists(&self) -> bool {
        self.is_dir || self.is_file
    }
}

pub struct FilesystemHandler {
    runner: Arc<dyn Runner>,
    log: LogContext,
}

impl FilesystemHandler {
    pub fn new(ctx: &PackContext) -> Self {
        Self {
            runner: ctx.runner().clone(),
            log: ctx.log().clone(),
        }
    }

    pub fn exists(&self, path: &Path) -> PathState {
        let state = PathState {
            is_dir: path.is_dir(),
            is_file: path.is_file(),
        };
        tracing::debug!(
            "checking {}: dir={} file={}",
            path.display(),
            state.is_dir,
            state.is_file
        );
        state
    }

    /// Create `path` recursively unless it is already a directory.
    pub fn ensure_dir(&self, path: &Path) -> Result<()> {
        let _span = self.log.enter();
        if path.is_dir() {
            tracing::debug!("directory {} already exists, skipping", path.display());
            return Ok(());
        }

        tracing::debug!("creating directory {}", path.display());
        let native = match fs::create_dir_all(path) {
            // Lost a race against another creator; fine as long as it is a directory now.
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
            other => other,
        };
        self.with_fallback(
            native,
            || Cmd::new("mkdir").arg("-p").arg_path(path),
            || format!("creating directory '{}'", path.display()),
        )
    }

    /// Recursively delete `path`; a missing directory only logs a warning.
    pub fn remove_dir(&self, path: &Path) -> Result<()> {
        let _span = self.log.enter();
        if !path.is_dir() {
            tracing::warn!("directory {} does not exist, nothing to remove", path.display());
            return Ok(());
        }

        tracing::debug!("removing directory {}", path.display());
        self.with_fallback(
            fs::remove_dir_all(path),
            || Cmd::new("rm").arg("-rf").arg_path(path),
            || format!("removing directory '{}'", path.display()),
        )
    }

    /// Delete every file matching `pattern`. Returns how many were removed.
    pub fn remove_files(&self, pattern: &str) -> Result<usize> {
        let _span = self.log.enter();
        tracing::info!("removing files {}", pattern);

        let mut removed = 0;
        for path in expand(pattern)? {
            if path.is_dir() {
                tracing::warn!("{} is a directory, not removing it", path.display());
                continue;
            }
            self.with_fallback(
                fs::remove_file(&path),
                || Cmd::new("rm").arg("-f").arg_path(&path),
                || format!("removing '{}'", path.display()),
            )?;
            removed += 1;
        }

        if removed == 0 {
            tracing::debug!("no files match {}", pattern);
        }
        Ok(removed)
    }

    /// Copy `src` to `dst` with `cp [-R]` semantics: when `dst` is a
    /// directory the copy lands inside it.
    pub fn copy(&self, src: &Path, dst: &Path, recursive: bool) -> Result<()> {
        let _span = self.log.enter();
        tracing::debug!("copying {} to {}", src.display(), dst.display());

        let meta = fs::symlink_metadata(src)
            .fs_context(|| format!("copying '{}'", src.display()))?;
        let target = match src.file_name() {
            Some(name) if dst.is_dir() => dst.join(name),
            _ => dst.to_path_buf(),
        };

        let native = if meta.is_dir() {
            if !recursive {
                tracing::warn!("omitting directory {}", src.display());
                return Ok(());
            }
            copy_dir_recursive(src, &target)
        } else if meta.file_type().is_symlink() {
            fs::read_link(src).and_then(|link| std::os::unix::fs::symlink(link, &target))
        } else {
            fs::copy(src, &target).map(|_| ())
        };

        self.with_fallback(
            native,
            || {
                let cmd = Cmd::new("cp");
                let cmd = if recursive { cmd.arg("-R") } else { cmd };
                cmd.arg_path(src).arg_path(dst)
            },
            || format!("copying '{}' to '{}'", src.display(), dst.display()),
        )
    }

    /// Copy everything inside `src_dir` into the existing `dst_dir`.
    pub fn copy_contents(&self, src_dir: &Path, dst_dir: &Path) -> Result<()> {
        let mut entries = fs::read_dir(src_dir)
            .fs_context(|| format!("reading directory '{}'", src_dir.display()))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<io::Result<Vec<_>>>()
            .fs_context(|| format!("reading directory '{}'", src_dir.display()))?;
        entries.sort();

        for entry in entries {
            self.copy(&entry, dst_dir, true)?;
        }
        Ok(())
    }

    /// Copy every file matching `pattern` into `dst_dir`.
    pub fn copy_matching(&self, pattern: &str, dst_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut copied = Vec::new();
        for path in expand(pattern)? {
            if let Some(name) = path.file_name() {
                self.copy(&path, dst_dir, true)?;
                copied.push(dst_dir.join(name));
            }
        }
        if copied.is_empty() {
            let _span = self.log.enter();
            tracing::warn!("nothing matches {}", pattern);
        }
        Ok(copied)
    }

    /// Add execute permission, like `chmod +x`.
    pub fn make_executable(&self, path: &Path) -> Result<()> {
        let _span = self.log.enter();
        tracing::debug!("granting execution permissions to {}", path.display());
        let native = fs::metadata(path).and_then(|meta| {
            let mut perms = meta.permissions();
            perms.set_mode(perms.mode() | 0o111);
            fs::set_permissions(path, perms)
        });
        self.with_fallback(
            native,
            || Cmd::new("chmod").arg("+x").arg_path(path),
            || format!("making '{}' executable", path.display()),
        )
    }

    /// Archive `path` (relative to `change_dir`) into `output_file`.
    ///
    /// Gzip compressed, or zstd when `output_file` ends in `.zst`.
    pub fn archive(&self, path: &Path, output_file: &Path, change_dir: &Path) -> Result<()> {
        let _span = self.log.enter();
        tracing::debug!("archiving {} into {}", path.display(), output_file.display());

        let native = File::create(output_file).and_then(|file| {
            if is_zstd(output_file) {
                let mut builder = tar::Builder::new(zstd::stream::Encoder::new(file, 3)?);
                append_tree(&mut builder, change_dir, path)?;
                builder.into_inner()?.finish()?.flush()
            } else {
                let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
                append_tree(&mut builder, change_dir, path)?;
                builder.into_inner()?.finish()?.flush()
            }
        });

        self.with_fallback(
            native,
            || {
                let mode = if is_zstd(output_file) { "--zstd" } else { "-z" };
                Cmd::new("tar")
                    .arg("-C")
                    .arg_path(change_dir)
                    .args([mode, "-cf"])
                    .arg_path(output_file)
                    .arg_path(path)
            },
            || format!("archiving '{}'", output_file.display()),
        )
    }

    /// Extract `input_file` into `change_dir`, creating it if needed.
    pub fn unarchive(&self, input_file: &Path, change_dir: &Path) -> Result<()> {
        self.ensure_dir(change_dir)?;
        let _span = self.log.enter();
        tracing::debug!("extracting {} into {}", input_file.display(), change_dir.display());

        let native = File::open(input_file).and_then(|file| {
            if is_zstd(input_file) {
                tar::Archive::new(zstd::stream::Decoder::new(file)?).unpack(change_dir)
            } else {
                tar::Archive::new(GzDecoder::new(file)).unpack(change_dir)
            }
        });

        self.with_fallback(
            native,
            || {
                let mode = if is_zstd(input_file) { "--zstd" } else { "-z" };
                Cmd::new("tar")
                    .arg("-C")
                    .arg_path(change_dir)
                    .args([mode, "-xf"])
                    .arg_path(input_file)
            },
            || format!("extracting '{}'", input_file.display()),
        )
    }

    /// Entries under `dir` whose file name matches `pattern`, case-insensitively.
    pub fn find_in_dir(&self, dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
        let _span = self.log.enter();
        tracing::debug!("looking for {} in {}", pattern, dir.display());

        let matcher = Pattern::new(pattern)?;
        let options = MatchOptions {
            case_sensitive: false,
            ..MatchOptions::new()
        };

        let mut found = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|err| Error::Io {
                context: format!("walking '{}'", dir.display()),
                source: err.into(),
            })?;
            let name = entry.file_name().to_string_lossy();
            if matcher.matches_with(&name, options) {
                found.push(entry.into_path());
            }
        }
        Ok(found)
    }

    fn with_fallback<C, F>(&self, native: io::Result<()>, fallback: F, context: C) -> Result<()>
    where
        F: FnOnce() -> Cmd,
        C: FnOnce() -> String,
    {
        match native {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                let cmd = fallback();
                tracing::debug!("permission denied, retrying as: {}", cmd);
                if self.runner.execute(&cmd)?.success {
                    Ok(())
                } else {
                    Err(err).fs_context(context)
                }
            }
            Err(err) => Err(err).fs_context(context),
        }
    }
}

fn expand(pattern: &str) -> Result<Vec<PathBuf>> {
    // Unreadable entries are skipped, like a shell glob does.
    Ok(glob::glob(pattern)?.filter_map(|entry| entry.ok()).collect())
}

fn is_zstd(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "zst")
}

/// Recursively copy a directory tree
fn copy_dir_recursive(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else if file_type.is_symlink() {
            let target = fs::read_link(&src_path)?;
            std::os::unix::fs::symlink(target, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
    }

    Ok(())
}

fn append_tree<W: Write>(builder: &mut tar::Builder<W>, root: &Path, path: &Path) -> io::Result<()> {
    builder.follow_symlinks(false);
    for entry in WalkDir::new(root.join(path)).sort_by_file_name() {
        let entry = entry?;
        let name = entry
            .path()
            .strip_prefix(root)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        builder.append_path_with_name(entry.path(), name)?;
    }
    Ok(())
}
