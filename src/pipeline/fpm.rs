//! fpm invocation: which flags a packaging run gets.

use std::path::{Path, PathBuf};

use crate::component::Packaging;
use crate::process::Cmd;

/// Row of the packaging decision table. The first matching row wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackagingRow {
    /// In-package bootstrap script and a plain `tar` destination.
    TarWithInPackageScript,
    /// Post-install hook, no dependencies.
    AfterInstall,
    /// Post-install hook plus one `-d` per dependency.
    AfterInstallWithDepends,
    /// Neither; `tar*` destinations are built as `tar`.
    Plain,
}

impl PackagingRow {
    pub fn select(
        in_package_script: bool,
        destination_type: &str,
        bootstrap_script: bool,
        has_depends: bool,
    ) -> Self {
        if in_package_script && destination_type == "tar" {
            PackagingRow::TarWithInPackageScript
        } else if bootstrap_script && !has_depends {
            PackagingRow::AfterInstall
        } else if bootstrap_script {
            PackagingRow::AfterInstallWithDepends
        } else {
            PackagingRow::Plain
        }
    }
}

/// Inputs for one fpm run.
#[derive(Debug, Clone)]
pub struct FpmRequest<'a> {
    pub name: &'a str,
    pub packaging: &'a Packaging,
    pub sources_path: &'a Path,
    /// Directory fpm runs in and writes its output to.
    pub work_dir: &'a Path,
    /// Post-install hook, when one exists.
    pub bootstrap_script: Option<&'a Path>,
    pub in_package_script: bool,
    pub depends: &'a [String],
}

impl FpmRequest<'_> {
    pub fn row(&self) -> PackagingRow {
        PackagingRow::select(
            self.in_package_script,
            &self.packaging.destination_type,
            self.bootstrap_script.is_some(),
            !self.depends.is_empty(),
        )
    }

    /// The fpm command for this request.
    pub fn command(&self) -> Cmd {
        let dest = &self.packaging.destination_type;
        let row = self.row();
        let target = match row {
            PackagingRow::TarWithInPackageScript => "tar",
            PackagingRow::Plain if dest.starts_with("tar") => "tar",
            _ => dest.as_str(),
        };

        let mut cmd = Cmd::new("fpm")
            .args(["-s", self.packaging.source_type.as_str()])
            .args(["-t", target]);

        if let (PackagingRow::AfterInstall | PackagingRow::AfterInstallWithDepends, Some(script)) =
            (row, self.bootstrap_script)
        {
            cmd = cmd.arg("--after-install").arg_path(script);
        }
        if row == PackagingRow::AfterInstallWithDepends {
            tracing::debug!("package dependencies are: {}", self.depends.join(", "));
            for dep in self.depends {
                cmd = cmd.args(["-d", dep.as_str()]);
            }
        }

        cmd.args(["-n", self.name])
            .args(["-v", self.packaging.version.as_str()])
            .arg("-f")
            .arg_path(self.sources_path)
            .dir(self.work_dir)
            .error_msg(&format!("fpm failed to package {}", self.name))
    }

    /// Whether the fpm output must be gzipped afterwards.
    pub fn needs_gzip(&self) -> bool {
        self.row() == PackagingRow::Plain && self.packaging.destination_type == "tar.gz"
    }
}

/// `gzip <name>*` in `work_dir`, with the glob expanded. `None` when
/// nothing matches.
pub fn gzip_command(name: &str, work_dir: &Path) -> Option<Cmd> {
    let mut matches: Vec<PathBuf> = glob::glob(&format!(
        "{}/{}*",
        glob::Pattern::escape(&work_dir.display().to_string()),
        glob::Pattern::escape(name)
    ))
    .ok()?
    .filter_map(|entry| entry.ok())
    .filter(|path| path.is_file())
    .collect();
    matches.sort();

    let files: Vec<String> = matches
        .iter()
        .filter_map(|path| path.file_name())
        .map(|file| file.to_string_lossy().into_owned())
        .collect();
    if files.is_empty() {
        return None;
    }
    Some(
        Cmd::new("gzip")
            .args(files)
            .dir(work_dir)
            .error_msg(&format!("gzip failed for {name}")),
    )
}
