//! External PDF ↔ SVG conversion via Inkscape.
//!
//! Inkscape is driven as a child process with its 1.x command line
//! (`--export-filename`, `--export-type`). Every invocation is checked: the
//! source must exist and the destination must not before the process is
//! spawned, and a non-zero exit status surfaces as
//! [`DedupError::ConverterFailed`] carrying Inkscape's stderr, so a failed
//! export can never be mistaken for a produced file.
//!
//! The [`SvgConverter`] trait keeps the pipeline testable without an
//! Inkscape installation and leaves room for other converters (poppler's
//! `pdftocairo` speaks the same formats).

use crate::error::DedupError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};
use which::which;

/// Round-trip conversion between PDF and SVG.
pub trait SvgConverter {
    fn pdf_to_svg(&self, pdf: &Path, svg: &Path) -> Result<(), DedupError>;
    fn svg_to_pdf(&self, svg: &Path, pdf: &Path) -> Result<(), DedupError>;
}

/// An Inkscape executable on this machine.
#[derive(Debug, Clone)]
pub struct Inkscape {
    exe: PathBuf,
}

impl Inkscape {
    /// Use the executable at `exe`.
    pub fn new(exe: impl Into<PathBuf>) -> Result<Self, DedupError> {
        let exe = exe.into();
        if !exe.exists() {
            return Err(DedupError::ConverterNotFound {
                detail: format!("no file at '{}'", exe.display()),
            });
        }
        Ok(Self { exe })
    }

    /// Locate `inkscape` on `PATH`.
    pub fn discover() -> Result<Self, DedupError> {
        let exe = which("inkscape").map_err(|e| DedupError::ConverterNotFound {
            detail: e.to_string(),
        })?;
        debug!(exe = %exe.display(), "found inkscape on PATH");
        Ok(Self { exe })
    }

    /// The executable this instance runs.
    pub fn executable(&self) -> &Path {
        &self.exe
    }

    fn run(&self, action: &str, args: Vec<OsString>) -> Result<(), DedupError> {
        debug!(exe = %self.exe.display(), ?args, "running inkscape");
        let output = Command::new(&self.exe).args(&args).output().map_err(|e| {
            DedupError::ConverterFailed {
                action: action.to_string(),
                status: "failed to start".to_string(),
                stderr: e.to_string(),
            }
        })?;

        if !output.status.success() {
            return Err(DedupError::ConverterFailed {
                action: action.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        // Inkscape chats on stderr even on success; keep it at debug.
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!(stderr = %stderr.trim(), "inkscape");
        }
        Ok(())
    }
}

impl SvgConverter for Inkscape {
    fn pdf_to_svg(&self, pdf: &Path, svg: &Path) -> Result<(), DedupError> {
        check_source(pdf)?;
        check_destination(svg)?;
        info!(
            "Converting '{}' to plain SVG at '{}'",
            pdf.display(),
            svg.display()
        );
        self.run(
            "PDF to SVG export",
            vec![
                pdf.as_os_str().to_os_string(),
                OsString::from("--export-plain-svg"),
                export_filename(svg),
            ],
        )
    }

    fn svg_to_pdf(&self, svg: &Path, pdf: &Path) -> Result<(), DedupError> {
        check_source(svg)?;
        check_destination(pdf)?;
        info!(
            "Converting '{}' back to PDF at '{}'",
            svg.display(),
            pdf.display()
        );
        self.run(
            "SVG to PDF export",
            vec![
                svg.as_os_str().to_os_string(),
                OsString::from("--export-type=pdf"),
                export_filename(pdf),
            ],
        )
    }
}

fn export_filename(path: &Path) -> OsString {
    let mut arg = OsString::from("--export-filename=");
    arg.push(path.as_os_str());
    arg
}

fn check_source(path: &Path) -> Result<(), DedupError> {
    if !path.exists() {
        return Err(DedupError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

fn check_destination(path: &Path) -> Result<(), DedupError> {
    if path.exists() {
        return Err(DedupError::DestinationExists {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}
