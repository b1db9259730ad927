use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;

use crate::config::ToolchainConfig;

/// Why a source artifact failed to become an executable.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("no usable toolchain: {0}")]
    ToolchainMissing(String),

    #[error("toolchain exited with {status}: {stderr}")]
    NonZeroExit {
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("compilation exceeded {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("toolchain succeeded but produced no executable at {0}")]
    MissingOutput(std::path::PathBuf),

    #[error("compilation i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turn one source file into one standalone executable at `dest`.
///
/// The toolchain is selected by the source's file extension. The invocation
/// is killed when it exceeds `limit`.
pub async fn compile(
    toolchains: &[ToolchainConfig],
    source: &Path,
    dest: &Path,
    limit: Duration,
) -> Result<(), CompileError> {
    let extension = source
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let toolchain = toolchains
        .iter()
        .find(|t| t.extension == extension)
        .ok_or_else(|| {
            CompileError::ToolchainMissing(format!(
                "no toolchain registered for .{extension} ({})",
                source.display()
            ))
        })?;
    if toolchain.command.is_empty() {
        return Err(CompileError::ToolchainMissing(format!(
            "empty command configured for .{extension}"
        )));
    }

    let argv = render_command(&toolchain.command, source, dest);
    log::debug!("compiling {} -> {}", source.display(), dest.display());

    let mut cmd = tokio::process::Command::new(&argv[0]);
    cmd.args(&argv[1..]).stdin(Stdio::null()).kill_on_drop(true);

    let output = match timeout(limit, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
            return Err(CompileError::ToolchainMissing(format!(
                "{} not found in PATH",
                argv[0]
            )));
        }
        Ok(Err(e)) => return Err(CompileError::Io(e)),
        Err(_) => return Err(CompileError::Timeout(limit)),
    };

    if !output.status.success() {
        return Err(CompileError::NonZeroExit {
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    if !dest.exists() {
        return Err(CompileError::MissingOutput(dest.to_path_buf()));
    }
    Ok(())
}

/// Applies placeholder substitutions to a toolchain argv template.
///
/// `%OUTPUT_DIR%`/`%OUTPUT_NAME%` exist for toolchains such as pyinstaller
/// that take the destination as a directory plus a basename.
fn render_command(template: &[String], source: &Path, dest: &Path) -> Vec<String> {
    let source_str = source.to_string_lossy();
    let dest_str = dest.to_string_lossy();
    let dest_dir = dest
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_string_lossy();
    let dest_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut mapping = HashMap::<&str, &str>::new();
    mapping.insert("%INPUT%", source_str.as_ref());
    mapping.insert("%OUTPUT%", dest_str.as_ref());
    mapping.insert("%OUTPUT_DIR%", dest_dir.as_ref());
    mapping.insert("%OUTPUT_NAME%", dest_name.as_str());

    template
        .iter()
        .map(|s| {
            let mut t = s.clone();
            for (k, v) in mapping.iter() {
                t = t.replace(k, v);
            }
            t
        })
        .collect()
}
