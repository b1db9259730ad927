use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::config::{DirConfig, Role};

/// Staged source files of one submission, one per role.
#[derive(Debug)]
pub struct SubmissionSources {
    pub player1: PathBuf,
    pub player2: PathBuf,
    pub judge: PathBuf,
}

/// Locate the staged sources for a submission id.
///
/// Intake guarantees exactly one `{id}.{ext}` file per role directory; the
/// extension is whatever the submitter uploaded, so the lookup matches on the
/// file stem.
pub fn resolve_staged(dirs: &DirConfig, id: &str) -> Result<SubmissionSources> {
    let find = |role: Role| -> Result<PathBuf> {
        let dir = dirs.staging_dir(role);
        for entry in fs::read_dir(dir)
            .with_context(|| format!("reading staging dir {}", dir.display()))?
        {
            let path = entry?.path();
            if path.file_stem().is_some_and(|stem| stem == id) {
                return Ok(path);
            }
        }
        Err(anyhow!(
            "no staged {} source for submission {id} in {}",
            role.name(),
            dir.display()
        ))
    };

    Ok(SubmissionSources {
        player1: find(Role::Player1)?,
        player2: find(Role::Player2)?,
        judge: find(Role::Judge)?,
    })
}

/// The two files an orchestrator run produces.
#[derive(Debug, Default)]
pub struct ResultArtifact {
    pub log: Option<String>,
    pub result: Option<String>,
}

/// Why a submission never produced an orchestrator result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    CompileFailed,
    RunFailed,
}

impl FailureKind {
    pub fn status(&self) -> &'static str {
        match self {
            FailureKind::CompileFailed => "compile_failed",
            FailureKind::RunFailed => "run_failed",
        }
    }
}

/// Filesystem locations of per-submission logs and results.
///
/// Each entry is retrieved at most once: `take_*` deletes the file it read.
/// Absence is a normal condition reported as `Ok(None)`.
#[derive(Clone)]
pub struct ResultStore {
    log_dir: PathBuf,
    result_dir: PathBuf,
}

impl ResultStore {
    pub fn new(dirs: &DirConfig) -> Self {
        Self {
            log_dir: dirs.log_dir.clone(),
            result_dir: dirs.result_dir.clone(),
        }
    }

    fn log_path(&self, id: &str) -> PathBuf {
        self.log_dir.join(format!("{id}.txt"))
    }

    fn result_path(&self, id: &str) -> PathBuf {
        self.result_dir.join(format!("{id}.json"))
    }

    /// Persist whatever the run produced; either file may be missing after a
    /// failed run.
    pub fn save(&self, id: &str, artifact: &ResultArtifact) -> Result<()> {
        if let Some(log) = &artifact.log {
            fs::write(self.log_path(id), log)
                .with_context(|| format!("writing log for submission {id}"))?;
        }
        if let Some(result) = &artifact.result {
            fs::write(self.result_path(id), result)
                .with_context(|| format!("writing result for submission {id}"))?;
        }
        Ok(())
    }

    /// Record a pipeline failure as the submission's result, so the consumer
    /// sees compile/run failures through the same channel as real results.
    pub fn save_failure(&self, id: &str, kind: FailureKind, detail: &str) -> Result<()> {
        let record = serde_json::json!({
            "status": kind.status(),
            "detail": detail,
        });
        fs::write(self.result_path(id), record.to_string())
            .with_context(|| format!("writing failure result for submission {id}"))
    }

    pub fn take_log(&self, id: &str) -> Result<Option<String>> {
        read_then_delete(&self.log_path(id))
    }

    pub fn take_result(&self, id: &str) -> Result<Option<String>> {
        read_then_delete(&self.result_path(id))
    }
}

fn read_then_delete(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => {
            fs::remove_file(path)
                .with_context(|| format!("removing retrieved file {}", path.display()))?;
            Ok(Some(content))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}
