mod compile;

pub use compile::{CompileError, compile};

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::time::timeout;

use crate::config::Config;
use crate::store::{ResultArtifact, SubmissionSources};

pub const LOG_FILE: &str = "log.txt";
pub const RESULT_FILE: &str = "result.json";

/// Name of the compiled orchestrator; its source is whatever `gameMaster.*`
/// file the scaffold ships.
const ORCHESTRATOR_BIN: &str = "gameMaster";

/// How the orchestrator subprocess ended.
#[derive(Debug)]
pub enum RunOutcome {
    Exited(std::process::ExitStatus),
    TimedOut,
}

/// A per-worker working directory, cloned from the scaffold template once at
/// pool startup and reused (overwritten) across submissions.
///
/// Holds the compiled player/judge executables in fixed sub-paths plus the
/// compiled orchestrator, and receives `log.txt` / `result.json` after a run.
pub struct Sandbox {
    id: usize,
    dir: PathBuf,
    config: Config,
}

impl Sandbox {
    /// Deep-copy the scaffold into `{workspace}/judge{id}`. A directory left
    /// behind by a previous process is replaced.
    pub fn build(id: usize, config: &Config) -> Result<Self> {
        let dir = workspace_root(config)?.join(format!("judge{id}"));
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .with_context(|| format!("removing stale sandbox {}", dir.display()))?;
        }
        copy_dir_all(&config.dirs.scaffold_dir, &dir).with_context(|| {
            format!(
                "cloning scaffold {} into {}",
                config.dirs.scaffold_dir.display(),
                dir.display()
            )
        })?;
        log::info!("sandbox {id} cloned from scaffold at {}", dir.display());

        Ok(Self {
            id,
            dir,
            config: config.clone(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Compile all four artifacts into their fixed locations, then drop the
    /// staged sources.
    ///
    /// Outputs of the previous run are cleared first, so a failed run can
    /// never surface a prior submission's `result.json`.
    pub async fn populate(&self, sources: &SubmissionSources) -> Result<(), CompileError> {
        self.clear_stale_outputs()?;

        let limit = Duration::from_secs(self.config.pool.compile_timeout_secs);
        let targets = [
            (sources.player1.as_path(), self.dir.join("p1root").join("player1")),
            (sources.player2.as_path(), self.dir.join("p2root").join("player2")),
            (sources.judge.as_path(), self.dir.join("judge")),
        ];
        for (source, dest) in &targets {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            compile(&self.config.toolchains, source, dest, limit).await?;
        }

        let orchestrator_src = self.find_orchestrator_source()?;
        compile(
            &self.config.toolchains,
            &orchestrator_src,
            &self.dir.join(ORCHESTRATOR_BIN),
            limit,
        )
        .await?;

        // staged sources are spent once their executables exist
        for (source, _) in &targets {
            if let Err(e) = fs::remove_file(source) {
                log::warn!(
                    "sandbox {}: could not remove staged source {}: {e}",
                    self.id,
                    source.display()
                );
            }
        }
        Ok(())
    }

    /// Execute the orchestrator with the sandbox as its working directory.
    /// The subprocess is killed once `limit` elapses.
    pub async fn run(&self, limit: Duration) -> Result<RunOutcome> {
        let mut cmd = tokio::process::Command::new(self.dir.join(ORCHESTRATOR_BIN));
        cmd.current_dir(&self.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning orchestrator in sandbox {}", self.id))?;

        let waited = timeout(limit, child.wait()).await;
        match waited {
            Ok(status) => Ok(RunOutcome::Exited(status?)),
            Err(_) => {
                child
                    .kill()
                    .await
                    .with_context(|| format!("killing timed out orchestrator in sandbox {}", self.id))?;
                Ok(RunOutcome::TimedOut)
            }
        }
    }

    /// Read whatever output files the run produced; either may be absent
    /// after a failed run.
    pub fn collect(&self) -> ResultArtifact {
        ResultArtifact {
            log: fs::read_to_string(self.dir.join(LOG_FILE)).ok(),
            result: fs::read_to_string(self.dir.join(RESULT_FILE)).ok(),
        }
    }

    /// Remove the sandbox directory at pool shutdown.
    pub fn teardown(&self) -> Result<()> {
        fs::remove_dir_all(&self.dir)
            .with_context(|| format!("removing sandbox {}", self.dir.display()))
    }

    fn clear_stale_outputs(&self) -> Result<(), CompileError> {
        for name in [LOG_FILE, RESULT_FILE] {
            match fs::remove_file(self.dir.join(name)) {
                Ok(()) => log::debug!("sandbox {}: cleared stale {name}", self.id),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn find_orchestrator_source(&self) -> Result<PathBuf, CompileError> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.file_stem().is_some_and(|stem| stem == ORCHESTRATOR_BIN)
                && path.extension().is_some()
            {
                return Ok(path);
            }
        }
        Err(CompileError::Io(std::io::Error::new(
            ErrorKind::NotFound,
            format!(
                "no orchestrator source ({ORCHESTRATOR_BIN}.*) in sandbox {}",
                self.dir.display()
            ),
        )))
    }
}

/// The configured workspace, or the user cache dir when the config leaves it
/// unset.
fn workspace_root(config: &Config) -> Result<PathBuf> {
    if let Some(dir) = &config.dirs.workspace_dir {
        return Ok(dir.clone());
    }

    use directories::ProjectDirs;
    let proj_dirs =
        ProjectDirs::from("", "", "duelhub").ok_or_else(|| anyhow!("Unable to find user directory"))?;
    Ok(proj_dirs.cache_dir().to_path_buf())
}

fn copy_dir_all(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
