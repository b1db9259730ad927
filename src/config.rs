use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "duelhub", version = "1.0", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: String,

    /// Override the configured number of pool workers
    #[arg(long = "workers", short = 'w')]
    pub workers: Option<usize>,
}

impl CliArgs {
    /// Load the configuration from the specified file
    pub fn to_config(&self) -> std::io::Result<Config> {
        let file = std::fs::File::open(&self.config_path)?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| e.into())
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub dirs: DirConfig,
    pub pool: PoolConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
    pub toolchains: Vec<ToolchainConfig>,
}

impl Config {
    /// Look up the toolchain registered for a source file extension
    pub fn toolchain_for(&self, extension: &str) -> Option<&ToolchainConfig> {
        self.toolchains.iter().find(|t| t.extension == extension)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
}

/// Filesystem layout: the per-role staging directories written by intake, the
/// scaffold template the sandboxes are cloned from, and the log/result store
/// locations.
#[derive(Deserialize, Debug, Clone)]
pub struct DirConfig {
    pub scaffold_dir: PathBuf,
    pub player1_dir: PathBuf,
    pub player2_dir: PathBuf,
    pub judge_dir: PathBuf,
    pub log_dir: PathBuf,
    pub result_dir: PathBuf,
    /// Where per-worker sandboxes are created; defaults to the user cache dir
    pub workspace_dir: Option<PathBuf>,
}

impl DirConfig {
    /// Create every directory the pipeline writes into.
    pub fn ensure(&self) -> std::io::Result<()> {
        for dir in [
            &self.player1_dir,
            &self.player2_dir,
            &self.judge_dir,
            &self.log_dir,
            &self.result_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn staging_dir(&self, role: Role) -> &Path {
        match role {
            Role::Player1 => &self.player1_dir,
            Role::Player2 => &self.player2_dir,
            Role::Judge => &self.judge_dir,
        }
    }
}

/// The three uploaded artifacts of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Player1,
    Player2,
    Judge,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Player1, Role::Player2, Role::Judge];

    pub fn name(&self) -> &'static str {
        match self {
            Role::Player1 => "player1",
            Role::Player2 => "player2",
            Role::Judge => "judge",
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct PoolConfig {
    pub workers: usize,
    #[serde(default = "default_compile_timeout")]
    pub compile_timeout_secs: u64,
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,
}

fn default_compile_timeout() -> u64 {
    30
}

fn default_run_timeout() -> u64 {
    120
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ConsumerConfig {
    /// TCP address of the external consumer's event channel, e.g.
    /// "127.0.0.1:6969". Absent means the pool runs unnotified.
    pub address: Option<String>,
}

/// One toolchain invocation, keyed by source file extension.
///
/// The command is an argv template; occurrences of `%INPUT%`, `%OUTPUT%`,
/// `%OUTPUT_DIR%` and `%OUTPUT_NAME%` are substituted before spawning.
#[derive(Deserialize, Debug, Clone)]
pub struct ToolchainConfig {
    pub extension: String,
    pub command: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let file = std::fs::File::open("data/example.json").unwrap();
        let reader = std::io::BufReader::new(file);
        let config: Config = serde_json::from_reader(reader).unwrap();
        assert_eq!(config.server.bind_address, Some("127.0.0.1".to_string()));
        assert_eq!(config.pool.workers, 2);
        assert_eq!(config.consumer.address, Some("127.0.0.1:6969".to_string()));
        assert_eq!(config.toolchain_for("cpp").unwrap().command[0], "g++");
        assert!(config.toolchain_for("rs").is_none());
    }

    #[test]
    fn test_pool_timeout_defaults() {
        let pool: PoolConfig = serde_json::from_str(r#"{"workers": 4}"#).unwrap();
        assert_eq!(pool.compile_timeout_secs, 30);
        assert_eq!(pool.run_timeout_secs, 120);
    }
}
