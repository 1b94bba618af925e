// crates/server/src/config.rs
//! Command-line and environment configuration for the server binary.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use scarab_server_jobs::RunnerConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "scarab-server", version, about = "SEO keyword analysis job server")]
pub struct ServerConfig {
    /// Address to bind.
    #[arg(long, env = "SCARAB_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 7000)]
    pub port: u16,

    /// Where uploaded inputs are stored until their job finishes.
    #[arg(long, env = "SCARAB_UPLOADS_DIR", default_value = "uploads")]
    pub uploads_dir: PathBuf,

    /// Where the analyzer writes workbooks; served by the download route.
    #[arg(long, env = "SCARAB_RESULTS_DIR", default_value = "results")]
    pub results_dir: PathBuf,

    #[arg(long, env = "SCARAB_ANALYZER_PROGRAM", default_value = "python")]
    pub analyzer_program: PathBuf,

    /// Script passed as the analyzer's first argument. Empty disables it.
    #[arg(long, env = "SCARAB_ANALYZER_SCRIPT", default_value = "service/analyser.py")]
    pub analyzer_script: String,

    #[arg(long, default_value_t = 3600)]
    pub job_timeout_secs: u64,

    /// Jobs older than this are evicted, whatever their status.
    #[arg(long, default_value_t = 86_400)]
    pub retention_secs: u64,

    #[arg(long, default_value_t = 3600)]
    pub sweep_interval_secs: u64,

    #[arg(long, default_value_t = 4)]
    pub max_concurrent_jobs: usize,

    #[arg(long, default_value_t = 50)]
    pub max_upload_mb: usize,

    #[arg(
        long,
        env = "CORS_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:3000"
    )]
    pub cors_origins: Vec<String>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    pub fn runner_config(&self) -> RunnerConfig {
        let config = RunnerConfig::new(&self.analyzer_program, &self.results_dir)
            .with_timeout(Duration::from_secs(self.job_timeout_secs))
            .with_max_concurrent(self.max_concurrent_jobs);
        match self.analyzer_script.trim() {
            "" => config,
            script => config.with_script(script),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::parse_from(["scarab-server"]);
        assert_eq!(config.job_timeout_secs, 3600);
        assert_eq!(config.retention(), Duration::from_secs(86_400));
        assert_eq!(config.max_concurrent_jobs, 4);
        assert_eq!(config.max_upload_bytes(), 50 * 1024 * 1024);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_runner_config_from_flags() {
        let config = ServerConfig::parse_from([
            "scarab-server",
            "--results-dir",
            "/tmp/scarab-results",
            "--analyzer-program",
            "sh",
            "--analyzer-script",
            "",
            "--job-timeout-secs",
            "5",
            "--max-concurrent-jobs",
            "2",
            "--cors-origins",
            "http://a.test,http://b.test",
        ]);
        let runner = config.runner_config();
        assert_eq!(runner.program, PathBuf::from("sh"));
        assert_eq!(runner.script, None);
        assert_eq!(runner.timeout, Duration::from_secs(5));
        assert_eq!(runner.max_concurrent, 2);
        assert_eq!(runner.results_dir, PathBuf::from("/tmp/scarab-results"));
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
    }
}
