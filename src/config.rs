use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::routing::{Backend, PolicyKind, ThroughputMatrix};

/// Throughput-weighted load balancer for heterogeneous LLM backends
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Server host address
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Server port
    #[arg(short, long, env = "SERVER_PORT", default_value = "8000")]
    pub port: u16,

    /// Routing policy (round_robin, weighted_random)
    #[arg(long, env = "LB_POLICY", default_value = "weighted_random")]
    pub policy: String,

    /// Backend as GPU_TYPE=HOST:PORT, using the built-in throughput profile (repeatable)
    #[arg(short, long = "backend", env = "LB_BACKENDS", value_delimiter = ',')]
    pub backends: Vec<String>,

    /// JSON file listing backends with optional inline throughput tables
    #[arg(short = 'f', long, env = "LB_BACKENDS_FILE")]
    pub backends_file: Option<String>,

    /// SQLite file the decision log is written to at shutdown
    #[arg(long, env = "LB_DECISION_LOG")]
    pub decision_log: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // Routing
    pub policy: PolicyKind,
    pub backends: Vec<Backend>,

    // Decision log
    pub decision_log_path: PathBuf,

    pub log_level: String,
}

/// Entry of the backends file; `tputs` falls back to the built-in profile
#[derive(Debug, Deserialize)]
struct BackendEntry {
    gpu_type: String,
    address: String,
    #[serde(default)]
    tputs: Option<ThroughputMatrix>,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Self::from_args(CliArgs::parse())
    }

    /// Build configuration from parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let policy: PolicyKind = args
            .policy
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;

        let mut backends = Vec::new();
        if let Some(file) = &args.backends_file {
            backends.extend(load_backends_file(&expand_tilde(file))?);
        }
        for spec in args.backends.iter().filter(|s| !s.trim().is_empty()) {
            backends.push(parse_backend_spec(spec)?);
        }

        let decision_log_path = args
            .decision_log
            .map(|s| expand_tilde(&s))
            .unwrap_or_else(default_decision_log_path);

        Ok(Config {
            server_host: args.host,
            server_port: args.port,
            policy,
            backends,
            decision_log_path,
            log_level: args.log_level,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.backends.is_empty() {
            anyhow::bail!(
                "No backends configured (use --backend GPU=HOST:PORT, LB_BACKENDS or --backends-file)"
            );
        }

        for backend in &self.backends {
            backend.validate()?;
        }

        Ok(())
    }
}

/// Parse `GPU_TYPE=HOST:PORT` into a backend with the built-in profile
pub fn parse_backend_spec(spec: &str) -> Result<Backend> {
    let (gpu_type, address) = spec
        .trim()
        .split_once('=')
        .with_context(|| format!("Backend '{}' must look like GPU_TYPE=HOST:PORT", spec))?;

    let (gpu_type, address) = (gpu_type.trim(), address.trim());
    if gpu_type.is_empty() || address.is_empty() {
        anyhow::bail!("Backend '{}' must look like GPU_TYPE=HOST:PORT", spec);
    }

    Ok(Backend::from_profile(gpu_type, address)?)
}

/// Read a JSON array of backends
pub fn load_backends_file(path: &Path) -> Result<Vec<Backend>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read backends file: {}", path.display()))?;

    let entries: Vec<BackendEntry> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse backends file: {}", path.display()))?;

    entries
        .into_iter()
        .map(|entry| -> Result<Backend> {
            match entry.tputs {
                Some(tputs) => Ok(Backend::new(entry.gpu_type, entry.address, tputs)),
                None => Ok(Backend::from_profile(&entry.gpu_type, entry.address)?),
            }
        })
        .collect()
}

/// `logs/lb_<YYYYmmdd_HHMMSS>.sqlite3`
fn default_decision_log_path() -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    PathBuf::from("logs").join(format!("lb_{}.sqlite3", timestamp))
}

/// Expand tilde (~) in file paths to user's home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::profiles::LLAMA2_7B_A100;
    use std::io::Write;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["hetero-lb"];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_expand_tilde() {
        let path = expand_tilde("~/test/file.txt");
        assert!(path.to_string_lossy().contains("test/file.txt"));
        assert!(!path.to_string_lossy().starts_with("~"));

        let path = expand_tilde("/absolute/path");
        assert_eq!(path, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_expand_tilde_just_tilde() {
        // Just "~" without slash should not expand
        assert_eq!(expand_tilde("~"), PathBuf::from("~"));
    }

    #[test]
    fn test_parse_backend_spec() {
        let backend = parse_backend_spec("A10G=3.137.200.198:8000").unwrap();
        assert_eq!(backend.gpu_type, "A10G");
        assert_eq!(backend.address, "3.137.200.198:8000");

        assert!(parse_backend_spec("A10G").is_err());
        assert!(parse_backend_spec("=1.2.3.4:80").is_err());
        assert!(parse_backend_spec("H100=1.2.3.4:80").is_err());
    }

    #[test]
    fn test_from_args_with_backend_flags() {
        let config = Config::from_args(args(&[
            "--policy",
            "round_robin",
            "--backend",
            "A10G=10.0.0.1:8000",
            "--backend",
            "A100=10.0.0.2:8000",
            "--decision-log",
            "/tmp/decisions.sqlite3",
        ]))
        .unwrap();

        assert_eq!(config.policy, PolicyKind::RoundRobin);
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[1].gpu_type, "A100");
        assert_eq!(
            config.decision_log_path,
            PathBuf::from("/tmp/decisions.sqlite3")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_comma_separated_backends() {
        let config =
            Config::from_args(args(&["-b", "A10G=10.0.0.1:8000,A100=10.0.0.2:8000"])).unwrap();
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.policy, PolicyKind::WeightedRandom);
    }

    #[test]
    fn test_validate_rejects_empty_registry() {
        let config = Config::from_args(args(&[])).unwrap();
        assert!(config.validate().is_err());
        assert!(config
            .decision_log_path
            .to_string_lossy()
            .starts_with("logs/lb_"));
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        assert!(Config::from_args(args(&["--policy", "jsq"])).is_err());
    }

    #[test]
    fn test_load_backends_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let content = serde_json::json!([
            {"gpu_type": "A10G", "address": "10.0.0.1:8000"},
            {"gpu_type": "custom", "address": "10.0.0.3:8000", "tputs": LLAMA2_7B_A100},
        ]);
        write!(file, "{}", content).unwrap();

        let backends = load_backends_file(file.path()).unwrap();
        assert_eq!(backends.len(), 2);
        assert_eq!(backends[0].tputs[0][0], 33.96);
        assert_eq!(backends[1].gpu_type, "custom");
        assert_eq!(backends[1].tputs, LLAMA2_7B_A100);
    }

    #[test]
    fn test_load_backends_file_unknown_profile() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"gpu_type": "TPU", "address": "10.0.0.1:8000"}}]"#).unwrap();
        assert!(load_backends_file(file.path()).is_err());
    }
}
