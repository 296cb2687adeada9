//! The external benchmark harness seam.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::HarnessConfig;
use crate::domain::error::ExecutionError;
use crate::domain::run::BenchmarkConfig;

/// Bytes of stderr kept on a non-zero exit.
const STDERR_TAIL_BYTES: usize = 2_000;

/// Captured output of a successful (exit 0) harness run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarnessOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Executes one (config, model) benchmark.
///
/// Implementations must not impose their own timeout; the engine bounds
/// every call and drops the future when the limit elapses.
#[async_trait]
pub trait HarnessRunner: Send + Sync {
    async fn run(
        &self,
        config: &BenchmarkConfig,
        model: &str,
    ) -> Result<HarnessOutput, ExecutionError>;
}

/// Agent-adapter selector derived from the model id prefix.
pub fn adapter_for(model: &str) -> &'static str {
    let model = model.to_ascii_lowercase();
    let has = |prefixes: &[&str]| prefixes.iter().any(|p| model.starts_with(p));

    if has(&["claude"]) {
        "claude"
    } else if has(&["gpt", "o1", "o3", "o4"]) {
        "openai"
    } else if has(&["gemini"]) {
        "gemini"
    } else if has(&["llama", "mistral", "qwen"]) {
        "ollama"
    } else {
        "generic"
    }
}

/// Runs the harness as a child process:
/// `<binary> [extra_args] <suite> <scenario> --tier <tier> --agent <adapter> --model <model>`.
#[derive(Debug, Clone)]
pub struct ProcessHarness {
    binary: String,
    extra_args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl ProcessHarness {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            extra_args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            extra_args: config.extra_args.clone(),
            working_dir: config.working_dir.clone(),
        }
    }

    /// Argument vector passed to the binary.
    pub fn args(&self, config: &BenchmarkConfig, model: &str) -> Vec<String> {
        let mut args = self.extra_args.clone();
        args.extend([
            config.suite.clone(),
            config.scenario.clone(),
            "--tier".to_string(),
            config.tier.clone(),
            "--agent".to_string(),
            adapter_for(model).to_string(),
            "--model".to_string(),
            model.to_string(),
        ]);
        args
    }
}

#[async_trait]
impl HarnessRunner for ProcessHarness {
    async fn run(
        &self,
        config: &BenchmarkConfig,
        model: &str,
    ) -> Result<HarnessOutput, ExecutionError> {
        let args = self.args(config, model);
        debug!(binary = %self.binary, args = ?args, "spawning harness");

        let mut command = Command::new(&self.binary);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let child = command
            .spawn()
            .map_err(|e| ExecutionError::Spawn(format!("{}: {}", self.binary, e)))?;
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ExecutionError::Spawn(format!("{}: {}", self.binary, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(ExecutionError::NonZeroExit {
                code: output.status.code(),
                stderr: tail(&stderr, STDERR_TAIL_BYTES).to_string(),
            });
        }
        Ok(HarnessOutput { stdout, stderr })
    }
}

/// Last `max` bytes of `s`, cut on a char boundary.
fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::run::ModelAssignment;

    fn config() -> BenchmarkConfig {
        BenchmarkConfig {
            suite: "web".to_string(),
            suite_type: "implementation".to_string(),
            scenario: "todo-app".to_string(),
            tier: "L1".to_string(),
            models: vec![ModelAssignment::new("gpt-4o", 1.0, 1.0)],
        }
    }

    #[test]
    fn test_adapter_mapping() {
        assert_eq!(adapter_for("claude-sonnet-4"), "claude");
        assert_eq!(adapter_for("gpt-4o"), "openai");
        assert_eq!(adapter_for("o3-mini"), "openai");
        assert_eq!(adapter_for("gemini-2.5-pro"), "gemini");
        assert_eq!(adapter_for("llama3.1:70b"), "ollama");
        assert_eq!(adapter_for("Qwen2.5-coder"), "ollama");
        assert_eq!(adapter_for("deepseek-r1"), "generic");
    }

    #[test]
    fn test_argument_contract() {
        let mut harness = ProcessHarness::new("bench");
        harness.extra_args = vec!["run".to_string()];
        assert_eq!(
            harness.args(&config(), "gpt-4o"),
            vec![
                "run", "web", "todo-app", "--tier", "L1", "--agent", "openai", "--model", "gpt-4o"
            ]
        );
    }

    #[test]
    fn test_tail_respects_char_boundary() {
        assert_eq!(tail("abc", 10), "abc");
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("aé", 1), "");
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let harness = ProcessHarness::new("/nonexistent/specbench-harness");
        let err = harness.run(&config(), "gpt-4o").await.unwrap_err();
        assert!(matches!(err, ExecutionError::Spawn(_)));
    }
}
