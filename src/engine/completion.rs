//! Text-in, text-out boundary to an external text-generation service.
//!
//! Strategies only see the [`CompletionBackend`] trait so the engine and its
//! tests never need the real service. [`CommandBackend`] runs a local CLI
//! (by default `ollama run <model>`) with the prompt on stdin.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::runtime::Handle;

use crate::engine::error::CompletionError;

/// Default bound on a single completion call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Something that turns a prompt into a free-text reply.
pub trait CompletionBackend: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

/// Runs an external program per prompt, writing the prompt to its stdin and
/// returning its stdout. The child is killed when the timeout expires.
///
/// `complete` blocks on `runtime` with [`Handle::block_on`], so it panics when
/// called from inside an async task. Call it (and any game that seats a
/// model-backed player) from a plain thread or `tokio::task::spawn_blocking`.
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    runtime: Handle,
}

impl CommandBackend {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration, runtime: Handle) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
            runtime,
        }
    }

    /// `ollama run <model>`.
    pub fn ollama(model: &str, timeout: Duration, runtime: Handle) -> Self {
        Self::new("ollama", vec!["run".into(), model.into()], timeout, runtime)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    async fn run(&self, prompt: &str) -> Result<String, CompletionError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CompletionError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A child that exits without reading its input is judged by its
            // exit status below, not by the broken pipe.
            if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(CompletionError::ExitStatus {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let reply = String::from_utf8(output.stdout).map_err(|_| CompletionError::InvalidUtf8)?;
        if reply.trim().is_empty() {
            return Err(CompletionError::EmptyReply);
        }
        Ok(reply)
    }
}

impl CompletionBackend for CommandBackend {
    fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let timeout = self.timeout;
        self.runtime.block_on(async {
            match tokio::time::timeout(timeout, self.run(prompt)).await {
                Ok(result) => result,
                Err(_) => Err(CompletionError::Timeout(timeout)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn test_ollama_preset() {
        let rt = runtime();
        let backend = CommandBackend::ollama("gemma2", DEFAULT_TIMEOUT, rt.handle().clone());
        assert_eq!(backend.program(), "ollama");
        assert_eq!(backend.args, vec!["run", "gemma2"]);
    }

    #[test]
    fn test_complete_from_spawn_blocking() {
        let rt = runtime();
        let backend = CommandBackend::new("cat", vec![], Duration::from_secs(5), rt.handle().clone());
        let reply = rt
            .block_on(rt.spawn_blocking(move || backend.complete("I put 12")))
            .unwrap()
            .unwrap();
        assert_eq!(reply, "I put 12");
    }

    #[test]
    fn test_echoes_stdout() {
        let rt = runtime();
        let backend = CommandBackend::new("cat", vec![], Duration::from_secs(5), rt.handle().clone());
        let reply = backend.complete("I contribute 12").unwrap();
        assert_eq!(reply, "I contribute 12");
    }

    #[test]
    fn test_timeout_kills_slow_process() {
        let rt = runtime();
        let backend = CommandBackend::new(
            "sleep",
            vec!["5".into()],
            Duration::from_millis(100),
            rt.handle().clone(),
        );
        let started = std::time::Instant::now();
        let err = backend.complete("ignored").unwrap_err();
        assert!(matches!(err, CompletionError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_missing_program() {
        let rt = runtime();
        let backend = CommandBackend::new(
            "definitely-not-a-real-binary-7f3a",
            vec![],
            Duration::from_secs(1),
            rt.handle().clone(),
        );
        assert!(matches!(
            backend.complete("x").unwrap_err(),
            CompletionError::Spawn { .. }
        ));
    }

    #[test]
    fn test_failing_exit_status() {
        let rt = runtime();
        let backend = CommandBackend::new("false", vec![], Duration::from_secs(5), rt.handle().clone());
        assert!(matches!(
            backend.complete("x").unwrap_err(),
            CompletionError::ExitStatus { .. }
        ));
    }

    #[test]
    fn test_empty_reply() {
        let rt = runtime();
        let backend = CommandBackend::new("true", vec![], Duration::from_secs(5), rt.handle().clone());
        assert!(matches!(
            backend.complete("").unwrap_err(),
            CompletionError::EmptyReply
        ));
    }
}
