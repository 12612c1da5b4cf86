//! WireGuard tooling
//!
//! Everything that talks to `wg` and `wg-quick` goes through a
//! `CommandRunner`, so the registry can be driven without a kernel module.
//! Secret material is only ever passed on stdin, and stdin is never logged.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;
use wgdesk_common::{Error, KeyProvider, Result};

/// A shell command line plus optional stdin
#[derive(Clone)]
pub struct ShellCommand {
    pub script: String,
    pub stdin: Option<String>,
}

impl ShellCommand {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            stdin: None,
        }
    }

    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

impl std::fmt::Debug for ShellCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellCommand")
            .field("script", &self.script)
            .field("stdin", &self.stdin.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl std::fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.script)
    }
}

/// Runs external commands and captures stdout
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &ShellCommand) -> Result<String>;
}

/// Runs commands through `bash -c`
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self {
            shell: "bash".to_string(),
        }
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &ShellCommand) -> Result<String> {
        debug!("$ {}", command.script);

        let failed = |message: String| Error::ExternalCommand {
            command: command.script.clone(),
            message,
        };

        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(&command.script)
            .stdin(if command.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| failed(e.to_string()))?;

        if let (Some(input), Some(mut stdin)) = (&command.stdin, child.stdin.take()) {
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|e| failed(e.to_string()))?;
            // EOF for the child
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(failed(if stderr.is_empty() {
                output.status.to_string()
            } else {
                stderr
            }));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Single-quote a value for bash
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// `wg` / `wg-quick` operations for one interface
#[derive(Clone)]
pub struct WgCli {
    runner: Arc<dyn CommandRunner>,
    interface: String,
    conf_path: PathBuf,
}

impl WgCli {
    pub fn new(runner: Arc<dyn CommandRunner>, interface: &str, conf_path: &Path) -> Self {
        Self {
            runner,
            interface: interface.to_string(),
            conf_path: conf_path.to_path_buf(),
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn conf(&self) -> String {
        shell_quote(&self.conf_path.to_string_lossy())
    }

    pub async fn up(&self) -> Result<String> {
        self.runner
            .run(&ShellCommand::new(format!("wg-quick up {}", self.conf())))
            .await
    }

    pub async fn down(&self) -> Result<String> {
        self.runner
            .run(&ShellCommand::new(format!("wg-quick down {}", self.conf())))
            .await
    }

    /// Apply the config file to the running interface without dropping sessions
    pub async fn sync(&self) -> Result<String> {
        self.runner
            .run(&ShellCommand::new(format!(
                "wg syncconf {} <(wg-quick strip {})",
                shell_quote(&self.interface),
                self.conf()
            )))
            .await
    }

    pub async fn dump(&self) -> Result<String> {
        self.runner
            .run(&ShellCommand::new(format!(
                "wg show {} dump",
                shell_quote(&self.interface)
            )))
            .await
    }
}

/// Key material from `wg genkey`, `wg pubkey` and `wg genpsk`
#[derive(Clone)]
pub struct WgKeyProvider {
    runner: Arc<dyn CommandRunner>,
}

impl WgKeyProvider {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl KeyProvider for WgKeyProvider {
    async fn private_key(&self) -> Result<String> {
        let out = self.runner.run(&ShellCommand::new("wg genkey")).await?;
        Ok(out.trim().to_string())
    }

    async fn public_key(&self, private_key: &str) -> Result<String> {
        let command = ShellCommand::new("wg pubkey").with_stdin(format!("{}\n", private_key));
        let out = self.runner.run(&command).await?;
        Ok(out.trim().to_string())
    }

    async fn pre_shared_key(&self) -> Result<String> {
        let out = self.runner.run(&ShellCommand::new("wg genpsk")).await?;
        Ok(out.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/etc/wireguard/wg0.conf"), "'/etc/wireguard/wg0.conf'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_debug_redacts_stdin() {
        let command = ShellCommand::new("wg pubkey").with_stdin("SECRET");
        let rendered = format!("{:?}", command);
        assert!(rendered.contains("wg pubkey"));
        assert!(!rendered.contains("SECRET"));
        assert_eq!(command.to_string(), "wg pubkey");
    }

    #[tokio::test]
    async fn test_wg_commands() {
        let runner = Arc::new(ScriptedRunner::new());
        let wg = WgCli::new(runner.clone(), "wg0", Path::new("/etc/wireguard/wg0.conf"));

        wg.down().await.unwrap();
        wg.up().await.unwrap();
        wg.sync().await.unwrap();
        wg.dump().await.unwrap();

        assert_eq!(
            runner.scripts(),
            vec![
                "wg-quick down '/etc/wireguard/wg0.conf'",
                "wg-quick up '/etc/wireguard/wg0.conf'",
                "wg syncconf 'wg0' <(wg-quick strip '/etc/wireguard/wg0.conf')",
                "wg show 'wg0' dump",
            ]
        );
    }

    #[tokio::test]
    async fn test_pubkey_goes_through_stdin() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("wg genkey", Ok("PRIV=\n"));
        runner.respond("wg pubkey", Ok("PUB=\n"));
        runner.respond("wg genpsk", Ok("PSK=\n"));

        let keys = WgKeyProvider::new(runner.clone());
        let triple = keys.triple().await.unwrap();
        assert_eq!(triple.private_key, "PRIV=");
        assert_eq!(triple.public_key, "PUB=");
        assert_eq!(triple.pre_shared_key, "PSK=");

        let calls = runner.calls();
        let pubkey = calls.iter().find(|c| c.script == "wg pubkey").unwrap();
        assert_eq!(pubkey.stdin.as_deref(), Some("PRIV=\n"));
        assert!(calls.iter().all(|c| !c.script.contains("PRIV=")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_runner_reports_failure() {
        let runner = ShellRunner::default();
        let out = runner.run(&ShellCommand::new("echo hello")).await.unwrap();
        assert_eq!(out.trim(), "hello");

        let out = runner
            .run(&ShellCommand::new("cat").with_stdin("piped"))
            .await
            .unwrap();
        assert_eq!(out, "piped");

        let err = runner
            .run(&ShellCommand::new("echo boom >&2; exit 3"))
            .await
            .unwrap_err();
        match err {
            Error::ExternalCommand { message, .. } => assert_eq!(message, "boom"),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
