//! In-process stand-ins for storage, command execution and key generation
//!
//! Used by the unit and integration tests, and handy for driving a registry
//! on a machine without WireGuard installed.

use crate::storage::Storage;
use crate::wireguard::{CommandRunner, ShellCommand};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use wgdesk_common::{Error, KeyProvider, Result};

/// Storage backed by a map
#[derive(Default)]
pub struct MemoryStorage {
    files: Mutex<BTreeMap<String, (String, u32)>>,
    failing: Mutex<HashSet<String>>,
    writes: Mutex<Vec<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write to `name` fail
    pub fn fail_writes_to(&self, name: &str) {
        self.failing.lock().insert(name.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().clear();
    }

    pub fn contents(&self, name: &str) -> Option<String> {
        self.files.lock().get(name).map(|(c, _)| c.clone())
    }

    pub fn mode(&self, name: &str) -> Option<u32> {
        self.files.lock().get(name).map(|(_, m)| *m)
    }

    pub fn insert(&self, name: &str, contents: &str) {
        self.files
            .lock()
            .insert(name.to_string(), (contents.to_string(), 0o600));
    }

    /// Names of successful writes, in order
    pub fn write_log(&self) -> Vec<String> {
        self.writes.lock().clone()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read(&self, name: &str) -> Result<Option<String>> {
        Ok(self.contents(name))
    }

    async fn write(&self, name: &str, contents: &str, mode: u32) -> Result<()> {
        if self.failing.lock().contains(name) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("write to {} refused", name),
            )
            .into());
        }
        self.files
            .lock()
            .insert(name.to_string(), (contents.to_string(), mode));
        self.writes.lock().push(name.to_string());
        Ok(())
    }
}

/// Records every command and answers from a script of prefix matches.
///
/// Unscripted commands succeed with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    calls: Mutex<Vec<ShellCommand>>,
    responses: Mutex<Vec<(String, std::result::Result<String, String>)>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix`; later entries win
    pub fn respond(&self, prefix: &str, response: std::result::Result<&str, &str>) {
        self.responses.lock().push((
            prefix.to_string(),
            response.map(str::to_string).map_err(str::to_string),
        ));
    }

    pub fn calls(&self) -> Vec<ShellCommand> {
        self.calls.lock().clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.script.clone()).collect()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.script.starts_with(prefix))
            .count()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &ShellCommand) -> Result<String> {
        self.calls.lock().push(command.clone());

        let response = self
            .responses
            .lock()
            .iter()
            .rev()
            .find(|(prefix, _)| command.script.starts_with(prefix.as_str()))
            .map(|(_, r)| r.clone());

        match response {
            Some(Ok(out)) => Ok(out),
            Some(Err(message)) => Err(Error::ExternalCommand {
                command: command.script.clone(),
                message,
            }),
            None => Ok(String::new()),
        }
    }
}

/// Predictable keys: `priv-N`, `pub-N`, `psk-N`
#[derive(Default)]
pub struct SequentialKeyProvider {
    next: AtomicU64,
}

impl SequentialKeyProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyProvider for SequentialKeyProvider {
    async fn private_key(&self) -> Result<String> {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(format!("priv-{}", n))
    }

    async fn public_key(&self, private_key: &str) -> Result<String> {
        Ok(private_key.replacen("priv", "pub", 1))
    }

    async fn pre_shared_key(&self) -> Result<String> {
        let n = self.next.load(Ordering::Relaxed);
        Ok(format!("psk-{}", n))
    }
}
