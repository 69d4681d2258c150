// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! A simulated host for tests.
//!
//! [`FakeHost`] implements [`Remote`] over an in-memory filesystem, so the provisioning flows can
//! be driven end to end without a network or root privileges. Every command and every mutating
//! filesystem operation is recorded so tests can assert on exactly what a flow did to the host.

use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;

use crate::remote::{command_to_string, output_to_error, CommandOutput, Remote, RemoteError};

#[derive(Debug, Clone, PartialEq)]
enum NodeKind {
    Dir,
    File(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    uid: u32,
    gid: u32,
    mode: u32,
}

/// One command run on the host, with the timeout it was given.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCommand {
    pub argv: Vec<String>,
    pub timeout: Option<Duration>,
}

impl RecordedCommand {
    pub fn line(&self) -> String {
        command_to_string(&self.argv)
    }
}

/// A change made to the host's filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Makedir(String),
    /// A file was (re)created with the given mode.
    Write(String, u32),
    Chown(String, u32, u32),
    Chmod(String, u32),
    Unlink(String),
}

impl Op {
    pub fn path(&self) -> &str {
        match self {
            Op::Makedir(p) | Op::Unlink(p) => p,
            Op::Write(p, _) | Op::Chown(p, _, _) | Op::Chmod(p, _) => p,
        }
    }
}

#[derive(Debug, Default)]
struct HostState {
    nodes: BTreeMap<String, Node>,
    commands: Vec<RecordedCommand>,
    journal: Vec<Op>,
    /// Command prefixes that exit non-zero, with the stderr they print.
    failures: Vec<(String, String)>,
    /// Command prefixes that never finish.
    hangs: Vec<String>,
    /// Command prefixes with canned stdout.
    responses: Vec<(String, String)>,
}

pub struct FakeHost {
    hostname: String,
    shortname: String,
    state: Mutex<HostState>,
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn parent(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    match path.rsplit_once('/') {
        Some(("", _)) => Some("/".to_string()),
        Some((dir, _)) => Some(dir.to_string()),
        None => None,
    }
}

fn matches_prefix(line: &str, prefix: &str) -> bool {
    line == prefix || line.starts_with(&format!("{prefix} "))
}

impl FakeHost {
    /// A host reachable as `hostname` whose own short name is the first label of it. It starts
    /// with an empty root directory owned by root.
    pub fn new(hostname: &str) -> Self {
        let mut state = HostState::default();
        state.nodes.insert(
            "/".to_string(),
            Node {
                kind: NodeKind::Dir,
                uid: 0,
                gid: 0,
                mode: 0o755,
            },
        );

        FakeHost {
            hostname: hostname.to_string(),
            shortname: hostname.split('.').next().unwrap_or(hostname).to_string(),
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a directory, and any missing parents, owned by `uid`:`gid`.
    pub fn with_dir(self, path: &str, uid: u32, gid: u32) -> Self {
        {
            let mut state = self.state();
            let path = normalize(path);
            state.mkdir_all(&path);
            if let Some(node) = state.nodes.get_mut(&path) {
                node.uid = uid;
                node.gid = gid;
            }
        }
        self
    }

    /// Add a file owned by root, creating its parent directories.
    pub fn with_file(self, path: &str, contents: &str) -> Self {
        {
            let mut state = self.state();
            let path = normalize(path);
            if let Some(dir) = parent(&path) {
                state.mkdir_all(&dir);
            }
            state.nodes.insert(
                path,
                Node {
                    kind: NodeKind::File(contents.to_string()),
                    uid: 0,
                    gid: 0,
                    mode: 0o644,
                },
            );
        }
        self
    }

    /// Make every command starting with the words in `prefix` exit 1, printing `stderr`.
    pub fn fail_command(self, prefix: &str, stderr: &str) -> Self {
        self.state()
            .failures
            .push((prefix.to_string(), stderr.to_string()));
        self
    }

    /// Make every command starting with `prefix` hang until its timeout expires.
    pub fn hang_command(self, prefix: &str) -> Self {
        self.state().hangs.push(prefix.to_string());
        self
    }

    /// Make every command starting with `prefix` print `stdout`.
    pub fn respond(self, prefix: &str, stdout: &str) -> Self {
        self.state()
            .responses
            .push((prefix.to_string(), stdout.to_string()));
        self
    }

    /// A host that looks like a packaged ceph install: the base data directory owned by the
    /// service account, the config directory, an `os-release` describing `os_release`, and PID 1
    /// named `init`.
    pub fn ceph_node(hostname: &str, uid: u32, gid: u32, os_release: &str, init: &str) -> Self {
        FakeHost::new(hostname)
            .with_dir("/var/lib/ceph", uid, gid)
            .with_dir("/etc/ceph", 0, 0)
            .with_file("/etc/os-release", os_release)
            .with_file("/proc/1/comm", &format!("{init}\n"))
            .respond("ceph --version", "ceph version 10.2.11\n")
    }

    /// Stop recognising the previously configured failures.
    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Forget recorded commands and filesystem operations.
    pub fn clear_logs(&self) {
        let mut state = self.state();
        state.commands.clear();
        state.journal.clear();
    }

    pub fn exists(&self, path: &str) -> bool {
        self.state().nodes.contains_key(&normalize(path))
    }

    pub fn file(&self, path: &str) -> Option<String> {
        match self.state().nodes.get(&normalize(path)) {
            Some(Node {
                kind: NodeKind::File(contents),
                ..
            }) => Some(contents.clone()),
            _ => None,
        }
    }

    pub fn owner(&self, path: &str) -> Option<(u32, u32)> {
        self.state()
            .nodes
            .get(&normalize(path))
            .map(|n| (n.uid, n.gid))
    }

    pub fn mode(&self, path: &str) -> Option<u32> {
        self.state().nodes.get(&normalize(path)).map(|n| n.mode)
    }

    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.state().commands.clone()
    }

    /// Every command line run so far, shell quoted.
    pub fn command_lines(&self) -> Vec<String> {
        self.state().commands.iter().map(|c| c.line()).collect()
    }

    /// Number of commands run that start with `prefix`.
    pub fn ran(&self, prefix: &str) -> usize {
        self.command_lines()
            .iter()
            .filter(|line| matches_prefix(line, prefix))
            .count()
    }

    pub fn journal(&self) -> Vec<Op> {
        self.state().journal.clone()
    }

    fn no_such_file(&self, argv: &[&str], path: &str) -> RemoteError {
        output_to_error(
            &self.hostname,
            argv,
            CommandOutput {
                status: Some(1),
                stdout: String::new(),
                stderr: format!("{path}: No such file or directory"),
            },
        )
    }
}

impl HostState {
    fn mkdir_all(&mut self, path: &str) {
        let mut missing = Vec::new();
        let mut current = Some(path.to_string());
        while let Some(dir) = current {
            if self.nodes.contains_key(&dir) {
                break;
            }
            current = parent(&dir);
            missing.push(dir);
        }
        for dir in missing.into_iter().rev() {
            self.nodes.insert(
                dir,
                Node {
                    kind: NodeKind::Dir,
                    uid: 0,
                    gid: 0,
                    mode: 0o755,
                },
            );
        }
    }

    fn is_dir(&self, path: &str) -> bool {
        matches!(
            self.nodes.get(path),
            Some(Node {
                kind: NodeKind::Dir,
                ..
            })
        )
    }
}

#[async_trait]
impl Remote for FakeHost {
    fn hostname(&self) -> &str {
        &self.hostname
    }

    async fn run(
        &self,
        argv: &[&str],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, RemoteError> {
        let line = command_to_string(argv);
        let mut state = self.state();
        state.commands.push(RecordedCommand {
            argv: argv.iter().map(|s| s.to_string()).collect(),
            timeout,
        });

        if state.hangs.iter().any(|p| matches_prefix(&line, p)) {
            return match timeout {
                Some(timeout) => Err(RemoteError::Timeout {
                    host: self.hostname.clone(),
                    command: line,
                    timeout,
                }),
                None => Err(RemoteError::ExecutionStart {
                    host: self.hostname.clone(),
                    command: line,
                    err: std::io::Error::other("connection lost while the command hung"),
                }),
            };
        }

        if let Some((_, stderr)) = state.failures.iter().find(|(p, _)| matches_prefix(&line, p)) {
            return Ok(CommandOutput {
                status: Some(1),
                stdout: String::new(),
                stderr: stderr.clone(),
            });
        }

        // Fetching the monmap leaves the map at the requested path.
        if argv.starts_with(&["ceph"]) && argv.windows(2).any(|w| w == ["mon", "getmap"]) {
            if let Some(pos) = argv.iter().position(|a| *a == "-o") {
                if let Some(path) = argv.get(pos + 1) {
                    let path = normalize(path);
                    if let Some(dir) = parent(&path) {
                        state.mkdir_all(&dir);
                    }
                    state.nodes.insert(
                        path.clone(),
                        Node {
                            kind: NodeKind::File("monmap".to_string()),
                            uid: 0,
                            gid: 0,
                            mode: 0o644,
                        },
                    );
                    state.journal.push(Op::Write(path, 0o644));
                }
            }
        }

        let stdout = state
            .responses
            .iter()
            .find(|(p, _)| matches_prefix(&line, p))
            .map(|(_, out)| out.clone())
            .unwrap_or_default();

        Ok(CommandOutput {
            status: Some(0),
            stdout,
            stderr: String::new(),
        })
    }

    async fn path_exists(&self, path: &str) -> Result<bool, RemoteError> {
        Ok(self.exists(path))
    }

    async fn path_getuid(&self, path: &str) -> Result<u32, RemoteError> {
        self.owner(path)
            .map(|(uid, _)| uid)
            .ok_or_else(|| self.no_such_file(&["stat", "-c", "%u", path], path))
    }

    async fn path_getgid(&self, path: &str) -> Result<u32, RemoteError> {
        self.owner(path)
            .map(|(_, gid)| gid)
            .ok_or_else(|| self.no_such_file(&["stat", "-c", "%g", path], path))
    }

    async fn makedir(&self, path: &str) -> Result<(), RemoteError> {
        let path = normalize(path);
        let mut state = self.state();
        state.mkdir_all(&path);
        state.journal.push(Op::Makedir(path));
        Ok(())
    }

    async fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<(), RemoteError> {
        let key = normalize(path);
        let mut state = self.state();
        match state.nodes.get_mut(&key) {
            Some(node) => {
                node.uid = uid;
                node.gid = gid;
            }
            None => return Err(self.no_such_file(&["chown", path], path)),
        }
        state.journal.push(Op::Chown(key, uid, gid));
        Ok(())
    }

    async fn chmod(&self, path: &str, mode: u32) -> Result<(), RemoteError> {
        let key = normalize(path);
        let mut state = self.state();
        match state.nodes.get_mut(&key) {
            Some(node) => node.mode = mode,
            None => return Err(self.no_such_file(&["chmod", path], path)),
        }
        state.journal.push(Op::Chmod(key, mode));
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<String, RemoteError> {
        self.file(path)
            .ok_or_else(|| self.no_such_file(&["cat", path], path))
    }

    async fn write_file(&self, path: &str, contents: &str, mode: u32) -> Result<(), RemoteError> {
        let key = normalize(path);
        let mut state = self.state();
        let parent_is_dir = parent(&key).is_some_and(|dir| state.is_dir(&dir));
        if !parent_is_dir {
            return Err(self.no_such_file(&["sh", "-c", "cat > \"$1\"", "sh", path], path));
        }

        // Like the real transport, a write replaces any existing file with a fresh one owned by
        // the connecting user.
        state.nodes.insert(
            key.clone(),
            Node {
                kind: NodeKind::File(contents.to_string()),
                uid: 0,
                gid: 0,
                mode,
            },
        );
        state.journal.push(Op::Write(key, mode));
        Ok(())
    }

    async fn unlink(&self, path: &str) -> Result<(), RemoteError> {
        let key = normalize(path);
        let mut state = self.state();
        if state.nodes.remove(&key).is_none() {
            return Err(self.no_such_file(&["rm", path], path));
        }
        state.journal.push(Op::Unlink(key));
        Ok(())
    }

    async fn shortname(&self) -> Result<String, RemoteError> {
        Ok(self.shortname.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_needs_parent_directory() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let host = FakeHost::new("node1.example.com");

        rt.block_on(async {
            assert!(host.write_file("/etc/ceph/ceph.conf", "x", 0o644).await.is_err());
            host.makedir("/etc/ceph").await.unwrap();
            host.write_file("/etc/ceph/ceph.conf", "x", 0o640).await.unwrap();
            assert_eq!(host.shortname().await.unwrap(), "node1");
        });

        assert!(host.exists("/etc"));
        assert_eq!(host.file("/etc/ceph/ceph.conf").as_deref(), Some("x"));
        assert_eq!(
            host.journal(),
            vec![
                Op::Makedir("/etc/ceph".to_string()),
                Op::Write("/etc/ceph/ceph.conf".to_string(), 0o640)
            ]
        );
        assert_eq!(host.mode("/etc/ceph/ceph.conf"), Some(0o640));
    }

    #[test]
    fn command_prefixes() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let host = FakeHost::new("node1")
            .fail_command("ceph-mon", "boom")
            .respond("ceph --version", "ceph version 10.2.11");

        rt.block_on(async {
            let failed = host.run(&["ceph-mon", "--mkfs"], None).await.unwrap();
            assert_eq!(failed.status, Some(1));

            // A prefix matches whole words only.
            let other = host.run(&["ceph-monstore-tool"], None).await.unwrap();
            assert!(other.success());

            let version = host.run(&["ceph", "--version"], None).await.unwrap();
            assert_eq!(version.stdout, "ceph version 10.2.11");
        });

        assert_eq!(host.ran("ceph-mon"), 1);
    }
}
