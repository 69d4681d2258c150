// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! The remote execution facade.
//!
//! Every host-side effect performed by this tool goes through the [`Remote`] trait. An
//! implementation only has to supply a small set of primitives (run a command, stat a path, write
//! a file, ...); the higher level helpers used by the provisioning code (writing the cluster
//! config, staging a keyring, creating marker files) are provided methods composed from those
//! primitives, so every transport behaves identically.

use std::{fmt, time::Duration};

use {async_trait::async_trait, log::debug};

use crate::paths;

pub mod ssh;

/// Directories searched by [`Remote::which`], in order.
const EXECUTABLE_DIRS: [&str; 6] = [
    "/usr/local/bin",
    "/bin",
    "/usr/bin",
    "/usr/local/sbin",
    "/usr/sbin",
    "/sbin",
];

/// The result of running a command on a host, regardless of its exit status.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    /// Exit code of the command, or `None` if it was terminated by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

#[derive(Debug)]
pub struct CommandFailureInfo {
    pub host: String,
    pub command: String,
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl fmt::Display for CommandFailureInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}] command [{}] ", self.host, self.command)?;
        match self.status {
            Some(code) => write!(f, "exited with status {code}")?,
            None => write!(f, "was terminated by a signal")?,
        };
        if !self.stderr.trim().is_empty() {
            write!(f, "; stderr: {}", self.stderr.trim())?;
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RemoteError {
    /// The command could not be started at all, or the channel to the host broke while it ran.
    #[error("[{host}] failed to start execution of [{command}]: {err}")]
    ExecutionStart {
        host: String,
        command: String,
        err: std::io::Error,
    },

    #[error("[{host}] command [{command}] timed out after {timeout:?}")]
    Timeout {
        host: String,
        command: String,
        timeout: Duration,
    },

    #[error("{0}")]
    CommandFailure(Box<CommandFailureInfo>),

    #[error("[{host}] failed to parse output of [{command}]: {reason}")]
    Parse {
        host: String,
        command: String,
        reason: String,
    },

    #[error("[{host}] could not find executable '{executable}'")]
    MissingExecutable { host: String, executable: String },

    #[error("[{host}] config file {path} exists with different content; use --overwrite-conf to overwrite")]
    ConfigExists { host: String, path: String },

    /// The config directory is created by the ceph packages, so its absence means they are not
    /// installed.
    #[error("[{host}] {path} does not exist; could not write config")]
    MissingConfDir { host: String, path: String },
}

/// Render an argv the way a shell would need to see it.
pub fn command_to_string<S: AsRef<str>>(argv: &[S]) -> String {
    shell_words::join(argv.iter().map(|s| s.as_ref()))
}

pub fn output_to_error<S: AsRef<str>>(host: &str, argv: &[S], output: CommandOutput) -> RemoteError {
    RemoteError::CommandFailure(Box::new(CommandFailureInfo {
        host: host.to_string(),
        command: command_to_string(argv),
        status: output.status,
        stdout: output.stdout,
        stderr: output.stderr,
    }))
}

/// A connection to one target host.
#[async_trait]
pub trait Remote: Send + Sync {
    /// The name this connection was opened with. Used to tag log lines and errors; the host's own
    /// idea of its name is [`Remote::shortname`].
    fn hostname(&self) -> &str;

    /// Run `argv` on the host and collect its output. A non-zero exit status is not an error at
    /// this level; a timeout is.
    async fn run(
        &self,
        argv: &[&str],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, RemoteError>;

    async fn path_exists(&self, path: &str) -> Result<bool, RemoteError>;

    async fn path_getuid(&self, path: &str) -> Result<u32, RemoteError>;

    async fn path_getgid(&self, path: &str) -> Result<u32, RemoteError>;

    /// Create `path` and any missing parents. Succeeds if it already exists.
    async fn makedir(&self, path: &str) -> Result<(), RemoteError>;

    async fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<(), RemoteError>;

    async fn chmod(&self, path: &str, mode: u32) -> Result<(), RemoteError>;

    async fn read_file(&self, path: &str) -> Result<String, RemoteError>;

    /// Replace `path` with a file holding `contents`. The file carries `mode` from the moment it
    /// is created; no other mode is ever visible on the host.
    async fn write_file(&self, path: &str, contents: &str, mode: u32) -> Result<(), RemoteError>;

    async fn unlink(&self, path: &str) -> Result<(), RemoteError>;

    /// The host's hostname with any domain stripped.
    async fn shortname(&self) -> Result<String, RemoteError>;

    /// Run `argv` and fail unless it exits zero.
    async fn run_checked(
        &self,
        argv: &[&str],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, RemoteError> {
        debug!(
            "[{}] running command: {}",
            self.hostname(),
            command_to_string(argv)
        );
        let output = self.run(argv, timeout).await?;
        for line in output.stdout.lines().chain(output.stderr.lines()) {
            debug!("[{}] {line}", self.hostname());
        }
        if !output.success() {
            return Err(output_to_error(self.hostname(), argv, output));
        }
        Ok(output)
    }

    /// Whether PID 1 on the host is systemd.
    async fn is_systemd(&self) -> Result<bool, RemoteError> {
        if !self.path_exists("/proc/1/comm").await? {
            return Ok(false);
        }
        let comm = self.read_file("/proc/1/comm").await?;
        Ok(comm.contains("systemd"))
    }

    /// Locate `executable` in the usual binary directories.
    async fn which(&self, executable: &str) -> Result<Option<String>, RemoteError> {
        for dir in EXECUTABLE_DIRS {
            let candidate = format!("{dir}/{executable}");
            if self.path_exists(&candidate).await? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Write the cluster configuration file. An existing file with different contents is only
    /// replaced when `overwrite` is set. The config directory must already exist.
    async fn write_conf(
        &self,
        cluster: &str,
        conf: &str,
        overwrite: bool,
    ) -> Result<(), RemoteError> {
        let path = paths::conf_path(cluster);
        if self.path_exists(&path).await? {
            let old = self.read_file(&path).await?;
            if old != conf && !overwrite {
                return Err(RemoteError::ConfigExists {
                    host: self.hostname().to_string(),
                    path,
                });
            }
        }
        if !self.path_exists(paths::CONF_DIR).await? {
            return Err(RemoteError::MissingConfDir {
                host: self.hostname().to_string(),
                path: paths::CONF_DIR.to_string(),
            });
        }
        self.write_file(&path, conf, 0o644).await?;
        self.chmod(&path, 0o644).await
    }

    /// Stage a monitor keyring, readable only by its owner. The secret is never on disk with a
    /// wider mode.
    async fn write_monitor_keyring(
        &self,
        path: &str,
        keyring: &str,
        uid: u32,
        gid: u32,
    ) -> Result<(), RemoteError> {
        self.write_file(path, keyring, 0o600).await?;
        self.chmod(path, 0o600).await?;
        self.chown(path, uid, gid).await
    }

    /// Create a monitor data directory if it is absent.
    async fn create_mon_path(&self, path: &str, uid: u32, gid: u32) -> Result<(), RemoteError> {
        if !self.path_exists(path).await? {
            self.makedir(path).await?;
            self.chown(path, uid, gid).await?;
        }
        Ok(())
    }

    /// Create the empty done marker if it is absent.
    async fn create_done_path(&self, path: &str, uid: u32, gid: u32) -> Result<(), RemoteError> {
        self.create_marker(path, uid, gid).await
    }

    /// Create the empty init marker if it is absent.
    async fn create_init_path(&self, path: &str, uid: u32, gid: u32) -> Result<(), RemoteError> {
        self.create_marker(path, uid, gid).await
    }

    async fn create_marker(&self, path: &str, uid: u32, gid: u32) -> Result<(), RemoteError> {
        if !self.path_exists(path).await? {
            self.write_file(path, "", 0o644).await?;
            self.chown(path, uid, gid).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_display_includes_stderr() {
        let err = output_to_error(
            "node1",
            &["ceph-mon", "--mkfs"],
            CommandOutput {
                status: Some(1),
                stdout: String::new(),
                stderr: "no keyring\n".to_string(),
            },
        );
        assert_eq!(
            err.to_string(),
            "[node1] command [ceph-mon --mkfs] exited with status 1; stderr: no keyring"
        );
    }

    #[test]
    fn command_quoting() {
        assert_eq!(
            command_to_string(&["sh", "-c", "cat > \"$1\""]),
            "sh -c 'cat > \"$1\"'"
        );
    }
}
