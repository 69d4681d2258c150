// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! ssh.rs
//!
//! A [`Remote`] that runs commands through the system `ssh` client, or directly when the target
//! is the machine this program runs on.

use std::{process::Stdio, time::Duration};

use {
    async_trait::async_trait,
    tokio::{io::AsyncWriteExt, process::Command},
};

use super::{command_to_string, output_to_error, CommandOutput, Remote, RemoteError};
use crate::config::SshConfig;

#[derive(Debug, Clone)]
pub struct SshRemote {
    hostname: String,
    username: Option<String>,
    program: String,
    options: Vec<String>,
    /// Run commands directly instead of through ssh.
    local: bool,
    /// Prefix every command with `sudo`.
    sudo: bool,
}

impl SshRemote {
    pub fn new(hostname: &str, username: Option<&str>, ssh: &SshConfig) -> Self {
        SshRemote {
            hostname: hostname.to_string(),
            username: username.map(|u| u.to_string()),
            program: ssh.program.clone(),
            options: ssh.options.clone(),
            local: is_local(hostname),
            sudo: needs_sudo(username),
        }
    }

    /// Override the local/remote decision made by [`SshRemote::new`].
    pub fn with_local(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    fn destination(&self) -> String {
        match &self.username {
            Some(user) => format!("{user}@{}", self.hostname),
            None => self.hostname.clone(),
        }
    }

    /// The full local argv that runs `argv` on the target: the program to spawn first.
    pub fn invocation(&self, argv: &[&str]) -> Vec<String> {
        let mut remote_argv: Vec<String> = Vec::with_capacity(argv.len() + 1);
        if self.sudo {
            remote_argv.push("sudo".to_string());
        }
        remote_argv.extend(argv.iter().map(|s| s.to_string()));

        if self.local {
            return remote_argv;
        }

        let mut invocation = vec![self.program.clone()];
        invocation.extend(self.options.iter().cloned());
        invocation.push(self.destination());
        invocation.push("--".to_string());
        invocation.push(command_to_string(&remote_argv));
        invocation
    }

    async fn exec(
        &self,
        argv: &[&str],
        stdin: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, RemoteError> {
        let invocation = self.invocation(argv);
        let start_error = |err: std::io::Error| RemoteError::ExecutionStart {
            host: self.hostname.clone(),
            command: command_to_string(argv),
            err,
        };

        let mut child = Command::new(&invocation[0])
            .args(&invocation[1..])
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(start_error)?;

        if let Some(data) = stdin {
            let mut pipe = child
                .stdin
                .take()
                .ok_or_else(|| start_error(std::io::Error::other("stdin was not captured")))?;
            pipe.write_all(data.as_bytes()).await.map_err(start_error)?;
            // Closing the pipe lets the remote side see end-of-file.
            drop(pipe);
        }

        let wait = child.wait_with_output();
        let output = match timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| {
                RemoteError::Timeout {
                    host: self.hostname.clone(),
                    command: command_to_string(argv),
                    timeout: limit,
                }
            })?,
            None => wait.await,
        }
        .map_err(start_error)?;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn stat(&self, path: &str, format: &str) -> Result<u32, RemoteError> {
        let argv = ["stat", "-c", format, path];
        let output = self.run_checked(&argv, None).await?;
        output
            .stdout
            .trim()
            .parse::<u32>()
            .map_err(|e| RemoteError::Parse {
                host: self.hostname.clone(),
                command: command_to_string(&argv),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl Remote for SshRemote {
    fn hostname(&self) -> &str {
        &self.hostname
    }

    async fn run(
        &self,
        argv: &[&str],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, RemoteError> {
        self.exec(argv, None, timeout).await
    }

    async fn path_exists(&self, path: &str) -> Result<bool, RemoteError> {
        // The answer travels on stdout so that a failing transport or sudo, which also exit
        // non-zero, is never read as "absent".
        let argv = [
            "sh",
            "-c",
            "if test -e \"$1\"; then echo present; else echo absent; fi",
            "sh",
            path,
        ];
        let output = self.run(&argv, None).await?;
        if !output.success() {
            return Err(output_to_error(&self.hostname, &argv, output));
        }
        parse_exists(&output.stdout).ok_or_else(|| RemoteError::Parse {
            host: self.hostname.clone(),
            command: command_to_string(&argv),
            reason: format!("unexpected output {:?}", output.stdout),
        })
    }

    async fn path_getuid(&self, path: &str) -> Result<u32, RemoteError> {
        self.stat(path, "%u").await
    }

    async fn path_getgid(&self, path: &str) -> Result<u32, RemoteError> {
        self.stat(path, "%g").await
    }

    async fn makedir(&self, path: &str) -> Result<(), RemoteError> {
        self.run_checked(&["mkdir", "-p", path], None).await?;
        Ok(())
    }

    async fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<(), RemoteError> {
        self.run_checked(&["chown", &format!("{uid}:{gid}"), path], None)
            .await?;
        Ok(())
    }

    async fn chmod(&self, path: &str, mode: u32) -> Result<(), RemoteError> {
        self.run_checked(&["chmod", &format!("{mode:o}"), path], None)
            .await?;
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<String, RemoteError> {
        Ok(self.run_checked(&["cat", path], None).await?.stdout)
    }

    async fn write_file(&self, path: &str, contents: &str, mode: u32) -> Result<(), RemoteError> {
        // Write next to the destination and move it into place so readers never see a partial
        // file. The staged file is created private and only then opened up to `mode`.
        let staged = format!("{path}.tmp");
        let mode = format!("{mode:o}");
        let argv = [
            "sh",
            "-c",
            STAGED_WRITE,
            "sh",
            staged.as_str(),
            mode.as_str(),
        ];
        let output = self.exec(&argv, Some(contents), None).await?;
        if !output.success() {
            return Err(output_to_error(&self.hostname, &argv, output));
        }
        self.run_checked(&["mv", "-f", &staged, path], None).await?;
        Ok(())
    }

    async fn unlink(&self, path: &str) -> Result<(), RemoteError> {
        self.run_checked(&["rm", path], None).await?;
        Ok(())
    }

    async fn shortname(&self) -> Result<String, RemoteError> {
        let output = self.run_checked(&["hostname"], None).await?;
        Ok(short_hostname(output.stdout.trim()).to_string())
    }
}

/// Writes stdin to `$1` under a umask that leaves it readable by nobody but its owner, then sets
/// `$2` as its mode. An existing `$1` is removed first so the umask applies to a fresh file.
const STAGED_WRITE: &str = "umask 077 && rm -f \"$1\" && cat > \"$1\" && chmod \"$2\" \"$1\"";

fn parse_exists(stdout: &str) -> Option<bool> {
    match stdout.trim() {
        "present" => Some(true),
        "absent" => Some(false),
        _ => None,
    }
}

fn short_hostname(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

/// Whether `hostname` names the machine this program is running on.
fn is_local(hostname: &str) -> bool {
    if hostname == "localhost" {
        return true;
    }
    match nix::unistd::gethostname() {
        Ok(local) => short_hostname(&local.to_string_lossy()) == short_hostname(hostname),
        Err(_) => false,
    }
}

/// Commands need `sudo` unless they will run as root on the target.
fn needs_sudo(username: Option<&str>) -> bool {
    match username {
        Some(user) => user != "root",
        None => !nix::unistd::Uid::effective().is_root(),
    }
}
