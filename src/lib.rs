// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

pub mod commands;
pub mod config;
pub mod distro;
pub mod init;
pub mod logging;
pub mod mon;
pub mod packages;
pub mod paths;
pub mod remote;
pub mod service;
pub mod test_env;

/// Environment variable that overrides the log filter.
pub const LOG_ENV: &str = "CEPH_DEPLOY_LOG";

/// Gets the path of the deploy configuration file.
pub fn default_config_path() -> String {
    match std::env::var("CEPH_DEPLOY_CONFIG") {
        Ok(conf) => conf,
        Err(_) => match std::env::var("HOME") {
            Ok(home) => format!("{home}/.cephdeploy.toml"),
            Err(_) => ".cephdeploy.toml".to_string(),
        },
    }
}

pub fn default_cluster() -> String {
    match std::env::var("CEPH_DEPLOY_CLUSTER") {
        Ok(cluster) => cluster,
        Err(_) => "ceph".to_string(),
    }
}

pub fn default_ssh_program() -> String {
    match std::env::var("CEPH_DEPLOY_SSH") {
        Ok(ssh) => ssh,
        Err(_) => "ssh".to_string(),
    }
}
