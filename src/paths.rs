// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! Canonical locations on a target host. Everything here is a pure function of the cluster name
//! and the host's short name; nothing touches the remote side.

/// Base data directory. Its ownership decides the uid/gid of everything created beneath it.
pub const BASE_PATH: &str = "/var/lib/ceph";

/// Shared staging area for short-lived files (keyrings, monmaps).
pub const TMP_PATH: &str = "/var/lib/ceph/tmp";

/// Parent of every monitor data directory.
pub const MON_PATH: &str = "/var/lib/ceph/mon";

/// Directory holding cluster configuration files.
pub const CONF_DIR: &str = "/etc/ceph";

/// Location of the configuration file for `cluster`.
pub fn conf_path(cluster: &str) -> String {
    format!("{CONF_DIR}/{cluster}.conf")
}

pub mod mon {
    use super::{MON_PATH, TMP_PATH};

    /// Data directory of the monitor for `hostname`, e.g. `/var/lib/ceph/mon/ceph-node1`.
    pub fn path(cluster: &str, hostname: &str) -> String {
        format!("{MON_PATH}/{cluster}-{hostname}")
    }

    /// Marker whose existence means the monitor's data store was initialized.
    pub fn done(cluster: &str, hostname: &str) -> String {
        format!("{}/done", path(cluster, hostname))
    }

    /// Marker recording which init system manages this monitor. The file is named after the init
    /// system, e.g. `/var/lib/ceph/mon/ceph-node1/systemd`.
    pub fn init(cluster: &str, hostname: &str, init: &str) -> String {
        format!("{}/{init}", path(cluster, hostname))
    }

    pub fn keyring(cluster: &str, hostname: &str) -> String {
        format!("{TMP_PATH}/{cluster}-{hostname}.mon.keyring")
    }

    pub fn monmap(cluster: &str, hostname: &str) -> String {
        format!("{TMP_PATH}/{cluster}.{hostname}.monmap")
    }
}
