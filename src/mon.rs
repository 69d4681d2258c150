// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! Provisioning of a monitor on a single host.
//!
//! Progress is never remembered locally. Each invocation reconstructs the monitor's state from
//! the marker files in its data directory on the host, so running the same provisioning twice,
//! or again after a run that died half way, only performs the work that is still missing.

use std::fmt;

use log::{debug, info, warn};

use crate::{
    distro::Distro,
    init::InitSystem,
    paths,
    remote::{Remote, RemoteError},
    service,
};

/// Lifecycle of a monitor, derived from the markers on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// No done marker: the data store has not been initialized.
    Unconfigured,
    /// The data store was initialized but the run that did it stopped before recording the init
    /// system.
    ServicePending,
    /// Both markers are present.
    Bootstrapped,
}

/// Read the state of the monitor for `hostname` from the host.
pub async fn query_monitor_state(
    remote: &dyn Remote,
    cluster: &str,
    hostname: &str,
    init: InitSystem,
) -> Result<MonitorState, RemoteError> {
    if !remote.path_exists(&paths::mon::done(cluster, hostname)).await? {
        return Ok(MonitorState::Unconfigured);
    }
    if remote
        .path_exists(&paths::mon::init(cluster, hostname, init.as_str()))
        .await?
    {
        Ok(MonitorState::Bootstrapped)
    } else {
        Ok(MonitorState::ServicePending)
    }
}

/// Cluster-wide inputs to provisioning, shared by every host.
#[derive(Debug, Clone)]
pub struct MonArgs {
    pub cluster: String,
    /// Replace an existing, different, cluster config on the host.
    pub overwrite_conf: bool,
    /// Raw contents of the cluster config file.
    pub conf_data: String,
}

/// The step of provisioning that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    ResolveHostname,
    ReadOwnership,
    WriteConf,
    CreateMonPath,
    CheckState,
    CreateTmpPath,
    WriteKeyring,
    FetchMonmap,
    Mkfs,
    CreateDonePath,
    CreateInitPath,
    StartService,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Step::ResolveHostname => "resolving remote hostname",
                Step::ReadOwnership => "reading ownership of the base data directory",
                Step::WriteConf => "writing the cluster config",
                Step::CreateMonPath => "creating the monitor data directory",
                Step::CheckState => "checking the monitor markers",
                Step::CreateTmpPath => "creating the staging directory",
                Step::WriteKeyring => "staging the monitor keyring",
                Step::FetchMonmap => "fetching the monmap",
                Step::Mkfs => "initializing the monitor data store",
                Step::CreateDonePath => "creating the done marker",
                Step::CreateInitPath => "creating the init marker",
                Step::StartService => "starting the monitor service",
            }
        )
    }
}

/// `source` already names the host, so the message only adds the step.
#[derive(thiserror::Error, Debug)]
#[error("{step} failed: {source}")]
pub struct ProvisionError {
    pub host: String,
    pub step: Step,
    pub source: RemoteError,
}

trait AtStep<T> {
    fn at(self, host: &str, step: Step) -> Result<T, ProvisionError>;
}

impl<T> AtStep<T> for Result<T, RemoteError> {
    fn at(self, host: &str, step: Step) -> Result<T, ProvisionError> {
        self.map_err(|source| ProvisionError {
            host: host.to_string(),
            step,
            source,
        })
    }
}

/// How a monitor's data store gets its initial membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bootstrap {
    /// First monitors of a new cluster; membership comes from the config.
    Create,
    /// Joining a running cluster; membership comes from a monmap fetched from it.
    Add,
}

/// Provision a monitor that is one of the initial members of a new cluster.
pub async fn mon_create(
    remote: &dyn Remote,
    distro: &Distro,
    args: &MonArgs,
    monitor_keyring: &str,
) -> Result<(), ProvisionError> {
    provision(remote, distro, args, monitor_keyring, Bootstrap::Create).await
}

/// Provision a monitor and join it to a running cluster.
pub async fn mon_add(
    remote: &dyn Remote,
    distro: &Distro,
    args: &MonArgs,
    monitor_keyring: &str,
) -> Result<(), ProvisionError> {
    provision(remote, distro, args, monitor_keyring, Bootstrap::Add).await
}

async fn provision(
    remote: &dyn Remote,
    distro: &Distro,
    args: &MonArgs,
    monitor_keyring: &str,
    kind: Bootstrap,
) -> Result<(), ProvisionError> {
    let target = remote.hostname();
    let cluster = args.cluster.as_str();

    let hostname = remote
        .shortname()
        .await
        .at(target, Step::ResolveHostname)?;
    debug!("[{target}] remote hostname: {hostname}");

    let path = paths::mon::path(cluster, &hostname);
    let done_path = paths::mon::done(cluster, &hostname);
    let init_path = paths::mon::init(cluster, &hostname, distro.init.as_str());

    // Files created for the monitor take the ownership of the base data directory, which is the
    // service account on packaged installs.
    let uid = remote
        .path_getuid(paths::BASE_PATH)
        .await
        .at(target, Step::ReadOwnership)?;
    let gid = remote
        .path_getgid(paths::BASE_PATH)
        .await
        .at(target, Step::ReadOwnership)?;

    remote
        .write_conf(cluster, &args.conf_data, args.overwrite_conf)
        .await
        .at(target, Step::WriteConf)?;

    remote
        .create_mon_path(&path, uid, gid)
        .await
        .at(target, Step::CreateMonPath)?;

    debug!("[{target}] checking for done path: {done_path}");
    let state = query_monitor_state(remote, cluster, &hostname, distro.init)
        .await
        .at(target, Step::CheckState)?;

    match state {
        MonitorState::Unconfigured => {
            debug!("[{target}] done path does not exist: {done_path}");
            bootstrap(remote, cluster, &hostname, uid, gid, monitor_keyring, kind).await?;
        }
        MonitorState::ServicePending => {
            info!("[{target}] monitor data store exists, init marker missing: {init_path}");
        }
        MonitorState::Bootstrapped => {
            info!("[{target}] monitor already bootstrapped: {done_path}");
        }
    }

    remote
        .create_done_path(&done_path, uid, gid)
        .await
        .at(target, Step::CreateDonePath)?;

    remote
        .create_init_path(&init_path, uid, gid)
        .await
        .at(target, Step::CreateInitPath)?;

    service::start_mon_service(remote, distro.init, cluster, &hostname)
        .await
        .at(target, Step::StartService)
}

/// Stage the keyring (and, when joining, the monmap) and initialize the data store.
async fn bootstrap(
    remote: &dyn Remote,
    cluster: &str,
    hostname: &str,
    uid: u32,
    gid: u32,
    monitor_keyring: &str,
    kind: Bootstrap,
) -> Result<(), ProvisionError> {
    let target = remote.hostname();

    if !remote
        .path_exists(paths::TMP_PATH)
        .await
        .at(target, Step::CreateTmpPath)?
    {
        info!("[{target}] creating tmp path: {}", paths::TMP_PATH);
        remote
            .makedir(paths::TMP_PATH)
            .await
            .at(target, Step::CreateTmpPath)?;
    }

    let keyring = paths::mon::keyring(cluster, hostname);
    info!("[{target}] creating keyring file: {keyring}");
    remote
        .write_monitor_keyring(&keyring, monitor_keyring, uid, gid)
        .await
        .at(target, Step::WriteKeyring)?;

    let monmap = paths::mon::monmap(cluster, hostname);
    let setuser = uid.to_string();
    let setgroup = gid.to_string();
    let mut mkfs = vec!["ceph-mon", "--cluster", cluster, "--mkfs", "-i", hostname];

    if kind == Bootstrap::Add {
        let fetched = remote
            .run_checked(
                &["ceph", "--cluster", cluster, "mon", "getmap", "-o", &monmap],
                None,
            )
            .await
            .at(target, Step::FetchMonmap);
        if let Err(e) = fetched {
            remove_keyring(remote, &keyring).await;
            return Err(e);
        }
        // The monmap stays in the staging directory after use.
        mkfs.extend(["--monmap", monmap.as_str()]);
    }

    mkfs.extend(["--keyring", keyring.as_str()]);

    // Only ask the daemon to drop privileges when there is an account to drop to.
    if uid != 0 {
        mkfs.extend(["--setuser", setuser.as_str()]);
    }
    if gid != 0 {
        mkfs.extend(["--setgroup", setgroup.as_str()]);
    }

    let result = remote.run_checked(&mkfs, None).await;
    remove_keyring(remote, &keyring).await;
    result.at(target, Step::Mkfs)?;

    Ok(())
}

/// Remove a staged keyring. Failing to do so leaves secret material behind but does not undo the
/// work already done, so it is reported and otherwise ignored.
async fn remove_keyring(remote: &dyn Remote, keyring: &str) {
    info!("[{}] unlinking keyring file {keyring}", remote.hostname());
    if let Err(e) = remote.unlink(keyring).await {
        warn!(
            "[{}] could not remove staged keyring {keyring}: {e}",
            remote.hostname()
        );
    }
}

/// Log and return the version of ceph installed on the host.
pub async fn ceph_version(remote: &dyn Remote) -> Result<String, RemoteError> {
    let output = remote.run_checked(&["ceph", "--version"], None).await?;
    let version = output.stdout.trim().to_string();
    info!("[{}] {version}", remote.hostname());
    Ok(version)
}
