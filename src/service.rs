// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use std::time::Duration;

use log::info;

use crate::{
    init::InitSystem,
    paths,
    remote::{Remote, RemoteError},
};

/// Upper bound on any single service manager call. A hung init system must not hang the flow.
pub const SERVICE_TIMEOUT: Duration = Duration::from_secs(7);

/// Start the monitor daemon for `hostname` using the host's init system.
pub async fn start_mon_service(
    remote: &dyn Remote,
    init: InitSystem,
    cluster: &str,
    hostname: &str,
) -> Result<(), RemoteError> {
    let timeout = Some(SERVICE_TIMEOUT);

    match init {
        InitSystem::Sysvinit => {
            let service = remote.which("service").await?.ok_or_else(|| {
                RemoteError::MissingExecutable {
                    host: remote.hostname().to_string(),
                    executable: "service".to_string(),
                }
            })?;
            let conf = paths::conf_path(cluster);
            let instance = format!("mon.{hostname}");
            remote
                .run_checked(&[service.as_str(), "ceph", "-c", &conf, "start", &instance], timeout)
                .await?;
            enable_service(remote, "ceph").await?;
        }
        InitSystem::Upstart => {
            let cluster_arg = format!("cluster={cluster}");
            let id_arg = format!("id={hostname}");
            remote
                .run_checked(
                    &["initctl", "emit", "ceph-mon", &cluster_arg, &id_arg],
                    timeout,
                )
                .await?;
        }
        InitSystem::Systemd => {
            let unit = format!("ceph-mon@{hostname}");
            // The target may already be enabled; enabling again is harmless.
            remote
                .run_checked(&["systemctl", "enable", "ceph.target"], timeout)
                .await?;
            remote
                .run_checked(&["systemctl", "enable", &unit], timeout)
                .await?;
            remote
                .run_checked(&["systemctl", "start", &unit], timeout)
                .await?;
        }
    }

    info!(
        "[{}] started mon.{hostname} via {init}",
        remote.hostname()
    );
    Ok(())
}

/// Make `service` start at boot.
pub async fn enable_service(remote: &dyn Remote, service: &str) -> Result<(), RemoteError> {
    if remote.is_systemd().await? {
        remote
            .run_checked(&["systemctl", "enable", service], Some(SERVICE_TIMEOUT))
            .await?;
    } else {
        remote
            .run_checked(&["chkconfig", service, "on"], Some(SERVICE_TIMEOUT))
            .await?;
    }
    Ok(())
}
