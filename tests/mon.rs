// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::runtime::Runtime;

    use cephdeploy_lib::{
        distro::Distro,
        mon::{
            ceph_version, mon_add, mon_create, query_monitor_state, MonArgs, MonitorState,
            ProvisionError, Step,
        },
        remote::RemoteError,
        test_env::*,
    };

    const CENTOS7: &str = "NAME=\"CentOS Linux\"\nID=\"centos\"\nVERSION_ID=\"7\"\n";
    const CONF: &str = "[global]\nfsid = 1234\nmon initial members = node1\n";
    const KEYRING: &str = "[mon.]\nkey = AQBvaBFZAAAAABAA9VHgwCg3rWn8fMaX8KL01A==\ncaps mon = allow *\n";

    const CONF_PATH: &str = "/etc/ceph/test.conf";
    const MON_DIR: &str = "/var/lib/ceph/mon/test-node1";
    const DONE: &str = "/var/lib/ceph/mon/test-node1/done";
    const INIT: &str = "/var/lib/ceph/mon/test-node1/systemd";
    const STAGED_KEYRING: &str = "/var/lib/ceph/tmp/test-node1.mon.keyring";
    const MONMAP: &str = "/var/lib/ceph/tmp/test.node1.monmap";

    fn args() -> MonArgs {
        MonArgs {
            cluster: "test".to_string(),
            overwrite_conf: false,
            conf_data: CONF.to_string(),
        }
    }

    /// A systemd CentOS 7 host named `node1` whose data directories belong to `uid`:`gid`.
    fn node(uid: u32, gid: u32) -> FakeHost {
        FakeHost::ceph_node("node1.example.com", uid, gid, CENTOS7, "systemd")
    }

    async fn create(host: &FakeHost, args: &MonArgs) -> Result<(), ProvisionError> {
        let distro = Distro::detect(host).await.unwrap();
        mon_create(host, &distro, args, KEYRING).await
    }

    async fn add(host: &FakeHost, args: &MonArgs) -> Result<(), ProvisionError> {
        let distro = Distro::detect(host).await.unwrap();
        mon_add(host, &distro, args, KEYRING).await
    }

    fn mkfs_line(host: &FakeHost) -> String {
        let lines: Vec<String> = host
            .command_lines()
            .into_iter()
            .filter(|l| l.starts_with("ceph-mon "))
            .collect();
        assert_eq!(lines.len(), 1, "expected exactly one mkfs, got {lines:?}");
        lines[0].clone()
    }

    #[test]
    fn create_end_to_end() {
        let rt = Runtime::new().unwrap();
        let host = node(167, 167);

        rt.block_on(async { create(&host, &args()).await.unwrap() });

        assert_eq!(host.file(CONF_PATH).as_deref(), Some(CONF));
        assert_eq!(host.mode(CONF_PATH), Some(0o644));
        assert_eq!(host.owner(MON_DIR), Some((167, 167)));
        assert_eq!(host.owner(DONE), Some((167, 167)));
        assert_eq!(host.owner(INIT), Some((167, 167)));
        assert!(!host.exists(STAGED_KEYRING));

        assert_eq!(
            mkfs_line(&host),
            format!(
                "ceph-mon --cluster test --mkfs -i node1 --keyring {STAGED_KEYRING} \
                 --setuser 167 --setgroup 167"
            )
        );

        let service: Vec<_> = host
            .commands()
            .into_iter()
            .filter(|c| c.argv[0] == "systemctl")
            .collect();
        assert_eq!(
            service.iter().map(|c| c.line()).collect::<Vec<_>>(),
            vec![
                "systemctl enable ceph.target",
                "systemctl enable ceph-mon@node1",
                "systemctl start ceph-mon@node1",
            ]
        );
        assert!(service
            .iter()
            .all(|c| c.timeout == Some(Duration::from_secs(7))));
    }

    #[test]
    fn keyring_is_private_and_removed_before_markers() {
        let rt = Runtime::new().unwrap();
        let host = node(167, 167);

        rt.block_on(async { create(&host, &args()).await.unwrap() });

        let journal = host.journal();
        let position = |op: &Op| journal.iter().position(|o| o == op).unwrap();

        // The keyring is created private; it is never written with a wider mode first.
        let written = position(&Op::Write(STAGED_KEYRING.to_string(), 0o600));
        let owned = position(&Op::Chown(STAGED_KEYRING.to_string(), 167, 167));
        let removed = position(&Op::Unlink(STAGED_KEYRING.to_string()));
        let done = position(&Op::Write(DONE.to_string(), 0o644));
        let init = position(&Op::Write(INIT.to_string(), 0o644));

        assert!(journal
            .iter()
            .filter(|op| op.path() == STAGED_KEYRING)
            .all(|op| !matches!(op, Op::Write(_, mode) | Op::Chmod(_, mode) if *mode != 0o600)));
        assert!(written < owned);
        assert!(owned < removed);
        assert!(removed < done);
        assert!(done < init);
    }

    #[test]
    fn second_run_only_refreshes_conf_and_service() {
        let rt = Runtime::new().unwrap();
        let host = node(167, 167);

        rt.block_on(async {
            create(&host, &args()).await.unwrap();
            host.clear_logs();
            create(&host, &args()).await.unwrap();
        });

        assert_eq!(host.ran("ceph-mon"), 0);
        assert!(
            host.journal().iter().all(|op| op.path() == CONF_PATH),
            "unexpected changes: {:?}",
            host.journal()
        );
        assert_eq!(host.ran("systemctl start ceph-mon@node1"), 1);
    }

    #[test]
    fn mkfs_failure_leaves_no_done_marker() {
        let rt = Runtime::new().unwrap();
        let host = node(167, 167).fail_command("ceph-mon", "error creating monfs");

        rt.block_on(async {
            let err = create(&host, &args()).await.unwrap_err();
            assert_eq!(err.step, Step::Mkfs);
            assert_eq!(err.host, "node1.example.com");
            let message = err.to_string();
            assert!(message.contains("error creating monfs"));
            assert_eq!(message.matches("[node1.example.com]").count(), 1, "{message}");
        });

        assert!(!host.exists(DONE));
        assert!(!host.exists(INIT));
        assert!(!host.exists(STAGED_KEYRING));
        assert_eq!(host.ran("systemctl"), 0);

        // Once the cause is fixed, a rerun bootstraps from scratch.
        host.clear_failures();
        host.clear_logs();
        rt.block_on(async { create(&host, &args()).await.unwrap() });

        assert_eq!(host.ran("ceph-mon"), 1);
        assert!(host.exists(DONE));
        assert!(host.exists(INIT));
    }

    #[test]
    fn service_failure_resumes_without_mkfs() {
        let rt = Runtime::new().unwrap();
        let host = node(167, 167).fail_command("systemctl start", "unit failed");

        rt.block_on(async {
            let err = create(&host, &args()).await.unwrap_err();
            assert_eq!(err.step, Step::StartService);
        });
        assert!(host.exists(DONE));

        host.clear_failures();
        host.clear_logs();
        rt.block_on(async { create(&host, &args()).await.unwrap() });

        assert_eq!(host.ran("ceph-mon"), 0);
        assert_eq!(host.ran("systemctl start ceph-mon@node1"), 1);
    }

    #[test]
    fn missing_init_marker_is_recreated() {
        let rt = Runtime::new().unwrap();
        let host = node(167, 167)
            .with_dir(MON_DIR, 167, 167)
            .with_file(DONE, "");

        rt.block_on(async {
            let distro = Distro::detect(&host).await.unwrap();
            assert_eq!(
                query_monitor_state(&host, "test", "node1", distro.init)
                    .await
                    .unwrap(),
                MonitorState::ServicePending
            );

            mon_create(&host, &distro, &args(), KEYRING).await.unwrap();

            assert_eq!(
                query_monitor_state(&host, "test", "node1", distro.init)
                    .await
                    .unwrap(),
                MonitorState::Bootstrapped
            );
        });

        assert_eq!(host.ran("ceph-mon"), 0);
        assert_eq!(host.owner(INIT), Some((167, 167)));
    }

    #[test]
    fn root_owned_base_drops_no_privileges() {
        let rt = Runtime::new().unwrap();
        let host = node(0, 0);

        rt.block_on(async { create(&host, &args()).await.unwrap() });

        let mkfs = mkfs_line(&host);
        assert!(!mkfs.contains("--setuser"));
        assert!(!mkfs.contains("--setgroup"));
        assert_eq!(host.owner(DONE), Some((0, 0)));
    }

    #[test]
    fn setuser_and_setgroup_are_independent() {
        let rt = Runtime::new().unwrap();
        let host = node(167, 0);

        rt.block_on(async { create(&host, &args()).await.unwrap() });

        let mkfs = mkfs_line(&host);
        assert!(mkfs.ends_with("--setuser 167"));
        assert!(!mkfs.contains("--setgroup"));
    }

    #[test]
    fn add_fetches_and_keeps_monmap() {
        let rt = Runtime::new().unwrap();
        let host = node(167, 167);

        rt.block_on(async { add(&host, &args()).await.unwrap() });

        let lines = host.command_lines();
        let getmap = lines
            .iter()
            .position(|l| *l == format!("ceph --cluster test mon getmap -o {MONMAP}"))
            .unwrap();
        let mkfs = lines.iter().position(|l| l.starts_with("ceph-mon ")).unwrap();
        assert!(getmap < mkfs);

        assert!(mkfs_line(&host).contains(&format!("--monmap {MONMAP} --keyring {STAGED_KEYRING}")));
        assert!(host.exists(MONMAP));
        assert!(!host.exists(STAGED_KEYRING));
        assert!(host.exists(DONE));
    }

    #[test]
    fn create_does_not_fetch_monmap() {
        let rt = Runtime::new().unwrap();
        let host = node(167, 167);

        rt.block_on(async { create(&host, &args()).await.unwrap() });

        assert_eq!(host.ran("ceph --cluster test mon getmap"), 0);
        assert!(!mkfs_line(&host).contains("--monmap"));
    }

    #[test]
    fn failed_monmap_fetch_removes_keyring() {
        let rt = Runtime::new().unwrap();
        let host = node(167, 167).fail_command("ceph --cluster test mon getmap", "no quorum");

        rt.block_on(async {
            let err = add(&host, &args()).await.unwrap_err();
            assert_eq!(err.step, Step::FetchMonmap);
        });

        assert_eq!(host.ran("ceph-mon"), 0);
        assert!(!host.exists(STAGED_KEYRING));
        assert!(!host.exists(DONE));
    }

    #[test]
    fn differing_conf_needs_overwrite() {
        let rt = Runtime::new().unwrap();
        let host = node(167, 167).with_file(CONF_PATH, "[global]\nfsid = other\n");

        rt.block_on(async {
            let err = create(&host, &args()).await.unwrap_err();
            assert_eq!(err.step, Step::WriteConf);
            assert!(matches!(err.source, RemoteError::ConfigExists { .. }));
        });
        assert!(!host.exists(MON_DIR));

        let overwrite = MonArgs {
            overwrite_conf: true,
            ..args()
        };
        rt.block_on(async { create(&host, &overwrite).await.unwrap() });
        assert_eq!(host.file(CONF_PATH).as_deref(), Some(CONF));
    }

    #[test]
    fn missing_conf_dir_means_not_installed() {
        let rt = Runtime::new().unwrap();
        let host = FakeHost::new("node1")
            .with_dir("/var/lib/ceph", 167, 167)
            .with_file("/etc/os-release", CENTOS7)
            .with_file("/proc/1/comm", "systemd\n");

        rt.block_on(async {
            let err = create(&host, &args()).await.unwrap_err();
            assert_eq!(err.step, Step::WriteConf);
            assert!(matches!(err.source, RemoteError::MissingConfDir { .. }));
        });
        assert!(!host.exists("/etc/ceph"));
        assert!(!host.exists(MON_DIR));
    }

    #[test]
    fn reports_installed_version() {
        let rt = Runtime::new().unwrap();
        let host = node(167, 167);

        let version = rt.block_on(async { ceph_version(&host).await.unwrap() });
        assert_eq!(version, "ceph version 10.2.11");
        assert_eq!(host.ran("ceph --version"), 1);
    }

    #[test]
    fn identical_conf_is_accepted() {
        let rt = Runtime::new().unwrap();
        let host = node(167, 167).with_file(CONF_PATH, CONF);

        rt.block_on(async { create(&host, &args()).await.unwrap() });
        assert!(host.exists(DONE));
    }

    #[test]
    fn missing_base_path_fails_first() {
        let rt = Runtime::new().unwrap();
        let host = FakeHost::new("node1")
            .with_file("/etc/os-release", CENTOS7)
            .with_file("/proc/1/comm", "systemd\n");

        rt.block_on(async {
            let err = create(&host, &args()).await.unwrap_err();
            assert_eq!(err.step, Step::ReadOwnership);
        });
        assert!(!host.exists(CONF_PATH));
    }
}
