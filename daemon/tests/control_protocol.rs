#![allow(unused_crate_dependencies)]
//! End-to-end scenarios over the control protocol
//!
//! Each test boots the daemon on an ephemeral port with a temporary scripts
//! directory and drives it the way `sploitctl` does.

#![cfg(unix)]

use common::{run_with_default_timeout, Control};
use daemon::bootstrap::{bootstrap, BootstrapHandle};
use schema::{LogSnapshot, Message, Response, ScriptStatusReport};
use sploit_core::FarmConfig;
use std::time::Duration;
use tempfile::TempDir;

pub mod common;

async fn boot(dir: &TempDir) -> BootstrapHandle {
    let mut config = FarmConfig::default();
    config.daemon.port = 0;
    config.supervisor.scripts_dir = dir.path().join("scripts");
    config.supervisor.runner = vec!["/bin/sh".to_string()];
    config.supervisor.server_host = "localhost".to_string();
    config.supervisor.graceful_timeout_secs = 1;
    bootstrap(config).await.expect("bootstrap")
}

fn upload(name: &str, content: &str) -> Message {
    Message::UploadScript {
        name: name.to_string(),
        content: content.to_string(),
    }
}

fn start(name: &str) -> Message {
    Message::StartScript {
        name: name.to_string(),
        server_url: None,
        task: None,
    }
}

async fn logs(control: &mut Control, name: &str) -> LogSnapshot {
    match control
        .request(&Message::ScriptLogs {
            name: name.to_string(),
            after_seq: None,
        })
        .await
    {
        Response::Logs(snapshot) => snapshot,
        other => panic!("unexpected response {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_probe_lifecycle() {
    run_with_default_timeout(async {
        let dir = TempDir::new().unwrap();
        let boot = boot(&dir).await;
        let mut control = Control::connect(boot.local_addr()).await;

        assert!(matches!(
            control.request(&upload("probe.sh", "echo hello\n")).await,
            Response::Ok { .. }
        ));
        let started = match control.request(&start("probe.sh")).await {
            Response::Started(started) => started,
            other => panic!("unexpected response {:?}", other),
        };
        assert!(started
            .command
            .windows(2)
            .any(|w| w[0] == "--server-url" && w[1] == "http://localhost:5000"));

        let status = Message::ScriptStatus {
            name: "probe.sh".to_string(),
        };
        loop {
            match control.request(&status).await {
                Response::ScriptStatus(ScriptStatusReport::Finished { return_code, .. }) => {
                    assert_eq!(return_code, Some(0));
                    break;
                }
                Response::ScriptStatus(ScriptStatusReport::Running { .. }) => {
                    tokio::time::sleep(Duration::from_millis(25)).await;
                }
                other => panic!("unexpected response {:?}", other),
            }
        }
        assert!(matches!(
            control.request(&status).await,
            Response::ScriptStatus(ScriptStatusReport::NotRunning)
        ));

        loop {
            let snapshot = logs(&mut control, "probe.sh").await;
            if snapshot.entries.iter().any(|e| e.message == "hello") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        boot.shutdown().await;
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_errors_are_reported_with_codes() {
    run_with_default_timeout(async {
        let dir = TempDir::new().unwrap();
        let boot = boot(&dir).await;
        let mut control = Control::connect(boot.local_addr()).await;

        let cases = [
            (start("../../bin/sh"), "INVALID_NAME"),
            (start("missing.sh"), "NOT_FOUND"),
            (
                Message::StopScript {
                    name: "missing.sh".to_string(),
                },
                "NOT_RUNNING",
            ),
            (
                Message::DeleteScript {
                    name: "missing.sh".to_string(),
                },
                "NOT_FOUND",
            ),
        ];
        for (message, expected) in cases {
            match control.request(&message).await {
                Response::Error { code, .. } => assert_eq!(code.as_deref(), Some(expected)),
                other => panic!("{:?} answered {:?}", message, other),
            }
        }

        control.request(&upload("long.sh", "exec sleep 30\n")).await;
        control.request(&start("long.sh")).await;
        match control.request(&start("long.sh")).await {
            Response::Error { code, .. } => assert_eq!(code.as_deref(), Some("ALREADY_RUNNING")),
            other => panic!("unexpected response {:?}", other),
        }

        boot.shutdown().await;
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_list_delete_and_shutdown() {
    run_with_default_timeout(async {
        let dir = TempDir::new().unwrap();
        let boot = boot(&dir).await;
        let mut control = Control::connect(boot.local_addr()).await;

        control.request(&upload("a.sh", "exec sleep 30\n")).await;
        control.request(&upload("b.sh", "exec sleep 30\n")).await;
        match control.request(&Message::ListScripts).await {
            Response::Scripts { names } => assert_eq!(names, vec!["a.sh", "b.sh"]),
            other => panic!("unexpected response {:?}", other),
        }

        control.request(&start("a.sh")).await;
        control.request(&start("b.sh")).await;
        match control.request(&Message::ListRunning).await {
            Response::Running { scripts } => {
                let names: Vec<_> = scripts.iter().map(|s| s.name.as_str()).collect();
                assert_eq!(names, vec!["a.sh", "b.sh"]);
            }
            other => panic!("unexpected response {:?}", other),
        }

        let response = control
            .request(&Message::DeleteScript {
                name: "a.sh".to_string(),
            })
            .await;
        assert!(matches!(response, Response::Ok { .. }));
        assert!(!dir.path().join("scripts").join("a.sh").exists());
        match control
            .request(&Message::ScriptLogs {
                name: "a.sh".to_string(),
                after_seq: None,
            })
            .await
        {
            Response::Error { code, .. } => assert_eq!(code.as_deref(), Some("NOT_FOUND")),
            other => panic!("unexpected response {:?}", other),
        }

        let supervisor = boot.supervisor().clone();
        boot.shutdown().await;
        assert!(supervisor.list_running().await.unwrap().is_empty());
        // Logs outlive the processes
        assert!(supervisor.logs("b.sh", None).await.is_ok());
    })
    .await;
}
