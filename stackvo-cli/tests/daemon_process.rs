//! Runs the real daemon process against a stack root with no reachable
//! Docker engine: everything that only reads `.env` and the dependency
//! book must still work.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use serde_json::Value;
use tempfile::TempDir;

const DEPENDENCIES: &str = r#"{
  "kibana": { "required": ["elasticsearch"], "optional": ["logstash"], "description": "Dashboards" }
}"#;

struct Stack {
    home: TempDir,
    root: TempDir,
    docker_socket: PathBuf,
}

impl Stack {
    fn new() -> Self {
        let home = TempDir::new().expect("home");
        let root = TempDir::new().expect("root");
        fs::write(
            root.path().join(".env"),
            "SERVICE_REDIS_ENABLE=false\nSERVICE_KIBANA_ENABLE=false\n",
        )
        .unwrap();
        fs::create_dir_all(root.path().join("config")).unwrap();
        fs::write(
            root.path().join("config/serviceDependencies.json"),
            DEPENDENCIES,
        )
        .unwrap();
        fs::create_dir_all(root.path().join("projects")).unwrap();
        // exists, but nothing listens on it
        let docker_socket = root.path().join("docker.sock");
        fs::write(&docker_socket, "").unwrap();
        Self {
            home,
            root,
            docker_socket,
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_stackvo"));
        cmd.env("HOME", self.home.path())
            .env("USERPROFILE", self.home.path())
            .env("STACKVO_ROOT", self.root.path())
            .env("DOCKER_SOCKET", &self.docker_socket);
        cmd
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = self.cmd().args(args).output().expect("run stackvo");
        assert!(
            output.status.success(),
            "stackvo {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("json output")
    }
}

struct DaemonProcess {
    child: Child,
}

impl DaemonProcess {
    fn start(stack: &Stack) -> Self {
        let child = stack
            .cmd()
            .args(["daemon", "start"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn daemon");
        let daemon = Self { child };
        wait_until(Duration::from_secs(10), || {
            stack.json(&["daemon", "status"])["running"] == true
        });
        daemon
    }

    fn wait_for_exit(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return true;
            }
            sleep(Duration::from_millis(50));
        }
        false
    }
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        if !self.wait_for_exit(Duration::from_millis(10)) {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn wait_until(timeout: Duration, mut ready: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if ready() {
            return;
        }
        sleep(Duration::from_millis(100));
    }
    panic!("condition not met within {timeout:?}");
}

fn socket(home: &Path) -> PathBuf {
    home.join(".stackvo/run/daemon.sock")
}

#[test]
fn daemon_serves_status_and_dependency_report_then_stops() {
    let stack = Stack::new();
    let mut daemon = DaemonProcess::start(&stack);
    assert!(socket(stack.home.path()).exists());

    let status = stack.json(&["daemon", "status"]);
    assert_eq!(
        status["root"].as_str().map(PathBuf::from),
        Some(stack.root.path().to_path_buf())
    );
    // the engine is unreachable, so container totals carry an error instead
    assert!(status["containers"]["error"].is_string());

    let report = stack.json(&["deps", "kibana", "--json"]);
    assert_eq!(report["unit"], "kibana");
    assert_eq!(report["required"][0]["name"], "elasticsearch");
    assert_eq!(report["required"][0]["running"], false);
    assert_eq!(report["optional"][0]["name"], "logstash");
    assert_eq!(report["has_unmet_dependencies"], true);

    let jobs = stack.json(&["project", "jobs", "--json"]);
    assert_eq!(jobs, serde_json::json!([]));

    let out = stack
        .cmd()
        .args(["daemon", "stop"])
        .output()
        .expect("stop daemon");
    assert!(String::from_utf8_lossy(&out.stdout).contains("daemon stop requested"));
    assert!(daemon.wait_for_exit(Duration::from_secs(5)));
    assert!(!socket(stack.home.path()).exists());
}

#[test]
fn enabling_a_project_is_rejected_by_the_daemon() {
    let stack = Stack::new();
    let _daemon = DaemonProcess::start(&stack);

    let output = stack
        .cmd()
        .args(["enable", "project", "blog"])
        .output()
        .expect("run stackvo");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid request"));

    let _ = stack.cmd().args(["daemon", "stop"]).output();
}
