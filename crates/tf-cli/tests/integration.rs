#![allow(deprecated)]
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn tfdrive(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tfdrive").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("TFDRIVE_CONFIG")
        .env_remove("TFDRIVE_ACTIONS")
        .env("RUST_LOG", "warn");
    cmd
}

/// A terraform stand-in that logs its arguments next to itself.
fn fake_terraform(dir: &Path, fail_on: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let calls = dir.join("calls.log");
    let script = format!(
        r#"#!/bin/sh
echo "$@" >> {calls}
case "$1" in
  version) echo '{{"terraform_version":"1.5.7"}}'; exit 0 ;;
  {fail_on}) echo "Error: backend unreachable" >&2; exit 1 ;;
esac
exit 0
"#,
        calls = calls.display(),
    );
    let path = dir.join("terraform-fake");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn calls(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("calls.log"))
        .unwrap_or_default()
        .lines()
        .filter(|l| !l.starts_with("version"))
        .map(str::to_owned)
        .collect()
}

// ---------------------------------------------------------------------------
// validation
// ---------------------------------------------------------------------------

#[test]
fn run_without_actions_fails() {
    let dir = TempDir::new().unwrap();
    tfdrive(&dir)
        .args(["run", "--tf-version", "1.5.7", "--work-dir", "infra"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least one action is required"));
}

#[test]
fn unknown_action_is_rejected() {
    let dir = TempDir::new().unwrap();
    tfdrive(&dir)
        .args(["run", "--action", "init,refresh", "--tf-version", "1.5.7"])
        .args(["--work-dir", "infra"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid action: refresh"));
}

#[test]
fn force_unlock_needs_lock_id() {
    let dir = TempDir::new().unwrap();
    tfdrive(&dir)
        .args(["run", "--action", "force-unlock", "--tf-version", "1.5.7"])
        .args(["--work-dir", "infra"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("lock id is required"));
}

// ---------------------------------------------------------------------------
// explain
// ---------------------------------------------------------------------------

#[test]
fn explain_prints_translated_options() {
    let dir = TempDir::new().unwrap();
    tfdrive(&dir)
        .args(["explain", "--action", "init,plan", "--tf-version", "1.5.7"])
        .args(["--work-dir", "infra", "--no-backend", "--plan-file", "tfplan"])
        .args(["--var", "env=dev", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-backend=false"))
        .stdout(predicate::str::contains("-out=tfplan"))
        .stdout(predicate::str::contains("-var=env=dev"))
        .stdout(predicate::str::contains("\"show\""));
}

#[test]
fn explain_reads_yaml_config() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("job.yaml"),
        "actions: [init, destroy]\nversion: 1.5.7\nwork_dir: infra\ntarget: [module.db]\n",
    )
    .unwrap();
    tfdrive(&dir)
        .args(["--config", "job.yaml", "explain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("destroy"))
        .stdout(predicate::str::contains("-target=module.db"));
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

#[test]
fn run_with_local_binary_succeeds_and_cleans_up() {
    let dir = TempDir::new().unwrap();
    let bin = TempDir::new().unwrap();
    let exe = fake_terraform(bin.path(), "never");

    tfdrive(&dir)
        .args(["run", "--action", "init,output", "--tf-version", "1.5.7"])
        .args(["--work-dir", "infra", "--tf-binary"])
        .arg(&exe)
        .arg("--job-root")
        .arg(dir.path())
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"success\": true"));

    assert_eq!(
        calls(bin.path()),
        vec!["init -no-color -input=false", "output -json -no-color"]
    );
    assert!(dir.path().join("infra").is_dir());
    assert!(!dir.path().join("scratch/output.json").exists());
}

#[test]
fn destroy_stops_after_failed_init() {
    let dir = TempDir::new().unwrap();
    let bin = TempDir::new().unwrap();
    let exe = fake_terraform(bin.path(), "init");

    tfdrive(&dir)
        .env("TFDRIVE_TF_BINARY", &exe)
        .env("TFDRIVE_VERSION", "1.5.7")
        .env("TFDRIVE_WORK_DIR", "infra")
        .env("TFDRIVE_JOB_ROOT", dir.path())
        .arg("destroy")
        .timeout(std::time::Duration::from_secs(60))
        .assert()
        .failure()
        .stderr(predicate::str::contains("error running init"))
        .stderr(predicate::str::contains("Error: backend unreachable"));

    assert!(calls(bin.path()).iter().all(|c| c.starts_with("init")));
}

// ---------------------------------------------------------------------------
// interrupts
// ---------------------------------------------------------------------------

/// A terraform whose `init` writes its pid (also its process group) and then
/// hangs as that same process. With `ignore_term` the hang survives SIGTERM.
fn hanging_terraform(dir: &Path, ignore_term: bool) -> (PathBuf, PathBuf) {
    use std::os::unix::fs::PermissionsExt;
    let pid_file = dir.join("init.pid");
    let trap = if ignore_term { "trap '' TERM" } else { "" };
    let script = format!(
        r#"#!/bin/sh
case "$1" in
  version) echo '{{"terraform_version":"1.5.7"}}'; exit 0 ;;
  init) {trap}
        echo $$ > {pid_file}
        exec sleep 30 ;;
esac
exit 0
"#,
        pid_file = pid_file.display(),
    );
    let path = dir.join("terraform-hang");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    (path, pid_file)
}

fn spawn_run(dir: &TempDir, exe: &Path) -> std::process::Child {
    std::process::Command::new(env!("CARGO_BIN_EXE_tfdrive"))
        .current_dir(dir.path())
        .env_remove("TFDRIVE_CONFIG")
        .env_remove("TFDRIVE_ACTIONS")
        .env("RUST_LOG", "warn")
        .args(["run", "--action", "init,apply", "--tf-version", "1.5.7"])
        .args(["--work-dir", "infra", "--tf-binary"])
        .arg(exe)
        .arg("--job-root")
        .arg(dir.path())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .unwrap()
}

fn wait_for_pid(pid_file: &Path) -> nix::unistd::Pid {
    let deadline = Instant::now() + Duration::from_secs(30);
    while Instant::now() < deadline {
        if let Ok(text) = std::fs::read_to_string(pid_file) {
            if let Ok(pid) = text.trim().parse::<i32>() {
                return nix::unistd::Pid::from_raw(pid);
            }
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    panic!("terraform never started");
}

fn wait_exit(child: &mut std::process::Child, limit: Duration) -> std::process::ExitStatus {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait().unwrap() {
            return status;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("tfdrive did not exit within {limit:?}");
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

fn interrupt(pid: u32) {
    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(pid as i32),
        nix::sys::signal::Signal::SIGINT,
    )
    .unwrap();
}

#[test]
fn interrupt_terminates_terraform_group_and_fails_the_step() {
    let dir = TempDir::new().unwrap();
    let bin = TempDir::new().unwrap();
    let (exe, pid_file) = hanging_terraform(bin.path(), false);

    let mut child = spawn_run(&dir, &exe);
    let group = wait_for_pid(&pid_file);
    interrupt(child.id());

    let status = wait_exit(&mut child, Duration::from_secs(25));
    let mut stderr = String::new();
    child.stderr.take().unwrap().read_to_string(&mut stderr).unwrap();

    assert_eq!(status.code(), Some(1));
    assert!(stderr.contains("error running init"), "{stderr}");
    assert!(
        nix::unistd::getpgid(Some(group)).is_err(),
        "terraform's process group is still alive"
    );
}

#[test]
fn second_interrupt_exits_immediately_with_code_one() {
    let dir = TempDir::new().unwrap();
    let bin = TempDir::new().unwrap();
    let (exe, pid_file) = hanging_terraform(bin.path(), true);

    let mut child = spawn_run(&dir, &exe);
    let group = wait_for_pid(&pid_file);
    let started = Instant::now();
    interrupt(child.id());
    std::thread::sleep(Duration::from_millis(500));
    interrupt(child.id());

    let status = wait_exit(&mut child, Duration::from_secs(20));
    // without the second interrupt the driver would wait out the abort deadline
    assert!(started.elapsed() < Duration::from_secs(20));
    assert_eq!(status.code(), Some(1));

    let _ = nix::sys::signal::killpg(group, nix::sys::signal::Signal::SIGKILL);
}
