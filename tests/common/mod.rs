#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

pub fn bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_sentinel") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "sentinel.exe" } else { "sentinel" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve sentinel binary path for integration test"),
    }
}

fn write_case_log(case_name: &str, args: &[&str], status: &ExitStatus, stdout: &str, stderr: &str) -> PathBuf {
    let root = std::env::temp_dir().join("sentinel-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");
    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path().display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={status}\n"));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");
    log_path
}

pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    let output = Command::new(bin_path())
        .args(args)
        .env("RUST_BACKTRACE", "1")
        .output()
        .expect("execute sentinel command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let log_path = write_case_log(case_name, args, &output.status, &stdout, &stderr);

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

/// Start the daemon in the background with captured output.
pub fn spawn_daemon(args: &[&str]) -> Child {
    Command::new(bin_path())
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn sentinel daemon")
}

/// Collect a finished daemon's output into a logged `CmdResult`.
pub fn finish_daemon(case_name: &str, args: &[&str], child: Child) -> CmdResult {
    let output = child.wait_with_output().expect("wait for sentinel daemon");
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let log_path = write_case_log(case_name, args, &output.status, &stdout, &stderr);
    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

/// Write `content` at `root/rel`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dirs");
    }
    fs::write(path, content).expect("write fixture file");
}

/// Relative paths of every entry under `root`, sorted, with a trailing `/` on directories.
pub fn tree_listing(root: &Path) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).expect("read fixture dir") {
            let entry = entry.expect("dir entry");
            let path = entry.path();
            let rel = path
                .strip_prefix(root)
                .expect("under root")
                .to_string_lossy()
                .replace('\\', "/");
            if entry.file_type().expect("file type").is_dir() {
                out.push(format!("{rel}/"));
                stack.push(path);
            } else {
                out.push(rel);
            }
        }
    }
    out.sort();
    out
}

/// True when both trees hold the same entries with identical file content.
pub fn trees_match(a: &Path, b: &Path) -> bool {
    let left = tree_listing(a);
    if left != tree_listing(b) {
        return false;
    }
    left.iter()
        .filter(|rel| !rel.ends_with('/'))
        .all(|rel| fs::read(a.join(rel)).ok() == fs::read(b.join(rel)).ok())
}

/// Push a path's mtime forward so the next detect pass sees it as changed.
pub fn bump_mtime(path: &Path, secs_ahead: u64) {
    let meta = fs::metadata(path).expect("stat fixture");
    let mtime = filetime::FileTime::from_last_modification_time(&meta);
    let bumped = filetime::FileTime::from_unix_time(mtime.unix_seconds() + secs_ahead as i64, 0);
    filetime::set_file_mtime(path, bumped).expect("set mtime");
}
