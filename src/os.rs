use std::fs::OpenOptions;
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// A detached process launch: the child keeps running after we exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    pub log_path: PathBuf,
}

/// Everything the lifecycle needs from the operating system.
pub trait OsFacade {
    fn spawn_detached(&self, request: &SpawnRequest) -> std::io::Result<u32>;
    fn signal(&self, pid: u32) -> std::io::Result<()>;
    fn is_port_bound(&self, port: u16) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct SystemOs;

impl SystemOs {
    pub fn new() -> Self {
        Self
    }
}

impl OsFacade for SystemOs {
    fn spawn_detached(&self, request: &SpawnRequest) -> std::io::Result<u32> {
        if let Some(parent) = request.log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&request.log_path)?;
        let log_err = log.try_clone()?;

        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .current_dir(&request.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));
        for (key, value) in &request.env {
            cmd.env(key, value);
        }
        detach(&mut cmd);

        tracing::debug!(
            program = %request.program,
            args = ?request.args,
            cwd = %request.cwd.display(),
            "spawning detached process"
        );
        let child = cmd.spawn()?;
        Ok(child.id())
    }

    /// Signals the process group first, because the process holding the port
    /// is usually a grandchild of the runner, then the pid itself. A pid that
    /// is gone on both counts is already stopped.
    fn signal(&self, pid: u32) -> std::io::Result<()> {
        let group = send_term(&format!("-{}", pid));
        let leader = send_term(&pid.to_string());
        match (group, leader) {
            (Ok(()), _) | (_, Ok(())) => Ok(()),
            (Err(group), Err(leader)) => {
                if is_no_such_process(&group) && is_no_such_process(&leader) {
                    tracing::debug!(pid, "dev server already stopped");
                    Ok(())
                } else {
                    Err(std::io::Error::other(format!("{}; {}", group, leader)))
                }
            }
        }
    }

    fn is_port_bound(&self, port: u16) -> bool {
        lsof_reports_listener(port) || !bind_probe(port)
    }
}

/// `kill -TERM -- <target>`; a negative target names a process group.
fn send_term(target: &str) -> Result<(), String> {
    tracing::debug!(target, "kill -TERM");
    let output = Command::new("kill")
        .args(["-TERM", "--", target])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .output()
        .map_err(|err| format!("kill -TERM {} could not run: {}", target, err))?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(format!(
        "kill -TERM {} failed: {}",
        target,
        if stderr.is_empty() { "unknown error" } else { stderr.as_str() }
    ))
}

fn is_no_such_process(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("no such process") || lower.contains("process does not exist")
}

#[cfg(unix)]
fn detach(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn detach(_cmd: &mut Command) {}

/// lsof sees listeners on every interface; a missing lsof counts as "no".
fn lsof_reports_listener(port: u16) -> bool {
    let output = Command::new("lsof")
        .arg("-nP")
        .arg("-t")
        .arg(format!("-iTCP:{}", port))
        .arg("-sTCP:LISTEN")
        .stdin(Stdio::null())
        .output();
    match output {
        Ok(output) => !String::from_utf8_lossy(&output.stdout).trim().is_empty(),
        Err(_) => false,
    }
}

fn bind_probe(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_ok()
}
