use crate::audit::SharedLogger;
use crate::console::Console;
use crate::error::{Error, Result};
use crate::interrupt::{Halt, Interrupt};
use crate::runnable::{Runnable, State, StatusEntry, StatusReport, WatchDirs};
use crate::tracker::CommandTracker;
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::Pid;
use serde::Deserialize;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Shell commands run on a service's behalf.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Commands {
    pub build: Option<String>,
    pub launch: Option<String>,
    /// Runs instead of SIGTERM when set.
    pub stop: Option<String>,
}

/// Definition of one service as written in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceDef {
    pub name: String,
    /// Working directory for every command.
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub sudo: bool,
    #[serde(default)]
    pub watch: Vec<PathBuf>,
    /// `KEY=VALUE` pairs added to the command environment.
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub commands: Commands,
}

impl ServiceDef {
    /// Reject definitions the commands could not honour.
    pub fn validate(&self) -> Result<()> {
        for pair in &self.env {
            match pair.split_once('=') {
                Some((key, _)) if !key.is_empty() => {}
                _ => {
                    return Err(Error::Config(format!(
                        "service {}: env entry {pair:?} is not KEY=VALUE",
                        self.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Where services keep their state and how they report progress.
#[derive(Clone)]
pub struct ServiceContext {
    pub data_dir: PathBuf,
    pub launch_grace: Duration,
    /// How long a stopped process may take to exit.
    pub stop_timeout: Duration,
    pub logger: Option<SharedLogger>,
    pub console: Console,
    pub interrupt: Interrupt,
    pub halt: Option<Halt>,
}

impl ServiceContext {
    pub fn new(data_dir: impl Into<PathBuf>, interrupt: Interrupt) -> Self {
        Self {
            data_dir: data_dir.into(),
            launch_grace: Duration::from_millis(250),
            stop_timeout: Duration::from_secs(5),
            logger: None,
            console: Console::stdout(),
            interrupt,
            halt: None,
        }
    }
}

/// A leaf service backed by shell commands. Cloning shares the definition.
#[derive(Clone)]
pub struct Service {
    inner: Arc<Inner>,
}

struct Inner {
    def: ServiceDef,
    ctx: ServiceContext,
}

impl Service {
    pub fn new(def: ServiceDef, ctx: ServiceContext) -> Self {
        Self { inner: Arc::new(Inner { def, ctx }) }
    }

    pub fn pid_file(&self) -> PathBuf {
        self.inner.ctx.data_dir.join("pids").join(format!("{}.pid", self.name()))
    }

    pub fn log_file(&self) -> PathBuf {
        self.inner.ctx.data_dir.join("logs").join(format!("{}.log", self.name()))
    }

    fn op_log(&self, op: &str) -> PathBuf {
        self.inner.ctx.data_dir.join("logs").join(format!("{}-{op}.log", self.name()))
    }

    /// Pid recorded at launch, alive or not.
    fn recorded_pid(&self) -> Result<Option<u32>> {
        let raw = match fs::read_to_string(self.pid_file()) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let pid = raw.trim().parse().map_err(|_| {
            Error::service(self.name(), format!("malformed pid file {:?}", raw.trim()))
        })?;
        Ok(Some(pid))
    }

    /// Pid of the launched process if it is still alive.
    pub fn running_pid(&self) -> Result<Option<u32>> {
        Ok(self.recorded_pid()?.filter(|&pid| process_alive(pid)))
    }

    fn tracker(&self, label: &str) -> CommandTracker {
        let ctx = &self.inner.ctx;
        let name = format!("{label} {}", self.name());
        let tracker = CommandTracker::new(name, ctx.interrupt.clone())
            .logger(ctx.logger.clone())
            .console(ctx.console.clone());
        match &ctx.halt {
            Some(halt) => tracker.on_halt(halt.clone()),
            None => tracker,
        }
    }

    fn shell(&self, script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script).stdin(Stdio::null());
        if let Some(path) = &self.inner.def.path {
            cmd.current_dir(path);
        }
        for pair in &self.inner.def.env {
            // Checked by `ServiceDef::validate` when the catalog is built.
            if let Some((key, value)) = pair.split_once('=') {
                cmd.env(key, value);
            }
        }
        cmd
    }

    fn open_log(path: &Path) -> Result<File> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(File::create(path)?)
    }

    // Runs `script` to completion with its output captured in `log`.
    fn run_logged(&self, script: &str, log: &Path) -> Result<()> {
        let out = Self::open_log(log)?;
        let status = self.shell(script).stdout(out.try_clone()?).stderr(out).status()?;
        if !status.success() {
            return Err(Error::CommandFailed {
                service: self.name().to_string(),
                status: status.to_string(),
            });
        }
        Ok(())
    }

    fn launch(&self, script: &str) -> Result<u32> {
        let log = self.log_file();
        let out = Self::open_log(&log)?;
        // Own process group: survives our Ctrl-C and can be signalled as a whole.
        let mut child = self
            .shell(script)
            .stdout(out.try_clone()?)
            .stderr(out)
            .process_group(0)
            .spawn()?;
        thread::sleep(self.inner.ctx.launch_grace);
        if let Some(status) = child.try_wait()? {
            tracing::warn!(service = %self.name(), %status, "exited during launch");
            return Err(Error::LaunchFailed { service: self.name().to_string() });
        }
        let pid = child.id();
        let pid_file = self.pid_file();
        if let Some(parent) = pid_file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&pid_file, pid.to_string())?;
        Ok(pid)
    }

    // Asks the process to stop, then waits for it to exit.
    fn terminate(&self, pid: u32) -> Result<()> {
        match &self.inner.def.commands.stop {
            Some(script) => self.run_logged(script, &self.op_log("stop"))?,
            None => signal_group(pid)?,
        }
        let deadline = Instant::now() + self.inner.ctx.stop_timeout;
        while process_alive(pid) {
            if Instant::now() >= deadline {
                return Err(Error::service(self.name(), format!("pid {pid} still running")));
            }
            thread::sleep(Duration::from_millis(25));
        }
        Ok(())
    }

    /// Run `op` under a tracker labelled `label`, reporting its outcome.
    fn tracked<T>(
        &self,
        label: &str,
        log: Option<PathBuf>,
        op: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let tracker = self.tracker(label);
        let tracker = match log {
            Some(path) => tracker.output_file(path),
            None => tracker,
        };
        let running = tracker.start();
        match op() {
            Ok(value) => {
                running.success();
                Ok(value)
            }
            Err(err) => {
                running.fail(&err);
                Err(err)
            }
        }
    }
}

fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid).ok().map(Pid::from_raw)
}

fn process_alive(pid: u32) -> bool {
    let Some(pid) = to_pid(pid) else { return false };
    // Reap it first if it is our own exited child, otherwise it lingers as a zombie.
    let _ = waitpid(pid, Some(WaitPidFlag::WNOHANG));
    match kill(pid, None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

fn signal_group(pid: u32) -> Result<()> {
    let pid = to_pid(pid)
        .ok_or_else(|| std::io::Error::new(ErrorKind::InvalidInput, "pid out of range"))?;
    killpg(pid, Signal::SIGTERM).map_err(std::io::Error::from)?;
    Ok(())
}

impl Runnable for Service {
    type Leaf = Service;

    fn name(&self) -> &str {
        &self.inner.def.name
    }

    fn build(&self) -> Result<()> {
        let Some(script) = &self.inner.def.commands.build else { return Ok(()) };
        let log = self.op_log("build");
        self.tracked("Build", Some(log.clone()), || self.run_logged(script, &log))
    }

    fn start(&self) -> Result<()> {
        if self.running_pid()?.is_some() {
            self.tracker("Start").start().soft_fail(&Error::AlreadyRunning);
            return Ok(());
        }
        let Some(script) = &self.inner.def.commands.launch else { return Ok(()) };
        let pid = self.tracked("Start", Some(self.log_file()), || self.launch(script))?;
        tracing::info!(service = %self.name(), pid, "launched");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let pid = match self.recorded_pid()? {
            Some(pid) if process_alive(pid) => pid,
            recorded => {
                if recorded.is_some() {
                    tracing::debug!(service = %self.name(), "removing stale pid file");
                    fs::remove_file(self.pid_file())?;
                }
                self.tracker("Stop").start().soft_fail(&Error::NotRunning);
                return Ok(());
            }
        };
        let log = self.inner.def.commands.stop.as_ref().map(|_| self.op_log("stop"));
        // The pid file stays while the process survives.
        self.tracked("Stop", log, || self.terminate(pid))?;
        fs::remove_file(self.pid_file())?;
        Ok(())
    }

    fn status(&self) -> StatusReport {
        match self.running_pid() {
            Ok(pid) => {
                let state = pid.map_or(State::Stopped, |pid| State::Running { pid });
                StatusReport::ok(vec![StatusEntry { service: self.name().to_string(), state }])
            }
            Err(err) => StatusReport { entries: Vec::new(), error: Some(err) },
        }
    }

    fn is_sudo(&self) -> bool {
        self.inner.def.sudo
    }

    fn watch_dirs(&self) -> WatchDirs<Service> {
        self.inner.def.watch.iter().map(|dir| (dir.clone(), self.clone())).collect()
    }
}
