use crate::audit::{emit, SharedLogger};
use crate::console::{Console, Tone};
use crate::error::Error;
use crate::interrupt::{exit_process, Halt, Interrupt, Wake};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Follows one operation executed by running a shell command.
///
/// Single use: [`CommandTracker::start`] hands back a [`RunningTracker`],
/// which is consumed by exactly one of `success`, `soft_fail` or `fail`.
/// While running, a Ctrl-C on the shared [`Interrupt`] prints `[Interrupted]`,
/// dumps the output file and halts the process.
#[derive(Clone)]
pub struct CommandTracker {
    name: String,
    output_file: Option<PathBuf>,
    logger: Option<SharedLogger>,
    console: Console,
    interrupt: Interrupt,
    halt: Halt,
}

impl CommandTracker {
    pub fn new(name: impl Into<String>, interrupt: Interrupt) -> Self {
        Self {
            name: name.into(),
            output_file: None,
            logger: None,
            console: Console::stdout(),
            interrupt,
            halt: exit_process(),
        }
    }

    pub fn output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = Some(path.into());
        self
    }

    pub fn logger(mut self, logger: Option<SharedLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }

    /// Replace the process exit performed after an interrupt.
    pub fn on_halt(mut self, halt: Halt) -> Self {
        self.halt = halt;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(self) -> RunningTracker {
        self.console.label(&self.name);
        self.log(&self.name);
        tracing::debug!(target: "convoy::tracker", name = %self.name, "operation started");

        let ended = Arc::new(AtomicBool::new(false));
        // Armed before the thread exists so no Ctrl-C falls in between.
        let armed = self.interrupt.arm();
        let watcher = {
            let tracker = self.clone();
            let ended = ended.clone();
            thread::spawn(move || {
                if armed.wait(&ended) == Wake::Interrupted {
                    tracker.interrupted();
                }
            })
        };
        RunningTracker { tracker: self, ended, watcher: Some(watcher) }
    }

    fn interrupted(&self) {
        tracing::warn!(target: "convoy::tracker", name = %self.name, "interrupted");
        self.console.token("Interrupted", Tone::Bad);
        self.log(&format!("{} Interrupted", self.name));
        self.dump_output();
        (self.halt)(1);
    }

    fn dump_output(&self) {
        let Some(path) = &self.output_file else { return };
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                self.log(&contents);
                self.console.print(&contents);
            }
            Err(err) => {
                self.log(&format!("{}: Error reading operation log ({err})", self.name));
                tracing::warn!(path = %path.display(), error = %err, "cannot read operation log");
            }
        }
    }

    fn log(&self, message: &str) {
        emit(&self.logger, "tracker", message);
    }
}

/// A started [`CommandTracker`] with its interrupt watch armed.
pub struct RunningTracker {
    tracker: CommandTracker,
    ended: Arc<AtomicBool>,
    watcher: Option<JoinHandle<()>>,
}

impl RunningTracker {
    pub fn success(mut self) {
        self.disarm();
        let t = &self.tracker;
        t.console.token("OK", Tone::Good);
        t.log(&format!("{} Succeeded", t.name));
    }

    /// Non-fatal outcome, shown as a warning with the error text.
    pub fn soft_fail(mut self, err: &Error) {
        self.disarm();
        let t = &self.tracker;
        t.console.token(&err.to_string(), Tone::Warn);
        t.log(&format!("{}: {err}", t.name));
    }

    pub fn fail(mut self, err: &Error) {
        self.disarm();
        let t = &self.tracker;
        t.console.token("Failed", Tone::Bad);
        t.log(&format!("{} Failed: {err}", t.name));
        tracing::error!(
            target: "convoy::tracker",
            name = %t.name,
            error = %err,
            "operation failed"
        );
        t.dump_output();
    }

    // Ends the watch and waits for the watcher thread to exit.
    fn disarm(&mut self) {
        let Some(watcher) = self.watcher.take() else { return };
        self.ended.store(true, Ordering::SeqCst);
        self.tracker.interrupt.wake();
        let _ = watcher.join();
    }
}

impl Drop for RunningTracker {
    fn drop(&mut self) {
        self.disarm();
    }
}
