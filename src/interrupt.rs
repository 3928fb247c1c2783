use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};

static PROCESS: OnceLock<Interrupt> = OnceLock::new();

/// Exit status used when Ctrl-C lands while no operation is being tracked.
pub const IDLE_EXIT: i32 = 130;

/// Called with the exit status when an interrupt halts the process.
pub type Halt = Arc<dyn Fn(i32) + Send + Sync>;

pub(crate) fn exit_process() -> Halt {
    Arc::new(|code| std::process::exit(code))
}

/// Process-wide user interrupt. Clones observe the same signal.
#[derive(Clone, Default)]
pub struct Interrupt {
    inner: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    signal: Mutex<Signal>,
    cv: Condvar,
}

#[derive(Default)]
struct Signal {
    fired: bool,
    armed: usize,
}

/// How a watch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Interrupted,
    Ended,
}

/// One registered watcher. Dropping it disarms.
pub struct Armed {
    token: Interrupt,
}

impl Interrupt {
    /// Unhooked token, triggered only through [`Interrupt::trigger`].
    pub fn new() -> Self {
        Self::default()
    }

    /// The token fed by Ctrl-C. The handler is installed on first call.
    pub fn process() -> Result<Self> {
        if let Some(token) = PROCESS.get() {
            return Ok(token.clone());
        }
        let token = Self::new();
        let hooked = token.clone();
        let halt = exit_process();
        ctrlc::set_handler(move || deliver(&hooked, &halt))
            .map_err(|e| Error::Config(format!("installing interrupt handler: {e}")))?;
        let _ = PROCESS.set(token.clone());
        Ok(token)
    }

    fn lock(&self) -> MutexGuard<'_, Signal> {
        self.inner.signal.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fire the interrupt at every armed watcher. Returns false, and leaves
    /// nothing latched, when no watcher is armed.
    pub fn trigger(&self) -> bool {
        let mut signal = self.lock();
        if signal.armed == 0 {
            return false;
        }
        signal.fired = true;
        self.inner.cv.notify_all();
        true
    }

    pub fn arm(&self) -> Armed {
        self.lock().armed += 1;
        Armed { token: self.clone() }
    }

    /// Wake waiters so they re-check their end flags.
    pub fn wake(&self) {
        // Taking the lock orders this after any waiter's flag check.
        let _signal = self.lock();
        self.inner.cv.notify_all();
    }
}

impl Armed {
    /// Block until the interrupt fires or `ended` is set and [`Interrupt::wake`] called.
    pub fn wait(&self, ended: &AtomicBool) -> Wake {
        let signal = self.token.lock();
        let signal = self
            .token
            .inner
            .cv
            .wait_while(signal, |s| !s.fired && !ended.load(Ordering::SeqCst))
            .unwrap_or_else(PoisonError::into_inner);
        if signal.fired { Wake::Interrupted } else { Wake::Ended }
    }
}

impl Drop for Armed {
    fn drop(&mut self) {
        let mut signal = self.token.lock();
        signal.armed -= 1;
        if signal.armed == 0 {
            signal.fired = false;
        }
    }
}

/// Ctrl-C entry point: armed trackers handle the interrupt themselves,
/// otherwise the process halts right away.
pub(crate) fn deliver(token: &Interrupt, halt: &Halt) {
    if !token.trigger() {
        tracing::warn!("interrupted");
        halt(IDLE_EXIT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn recorder() -> (Halt, mpsc::Receiver<i32>) {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        (Arc::new(move |code| tx.lock().unwrap().send(code).unwrap()), rx)
    }

    #[test]
    fn trigger_wakes_armed_waiter() {
        let token = Interrupt::new();
        let armed = token.arm();
        let waiter = thread::spawn(move || armed.wait(&AtomicBool::new(false)));
        assert!(token.trigger());
        assert_eq!(waiter.join().unwrap(), Wake::Interrupted);
    }

    #[test]
    fn ended_flag_releases_waiter() {
        let token = Interrupt::new();
        let ended = Arc::new(AtomicBool::new(false));
        let armed = token.arm();
        let waiter = {
            let ended = ended.clone();
            thread::spawn(move || armed.wait(&ended))
        };
        ended.store(true, Ordering::SeqCst);
        token.wake();
        assert_eq!(waiter.join().unwrap(), Wake::Ended);
    }

    #[test]
    fn many_waiters_share_one_token() {
        let token = Interrupt::new();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let armed = token.arm();
                thread::spawn(move || armed.wait(&AtomicBool::new(false)))
            })
            .collect();
        assert!(token.trigger());
        for w in waiters {
            assert_eq!(w.join().unwrap(), Wake::Interrupted);
        }
    }

    #[test]
    fn idle_interrupt_halts_immediately() {
        let token = Interrupt::new();
        let (halt, halted) = recorder();

        deliver(&token, &halt);
        assert_eq!(halted.recv_timeout(Duration::from_secs(1)).unwrap(), IDLE_EXIT);
    }

    #[test]
    fn idle_interrupt_is_not_latched() {
        let token = Interrupt::new();
        assert!(!token.trigger());

        let armed = token.arm();
        let ended = AtomicBool::new(true);
        assert_eq!(armed.wait(&ended), Wake::Ended);
    }

    #[test]
    fn armed_interrupt_is_left_to_the_watcher() {
        let token = Interrupt::new();
        let (halt, halted) = recorder();
        let armed = token.arm();
        let waiter = thread::spawn(move || armed.wait(&AtomicBool::new(false)));

        deliver(&token, &halt);
        assert_eq!(waiter.join().unwrap(), Wake::Interrupted);
        assert!(halted.try_recv().is_err());

        // Once the last watcher is gone the signal resets.
        assert!(!token.trigger());
    }
}
