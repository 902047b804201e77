//! Console gate: hold a thread until the GDB console is attached, then hit
//! the breakpoint marker.
//!
//! The GDB console extension sets a breakpoint on [`marker::SYMBOL`] and then
//! sends `SIGCONT` to the process. The handler only raises a flag. The
//! waiting thread notices it on its next poll.

use std::os::raw::c_int;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::info;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::error::Error;
use crate::logging::{self, LogConfig, TARGET};
use crate::marker;

/// How often a blocked [`set`] re-checks for the console.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

static CONSOLE_ATTACHED: AtomicBool = AtomicBool::new(false);
static GATE: Gate = Gate::new(&CONSOLE_ATTACHED, DEFAULT_POLL_INTERVAL);
static ENABLE_LOCK: Mutex<()> = Mutex::new(());

// SIGCONT always resumes the process whatever the handler does, so there is
// nothing to forward.
extern "C" fn handle_sigcont(_signal: c_int) {
    CONSOLE_ATTACHED.store(true, Ordering::SeqCst);
}

fn install_console_handler() -> Result<(), Error> {
    let action = SigAction::new(
        SigHandler::Handler(handle_sigcont),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    // Safety: the handler only stores to an atomic, which is async-signal-safe.
    unsafe { signal::sigaction(Signal::SIGCONT, &action)? };
    Ok(())
}

/// Breakpoint gate state.
///
/// The process-wide gate used by [`enable`] and [`set`] is wired to the
/// `SIGCONT` handler. Other instances are raised with
/// [`Gate::notify_console_attached`].
pub struct Gate {
    enabled: AtomicBool,
    attached: &'static AtomicBool,
    announced: AtomicBool,
    poll_interval: Duration,
}

impl Gate {
    pub const fn new(attached: &'static AtomicBool, poll_interval: Duration) -> Self {
        Self {
            enabled: AtomicBool::new(false),
            attached,
            announced: AtomicBool::new(false),
            poll_interval,
        }
    }

    /// Enables the gate. Returns false if it was already enabled.
    ///
    /// Enabling clears any earlier attach so a stale `SIGCONT` (for example
    /// from job control) does not release the first breakpoint.
    pub fn enable(&self) -> bool {
        if self.is_enabled() {
            return false;
        }
        self.clear_attach();
        self.mark_enabled()
    }

    fn clear_attach(&self) {
        self.attached.store(false, Ordering::SeqCst);
        self.announced.store(false, Ordering::SeqCst);
    }

    // Leaves the attach flag alone: a signal may already have landed.
    fn mark_enabled(&self) -> bool {
        !self.enabled.swap(true, Ordering::SeqCst)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Marks the console as attached, as the `SIGCONT` handler does.
    pub fn notify_console_attached(&self) {
        self.attached.store(true, Ordering::SeqCst);
    }

    /// Whether the console is attached. The first observation is logged.
    pub fn console_attached(&self) -> bool {
        if !self.attached.load(Ordering::SeqCst) {
            return false;
        }
        if !self.announced.swap(true, Ordering::SeqCst) {
            self.log("GDB console attached");
        }
        true
    }

    /// Logs `message` with the process and thread id. Silent while disabled.
    pub fn log(&self, message: &str) {
        if !self.is_enabled() {
            return;
        }
        info!(
            target: TARGET,
            "{}",
            format_line(std::process::id(), thread_id(), message)
        );
    }

    /// Blocks until the console is attached.
    pub fn wait_for_console(&self) {
        while !self.console_attached() {
            self.log("breakpoint.set: waiting for gdb console");
            thread::sleep(self.poll_interval);
        }
    }

    /// Waits for the console and calls the breakpoint marker.
    ///
    /// Returns false without waiting when the gate is disabled.
    pub fn set(&self) -> bool {
        if !self.is_enabled() {
            return false;
        }
        self.wait_for_console();
        marker::breakpoint_mark();
        true
    }
}

/// Formats a gate log message the way the GDB console shows thread ids.
pub fn format_line(pid: u32, tid: u64, message: &str) -> String {
    format!("{TARGET}: (PID: {pid}, TID: {tid:#x}): {message}")
}

/// Kernel thread id, which is what `info threads` prints in GDB.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn thread_id() -> u64 {
    nix::unistd::gettid().as_raw() as u64
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn thread_id() -> u64 {
    nix::sys::pthread::pthread_self() as usize as u64
}

/// The process-wide gate.
pub fn global() -> &'static Gate {
    &GATE
}

/// Enables the process-wide gate.
///
/// The first call installs the `SIGCONT` handler and applies `config` to
/// logging. Returns false if the gate was already enabled. If another logger
/// already owns the `log` facade, gate messages go to that logger instead.
///
/// The lock only covers setup. Logging runs after it is released, since a
/// sink may block or re-enter.
pub fn enable(config: LogConfig) -> Result<bool, Error> {
    {
        let _guard = ENABLE_LOCK.lock().unwrap_or_else(|err| err.into_inner());
        if GATE.is_enabled() {
            return Ok(false);
        }

        match logging::init(config) {
            Ok(()) | Err(Error::LoggerConflict) => {}
            Err(err) => return Err(err),
        }
        // Clear before installing so a SIGCONT arriving in between is kept.
        GATE.clear_attach();
        install_console_handler()?;
        GATE.mark_enabled();
    }

    GATE.log(&format!(
        "enabled, breakpoint symbol {} at {:#x}",
        marker::SYMBOL,
        marker::symbol_address()
    ));
    Ok(true)
}

pub fn is_enabled() -> bool {
    GATE.is_enabled()
}

pub fn console_attached() -> bool {
    GATE.console_attached()
}

/// Blocks until the GDB console is attached and then hits the breakpoint.
/// Does nothing unless [`enable`] was called.
pub fn set() -> bool {
    GATE.set()
}

pub fn log(message: &str) {
    GATE.log(message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn set_is_a_no_op_while_disabled() {
        static ATTACHED: AtomicBool = AtomicBool::new(false);
        let gate = Gate::new(&ATTACHED, Duration::from_secs(60));

        let started = Instant::now();
        assert!(!gate.set());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn enable_is_idempotent_and_clears_stale_attach() {
        static ATTACHED: AtomicBool = AtomicBool::new(true);
        let gate = Gate::new(&ATTACHED, Duration::from_millis(5));

        assert!(gate.enable());
        assert!(gate.is_enabled());
        assert!(!gate.console_attached());

        gate.notify_console_attached();
        assert!(!gate.enable());
        assert!(gate.console_attached());
    }

    #[test]
    fn set_waits_for_console() {
        static ATTACHED: AtomicBool = AtomicBool::new(false);
        static GATE: Gate = Gate::new(&ATTACHED, Duration::from_millis(5));
        assert!(GATE.enable());

        let waiter = thread::spawn(|| GATE.set());
        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        GATE.notify_console_attached();
        assert!(waiter.join().unwrap());
        assert!(GATE.console_attached());
    }

    #[test]
    fn set_returns_immediately_once_attached() {
        static ATTACHED: AtomicBool = AtomicBool::new(false);
        let gate = Gate::new(&ATTACHED, Duration::from_secs(60));
        gate.enable();
        gate.notify_console_attached();

        let started = Instant::now();
        assert!(gate.set());
        assert!(gate.set());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn attach_before_enabling_is_kept() {
        static ATTACHED: AtomicBool = AtomicBool::new(true);
        let gate = Gate::new(&ATTACHED, Duration::from_secs(60));

        gate.clear_attach();
        assert!(!ATTACHED.load(Ordering::SeqCst));
        // Signal lands after the flag is cleared but before the gate is enabled.
        gate.notify_console_attached();
        assert!(gate.mark_enabled());
        assert!(!gate.mark_enabled());

        let started = Instant::now();
        assert!(gate.set());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn format_line_shows_hex_tid() {
        assert_eq!(
            format_line(4242, 0x1f, "enabled"),
            "pygdb: (PID: 4242, TID: 0x1f): enabled"
        );
    }
}
