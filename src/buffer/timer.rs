//! Idle-delay timer
//!
//! One dedicated thread per timer. `schedule` (re)arms it: the task runs
//! once, `delay` after the most recent call, on the timer thread. A steady
//! stream of `schedule` calls keeps pushing the deadline out.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

/// Commands sent to the timer thread
enum TimerCommand {
    /// Run the task after this delay, replacing any pending deadline
    Arm(Duration),
    /// Drop the pending deadline
    Cancel,
    /// Exit the thread
    Shutdown,
}

/// Re-armable, cancellable one-shot timer
pub struct DelayTimer {
    commands: Sender<TimerCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DelayTimer {
    /// Start the timer thread; `task` runs on it each time the timer fires
    pub fn spawn<F>(name: &str, task: F) -> io::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let (commands, inbox) = channel::unbounded();
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(inbox, task))?;

        Ok(Self {
            commands,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Arm (or re-arm) the timer to fire `delay` from now
    pub fn schedule(&self, delay: Duration) {
        let _ = self.commands.send(TimerCommand::Arm(delay));
    }

    /// Disarm without running the task
    pub fn cancel(&self) {
        let _ = self.commands.send(TimerCommand::Cancel);
    }

    /// Stop the thread and wait for it; a pending deadline is dropped
    ///
    /// A task already running finishes first.
    pub fn shutdown(&self) {
        let _ = self.commands.send(TimerCommand::Shutdown);
        if let Some(worker) = self.worker.lock().take() {
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                tracing::error!("timer thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }
}

impl Drop for DelayTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run<F: Fn()>(inbox: Receiver<TimerCommand>, task: F) {
    let mut deadline: Option<Instant> = None;

    loop {
        let command = match deadline {
            Some(at) => inbox.recv_timeout(at.saturating_duration_since(Instant::now())),
            None => inbox.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match command {
            Ok(TimerCommand::Arm(delay)) => deadline = Some(Instant::now() + delay),
            Ok(TimerCommand::Cancel) => deadline = None,
            Ok(TimerCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                deadline = None;
                task();
            }
        }
    }
}
