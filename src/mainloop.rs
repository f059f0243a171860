// src/mainloop.rs

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::options::InvocationIntent;
use crate::profile::Profile;

/// Everything the loop can deliver: activation requests (the initial one or
/// one forwarded by a secondary instance), engine completion notifications,
/// timer expirations and lifecycle signals.
#[derive(Debug)]
pub enum Event {
    Activate(InvocationIntent),
    ProfileChanged(Profile),
    RefreshPanel,
    SurfaceClosed,
    Quit,
}

/// Cloneable, thread-safe producer side of the loop. Helper threads (the
/// forwarding listener, the surface's stdin watcher) only ever talk to the
/// loop through one of these.
pub type EventSender = Sender<Event>;

struct LoopInner {
    holds: usize,
    quit: bool,
    // kept sorted by deadline
    timers: Vec<(Instant, Event)>,
}

impl LoopInner {
    fn schedule(&mut self, at: Instant, event: Event) {
        let idx = self.timers.partition_point(|(t, _)| *t <= at);
        self.timers.insert(idx, (at, event));
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.timers.first().map(|(t, _)| *t)
    }

    fn pop_due(&mut self, now: Instant) -> Option<Event> {
        if self.timers.first().map_or(false, |(t, _)| *t <= now) {
            Some(self.timers.remove(0).1)
        } else {
            None
        }
    }
}

/// Counted keep-alive guard. The loop refuses to exit while any lease is
/// outstanding; dropping the lease releases it.
pub struct Lease {
    inner: Rc<RefCell<LoopInner>>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mut inner = self.inner.borrow_mut();
        inner.holds = inner.holds.saturating_sub(1);
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Lease")
    }
}

/// Handle onto the loop for code running on the loop thread: acquiring
/// leases, scheduling timers, posting events and requesting shutdown.
#[derive(Clone)]
pub struct LoopHandle {
    tx: Sender<Event>,
    inner: Rc<RefCell<LoopInner>>,
}

impl LoopHandle {
    pub fn hold(&self) -> Lease {
        self.inner.borrow_mut().holds += 1;
        Lease {
            inner: Rc::clone(&self.inner),
        }
    }

    pub fn holds(&self) -> usize {
        self.inner.borrow().holds
    }

    pub fn post(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    pub fn schedule(&self, delay: Duration, event: Event) {
        self.inner
            .borrow_mut()
            .schedule(Instant::now() + delay, event);
    }

    pub fn quit(&self) {
        self.inner.borrow_mut().quit = true;
    }

    pub fn quit_requested(&self) -> bool {
        self.inner.borrow().quit
    }

    /// A sender usable from other threads.
    pub fn sender(&self) -> EventSender {
        self.tx.clone()
    }
}

/// Single-threaded cooperative event loop. All state mutation happens on the
/// thread calling [`MainLoop::run`]; the loop exits once a quit was requested
/// or no leases, timers or queued events remain.
pub struct MainLoop {
    rx: Receiver<Event>,
    handle: LoopHandle,
}

impl MainLoop {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        let inner = Rc::new(RefCell::new(LoopInner {
            holds: 0,
            quit: false,
            timers: Vec::new(),
        }));
        Self {
            rx,
            handle: LoopHandle { tx, inner },
        }
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    pub fn run<F: FnMut(Event)>(self, mut on_event: F) {
        loop {
            if self.handle.inner.borrow().quit {
                break;
            }

            let now = Instant::now();
            let due = self.handle.inner.borrow_mut().pop_due(now);
            if let Some(event) = due {
                on_event(event);
                continue;
            }

            let next = self.handle.inner.borrow().next_deadline();
            let holds = self.handle.inner.borrow().holds;

            match next {
                Some(at) => {
                    let timeout = at.saturating_duration_since(now);
                    match self.rx.recv_timeout(timeout) {
                        Ok(event) => on_event(event),
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None if holds == 0 => {
                    // drain whatever is already queued, then exit
                    match self.rx.try_recv() {
                        Ok(event) => on_event(event),
                        Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                    }
                }
                None => match self.rx.recv() {
                    Ok(event) => on_event(event),
                    Err(_) => break,
                },
            }
        }
    }
}

impl Default for MainLoop {
    fn default() -> Self {
        Self::new()
    }
}
