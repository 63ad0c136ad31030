//! Engine -> caller notifications.
//!
//! Events are delivered on a dedicated dispatcher thread. Each kind has a
//! latest-value mailbox: emitting an event while an older one of the same
//! kind is still undelivered replaces it, so at most one event per kind is
//! ever in flight. Relative order between kinds follows emission order of
//! the surviving values.
//!
//! Listeners run without any dispatcher lock held, so they may subscribe,
//! unsubscribe or emit from inside a callback. A panicking listener is
//! logged and skipped.

use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{trace, warn};

use super::GameStatus;
use crate::scene::MaterialProperties;

/// State change pushed to listeners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineEvent {
    /// Selection changed; carries the new selection's material, if any.
    SelectionChanged(Option<MaterialProperties>),
    GameStatusChanged(GameStatus),
    FollowCameraChanged(bool),
    FovChanged(f32),
    FocalDistanceChanged(f32),
    DefocusAngleChanged(f32),
    /// Busy indicator around scene loading.
    SceneLoadingChanged(bool),
}

impl EngineEvent {
    fn kind(&self) -> usize {
        match self {
            EngineEvent::SelectionChanged(_) => 0,
            EngineEvent::GameStatusChanged(_) => 1,
            EngineEvent::FollowCameraChanged(_) => 2,
            EngineEvent::FovChanged(_) => 3,
            EngineEvent::FocalDistanceChanged(_) => 4,
            EngineEvent::DefocusAngleChanged(_) => 5,
            EngineEvent::SceneLoadingChanged(_) => 6,
        }
    }
}

type Listener = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

/// Handle returned by [`EventDispatcher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Mailbox {
    pending: Vec<EngineEvent>,
    delivering: bool,
    shutdown: bool,
}

struct Inner {
    mailbox: Mutex<Mailbox>,
    signal: Condvar,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: Mutex<u64>,
}

/// Asynchronous event fan-out.
pub struct EventDispatcher {
    inner: Arc<Inner>,
    handle: Option<JoinHandle<()>>,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        let inner = Arc::new(Inner {
            mailbox: Mutex::new(Mailbox::default()),
            signal: Condvar::new(),
            listeners: Mutex::new(Vec::new()),
            next_listener: Mutex::new(0),
        });
        let worker = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name("rastertrace-events".into())
            .spawn(move || dispatch_loop(&worker))
            .map_err(|e| warn!("event thread unavailable, events disabled: {}", e))
            .ok();
        Self { inner, handle }
    }

    /// Register a callback. It runs on the dispatcher thread.
    pub fn subscribe<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        let id = {
            let mut next = self.inner.next_listener.lock();
            *next += 1;
            ListenerId(*next)
        };
        self.inner.listeners.lock().push((id, Arc::new(f)));
        id
    }

    /// Register a channel listener.
    pub fn subscribe_channel(&self) -> (ListenerId, mpsc::Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let id = self.subscribe(move |e| {
            let _ = tx.lock().send(*e);
        });
        (id, rx)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Queue `event`, replacing an undelivered one of the same kind.
    pub fn emit(&self, event: EngineEvent) {
        let mut mb = self.inner.mailbox.lock();
        if mb.shutdown {
            return;
        }
        let kind = event.kind();
        mb.pending.retain(|e| e.kind() != kind);
        mb.pending.push(event);
        trace!(?event, "emit");
        self.inner.signal.notify_all();
    }

    /// Block until every queued event has been handed to listeners.
    /// Returns at once when called from a listener.
    pub fn flush(&self) {
        if self.handle.is_none() || self.on_dispatcher_thread() {
            return;
        }
        let mut mb = self.inner.mailbox.lock();
        while !mb.pending.is_empty() || mb.delivering {
            self.inner.signal.wait(&mut mb);
        }
    }

    fn dispatcher_thread(&self) -> Option<ThreadId> {
        self.handle.as_ref().map(|h| h.thread().id())
    }

    fn on_dispatcher_thread(&self) -> bool {
        self.dispatcher_thread() == Some(thread::current().id())
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        self.inner.mailbox.lock().shutdown = true;
        self.inner.signal.notify_all();
        let own_thread = self.on_dispatcher_thread();
        if let Some(handle) = self.handle.take() {
            // A listener holding the last reference cannot join itself
            if !own_thread {
                let _ = handle.join();
            }
        }
    }
}

/// Clears `delivering` when a batch ends, however it ends.
struct DeliveryGuard<'a>(&'a Inner);

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        self.0.mailbox.lock().delivering = false;
        self.0.signal.notify_all();
    }
}

fn dispatch_loop(inner: &Inner) {
    loop {
        let batch = {
            let mut mb = inner.mailbox.lock();
            while mb.pending.is_empty() && !mb.shutdown {
                inner.signal.wait(&mut mb);
            }
            if mb.pending.is_empty() {
                return;
            }
            mb.delivering = true;
            std::mem::take(&mut mb.pending)
        };

        let _guard = DeliveryGuard(inner);
        let listeners: Vec<Listener> = inner
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for event in &batch {
            for listener in &listeners {
                if panic::catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                    warn!(?event, "event listener panicked");
                }
            }
        }
    }
}
