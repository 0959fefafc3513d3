use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc::{channel, Receiver, RecvTimeoutError, Sender, TryRecvError},
        Arc, RwLock, Weak,
    },
    thread,
    time::Duration,
};

type Registry<Event> = Arc<RwLock<HashMap<u64, Sender<Event>>>>;

/// Fans events out to any number of subscribers. A subscriber is removed from
/// the registry the moment its guard drops, so teardown is deterministic
/// rather than deferred to the next notify.
#[derive(Clone)]
pub struct Notifier<Event: Send + Clone + 'static> {
    senders: Registry<Event>,
    next_id: Arc<AtomicU64>,
}

impl<Event: Send + Clone + 'static> Notifier<Event> {
    pub fn new() -> Self {
        Self {
            senders: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn notify(&self, event: Event) {
        if let Ok(senders) = self.senders.read() {
            for tx in senders.values() {
                let _ = tx.send(event.clone());
            }
        }
    }

    /// Returns a Subscription that owns the receiving end of the channel and
    /// unsubscribes on drop.
    pub fn subscribe(&self) -> Subscription<Event> {
        let (tx, rx) = channel();
        let id = self.register(tx);
        Subscription {
            id,
            senders: Arc::downgrade(&self.senders),
            receiver: rx,
        }
    }

    /// Calls `callback` on a dedicated thread for every event. The thread ends
    /// when the returned Observer is dropped.
    pub fn observe(
        &self,
        mut callback: impl FnMut(Event) + Send + 'static,
    ) -> Observer<Event> {
        let (tx, rx) = channel();
        let id = self.register(tx);
        thread::spawn(move || {
            for event in rx {
                callback(event);
            }
        });
        Observer {
            id,
            senders: Arc::downgrade(&self.senders),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.senders.read().map(|s| s.len()).unwrap_or(0)
    }

    fn register(&self, tx: Sender<Event>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut senders) = self.senders.write() {
            senders.insert(id, tx);
        }
        id
    }
}

impl<Event: Send + Clone + 'static> Default for Notifier<Event> {
    fn default() -> Self {
        Self::new()
    }
}

fn unregister<Event>(senders: &Weak<RwLock<HashMap<u64, Sender<Event>>>>, id: u64) {
    if let Some(senders) = senders.upgrade() {
        if let Ok(mut senders) = senders.write() {
            senders.remove(&id);
        }
    }
}

/// Receiving end of a subscription. Unsubscribes on drop.
pub struct Subscription<Event: Send + Clone + 'static> {
    id: u64,
    senders: Weak<RwLock<HashMap<u64, Sender<Event>>>>,
    receiver: Receiver<Event>,
}

impl<Event: Send + Clone + 'static> Subscription<Event> {
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Event, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Result<Event, TryRecvError> {
        self.receiver.try_recv()
    }
}

impl<Event: Send + Clone + 'static> Drop for Subscription<Event> {
    fn drop(&mut self) {
        unregister(&self.senders, self.id);
    }
}

/// Handle for a callback observer. Dropping it removes the sender, which ends
/// the callback thread.
pub struct Observer<Event: Send + Clone + 'static> {
    id: u64,
    senders: Weak<RwLock<HashMap<u64, Sender<Event>>>>,
}

impl<Event: Send + Clone + 'static> Drop for Observer<Event> {
    fn drop(&mut self) {
        unregister(&self.senders, self.id);
    }
}
