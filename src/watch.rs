//! Push subscriptions over store collections.
//!
//! One upstream `watch_prefix` worker runs per `(collection, prefix)` while at
//! least one listener holds a [`Subscription`]. Listeners fan out from it, and
//! the worker stops when the last handle is dropped.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use super::error::{LeaveError, Result};
use super::store::{Collection, Store, decode};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A change pushed to listeners
#[derive(Debug, Clone, PartialEq)]
pub enum Change<T> {
    Upsert { key: String, value: T },
    Removed { key: String },
}

enum RawChange {
    Insert { key: String, value: Vec<u8> },
    Remove { key: String },
}

type RawListener = Arc<dyn Fn(&RawChange) + Send + Sync>;
type ChannelKey = (Collection, Vec<u8>);

struct Channel {
    listeners: HashMap<u64, RawListener>,
    stop: Arc<AtomicBool>,
}

type Channels = Mutex<HashMap<ChannelKey, Channel>>;

pub struct SubscriptionHub {
    store: Store,
    channels: Arc<Channels>,
    next_id: AtomicU64,
}

impl SubscriptionHub {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            channels: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers `listener` for every write under `prefix` in `collection`.
    /// Values that fail to decode are logged and not delivered.
    pub fn subscribe<T, F>(
        &self,
        collection: Collection,
        prefix: impl Into<Vec<u8>>,
        listener: F,
    ) -> Result<Subscription>
    where
        T: for<'b> minicbor::Decode<'b, ()> + 'static,
        F: Fn(Change<T>) + Send + Sync + 'static,
    {
        let raw: RawListener = Arc::new(move |change: &RawChange| match change {
            RawChange::Insert { key, value } => match decode::<T>(value) {
                Ok(value) => listener(Change::Upsert {
                    key: key.clone(),
                    value,
                }),
                Err(e) => tracing::warn!(key = %key, error = %e, "dropping undecodable change"),
            },
            RawChange::Remove { key } => listener(Change::Removed { key: key.clone() }),
        });

        let key: ChannelKey = (collection, prefix.into());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut channels = self.channels.lock().map_err(|_| poisoned())?;
        match channels.get_mut(&key) {
            Some(channel) => {
                channel.listeners.insert(id, raw);
            }
            None => {
                let stop = Arc::new(AtomicBool::new(false));
                self.spawn_upstream(key.clone(), Arc::clone(&stop))?;
                let mut listeners = HashMap::new();
                listeners.insert(id, raw);
                channels.insert(key.clone(), Channel { listeners, stop });
                tracing::debug!(collection = collection.name(), "upstream subscription started");
            }
        }

        Ok(Subscription {
            channels: Arc::downgrade(&self.channels),
            key,
            id,
            active: true,
        })
    }

    /// Number of running upstream workers
    pub fn active_upstreams(&self) -> usize {
        self.channels.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn listener_count(&self, collection: Collection, prefix: impl Into<Vec<u8>>) -> usize {
        let key = (collection, prefix.into());
        self.channels
            .lock()
            .ok()
            .and_then(|c| c.get(&key).map(|ch| ch.listeners.len()))
            .unwrap_or(0)
    }

    fn spawn_upstream(&self, key: ChannelKey, stop: Arc<AtomicBool>) -> Result<()> {
        let mut subscriber = self.store.tree(key.0).watch_prefix(key.1.clone());
        let channels = Arc::downgrade(&self.channels);

        thread::Builder::new()
            .name(format!("watch-{}", key.0.name()))
            .spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    let event = match subscriber.next_timeout(POLL_INTERVAL) {
                        Ok(event) => event,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    };
                    let change = match event {
                        sled::Event::Insert { key: k, value } => RawChange::Insert {
                            key: String::from_utf8_lossy(&k).into_owned(),
                            value: value.to_vec(),
                        },
                        sled::Event::Remove { key: k } => RawChange::Remove {
                            key: String::from_utf8_lossy(&k).into_owned(),
                        },
                    };
                    if stop.load(Ordering::Acquire) {
                        break;
                    }
                    // snapshot so listeners run without the lock held
                    let Some(listeners) = snapshot(&channels, &key, &stop) else {
                        break;
                    };
                    for listener in listeners {
                        listener(&change);
                    }
                }
                tracing::debug!(collection = key.0.name(), "upstream subscription stopped");
            })
            .map_err(|e| LeaveError::Internal(format!("failed to start watcher: {e}")))?;
        Ok(())
    }
}

/// Listeners of the channel this worker was started for. A channel that was
/// released and then re-created under the same key belongs to a newer worker.
fn snapshot(
    channels: &Weak<Channels>,
    key: &ChannelKey,
    own_stop: &Arc<AtomicBool>,
) -> Option<Vec<RawListener>> {
    let channels = channels.upgrade()?;
    let guard = channels.lock().ok()?;
    guard
        .get(key)
        .filter(|ch| Arc::ptr_eq(&ch.stop, own_stop))
        .map(|ch| ch.listeners.values().cloned().collect())
}

fn poisoned() -> LeaveError {
    LeaveError::Internal("subscription registry lock poisoned".into())
}

/// Handle returned by [`SubscriptionHub::subscribe`]. Dropping it unsubscribes.
pub struct Subscription {
    channels: Weak<Channels>,
    key: ChannelKey,
    id: u64,
    active: bool,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        let Some(channels) = self.channels.upgrade() else {
            return;
        };
        let Ok(mut guard) = channels.lock() else {
            return;
        };
        let now_empty = match guard.get_mut(&self.key) {
            Some(channel) => {
                channel.listeners.remove(&self.id);
                channel.listeners.is_empty()
            }
            None => false,
        };
        if now_empty {
            if let Some(channel) = guard.remove(&self.key) {
                channel.stop.store(true, Ordering::Release);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Team;
    use crate::request::TimeStamp;
    use std::sync::mpsc;
    use tempfile::tempdir;

    fn team(id: &str) -> Team {
        Team {
            id: id.into(),
            name: format!("Team {id}"),
            lead_uid: None,
            manager_uid: None,
            created_at: TimeStamp::new(),
        }
    }

    #[test]
    fn listeners_share_one_upstream() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("watch.db")).unwrap();
        let hub = SubscriptionHub::new(store.clone());

        let (tx_a, rx_a) = mpsc::channel();
        let (tx_b, rx_b) = mpsc::channel();
        let tx_a = Mutex::new(tx_a);
        let tx_b = Mutex::new(tx_b);

        let a = hub
            .subscribe(Collection::Teams, "", move |c: Change<Team>| {
                let _ = tx_a.lock().unwrap().send(c);
            })
            .unwrap();
        let b = hub
            .subscribe(Collection::Teams, "", move |c: Change<Team>| {
                let _ = tx_b.lock().unwrap().send(c);
            })
            .unwrap();
        assert_eq!(hub.active_upstreams(), 1);
        assert_eq!(hub.listener_count(Collection::Teams, ""), 2);

        store.put_team(&team("t1")).unwrap();

        let got_a = rx_a.recv_timeout(Duration::from_secs(5)).unwrap();
        let got_b = rx_b.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(got_a, Change::Upsert { ref key, .. } if key == "t1"));
        assert_eq!(got_a, got_b);

        a.unsubscribe();
        assert_eq!(hub.active_upstreams(), 1);
        drop(b);
        assert_eq!(hub.active_upstreams(), 0);
    }

    #[test]
    fn resubscribe_right_after_drop_delivers_once() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("remount.db")).unwrap();
        let hub = SubscriptionHub::new(store.clone());

        for round in 0..20 {
            let first = hub
                .subscribe(Collection::Teams, "", |_: Change<Team>| {})
                .unwrap();
            drop(first);

            let (tx, rx) = mpsc::channel();
            let tx = Mutex::new(tx);
            let second = hub
                .subscribe(Collection::Teams, "", move |c: Change<Team>| {
                    let _ = tx.lock().unwrap().send(c);
                })
                .unwrap();

            store.put_team(&team(&format!("t{round}"))).unwrap();
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
            // give a stale worker time to wake up and deliver again
            thread::sleep(POLL_INTERVAL * 3);
            assert!(rx.try_recv().is_err(), "round {round} delivered twice");
            drop(second);
        }
    }
}
