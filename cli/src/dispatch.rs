use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::debug;

/// Processes queued work for one key at a time.
pub trait Handler<T>: Send + Sync + 'static {
    fn handle(&self, item: T) -> impl Future<Output = ()> + Send;
}

type Queues<T> = Arc<Mutex<HashMap<i64, mpsc::UnboundedSender<T>>>>;

/// Runs items with the same key strictly in arrival order; different keys
/// run concurrently. Each key gets a worker task that exits after `idle`
/// without work.
pub struct Dispatcher<T, H> {
    handler: Arc<H>,
    queues: Queues<T>,
    idle: Duration,
}

impl<T, H> Clone for Dispatcher<T, H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            queues: Arc::clone(&self.queues),
            idle: self.idle,
        }
    }
}

impl<T, H> Dispatcher<T, H>
where
    T: Send + 'static,
    H: Handler<T>,
{
    pub fn new(handler: H, idle: Duration) -> Self {
        Self {
            handler: Arc::new(handler),
            queues: Arc::new(Mutex::new(HashMap::new())),
            idle,
        }
    }

    /// Queues `item` behind any earlier work for `key`. Must be called from
    /// within a Tokio runtime.
    pub fn dispatch(&self, key: i64, item: T) {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        let item = match queues.get(&key) {
            Some(tx) => match tx.send(item) {
                Ok(()) => return,
                // The worker is gone; start a fresh one below.
                Err(mpsc::error::SendError(item)) => item,
            },
            None => item,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        // A new channel's receiver is alive, so this cannot fail.
        let _ = tx.send(item);
        queues.insert(key, tx);
        debug!("Started worker for {key}");
        tokio::spawn(worker(
            key,
            rx,
            Arc::clone(&self.handler),
            Arc::clone(&self.queues),
            self.idle,
        ));
    }

    #[must_use]
    pub fn active_workers(&self) -> usize {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

async fn worker<T, H>(
    key: i64,
    mut rx: mpsc::UnboundedReceiver<T>,
    handler: Arc<H>,
    queues: Queues<T>,
    idle: Duration,
) where
    T: Send + 'static,
    H: Handler<T>,
{
    loop {
        match tokio::time::timeout(idle, rx.recv()).await {
            Ok(Some(item)) => handler.handle(item).await,
            Ok(None) => break,
            Err(_) => {
                // Senders only send while holding the map lock, so once the
                // queue is seen empty under the lock and unregistered, nothing
                // more can arrive here.
                let next = {
                    let mut map = queues.lock().unwrap_or_else(PoisonError::into_inner);
                    match rx.try_recv() {
                        Ok(item) => Some(item),
                        Err(TryRecvError::Empty | TryRecvError::Disconnected) => {
                            map.remove(&key);
                            None
                        }
                    }
                };
                match next {
                    Some(item) => handler.handle(item).await,
                    None => break,
                }
            }
        }
    }
    debug!("Worker for {key} exited");
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        seen: Arc<Mutex<Vec<(i64, u32)>>>,
        delay: Duration,
    }

    impl Handler<(i64, u32)> for Recorder {
        async fn handle(&self, item: (i64, u32)) {
            tokio::time::sleep(self.delay).await;
            self.seen.lock().unwrap().push(item);
        }
    }

    async fn wait_for(seen: &Arc<Mutex<Vec<(i64, u32)>>>, count: usize) {
        for _ in 0..200 {
            if seen.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {count} items");
    }

    #[tokio::test]
    async fn preserves_order_per_key() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new(
            Recorder {
                seen: Arc::clone(&seen),
                delay: Duration::from_millis(5),
            },
            Duration::from_secs(5),
        );

        for i in 0..10 {
            dispatcher.dispatch(1, (1, i));
            dispatcher.dispatch(2, (2, i));
        }
        wait_for(&seen, 20).await;

        let seen = seen.lock().unwrap();
        for key in [1, 2] {
            let order: Vec<u32> = seen
                .iter()
                .filter(|(k, _)| *k == key)
                .map(|(_, i)| *i)
                .collect();
            assert_eq!(order, (0..10).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn idle_worker_exits_and_restarts() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new(
            Recorder {
                seen: Arc::clone(&seen),
                delay: Duration::ZERO,
            },
            Duration::from_millis(50),
        );

        dispatcher.dispatch(7, (7, 0));
        wait_for(&seen, 1).await;
        assert_eq!(dispatcher.active_workers(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(dispatcher.active_workers(), 0);

        dispatcher.dispatch(7, (7, 1));
        wait_for(&seen, 2).await;
        assert_eq!(*seen.lock().unwrap(), vec![(7, 0), (7, 1)]);
    }
}
