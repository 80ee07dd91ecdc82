//! Session-keyed fan-out of inbound updates.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use {
    switchboard_common::{SessionKey, update::session_key},
    teloxide::types::Update,
    tokio::{
        sync::mpsc,
        task::{JoinHandle, JoinSet},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info},
};

#[cfg(feature = "metrics")]
use switchboard_metrics::{counter, gauge, sessions as session_metrics};

use crate::handler::{SessionFactory, SessionHandler};

/// Maps each session key to one lazily created handler and runs every update
/// as its own task.
///
/// Updates for different keys run in parallel. Updates for the same key also
/// run in parallel and may complete in any order.
pub struct Dispatcher {
    factory: Arc<dyn SessionFactory>,
    sessions: RwLock<HashMap<SessionKey, Arc<dyn SessionHandler>>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            factory,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// The handler for `key`, created on first use.
    pub fn session(&self, key: SessionKey) -> Arc<dyn SessionHandler> {
        if let Some(handler) = self.get(key) {
            return handler;
        }

        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        // Another caller may have created it between the two locks.
        if let Some(handler) = sessions.get(&key) {
            return Arc::clone(handler);
        }

        let handler = self.factory.create(key);
        sessions.insert(key, Arc::clone(&handler));
        debug!(session = %key, "session created");

        #[cfg(feature = "metrics")]
        {
            counter!(session_metrics::CREATED_TOTAL).increment(1);
            gauge!(session_metrics::ACTIVE).set(sessions.len() as f64);
        }

        handler
    }

    #[must_use]
    pub fn get(&self, key: SessionKey) -> Option<Arc<dyn SessionHandler>> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .cloned()
    }

    /// Create the session for `key` ahead of its first update.
    pub fn add_session(&self, key: SessionKey) -> Arc<dyn SessionHandler> {
        self.session(key)
    }

    /// Forget the session for `key`. Its next update creates a fresh handler;
    /// tasks already running keep the old one.
    pub fn delete_session(&self, key: SessionKey) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let removed = sessions.remove(&key).is_some();
        if removed {
            debug!(session = %key, "session deleted");

            #[cfg(feature = "metrics")]
            gauge!(session_metrics::ACTIVE).set(sessions.len() as f64);
        }
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn resolve(&self, update: Update) -> (Arc<dyn SessionHandler>, Arc<Update>) {
        let key = session_key(&update);
        let handler = self.session(key);

        #[cfg(feature = "metrics")]
        counter!(session_metrics::DISPATCHED_TOTAL).increment(1);

        (handler, Arc::new(update))
    }

    /// Hand one update to its session on a new task.
    pub fn dispatch(&self, cancel: CancellationToken, update: Update) -> JoinHandle<()> {
        let (handler, update) = self.resolve(update);
        tokio::spawn(async move { handler.handle_update(cancel, update).await })
    }

    /// Dispatch everything received on `updates` until it closes or `cancel`
    /// fires.
    ///
    /// On cancellation the channel is closed and updates already queued in it
    /// are still dispatched. Handler tasks still running on return are left
    /// to finish. A handler panic is re-raised here.
    pub async fn listen(&self, cancel: CancellationToken, mut updates: mpsc::Receiver<Update>) {
        let mut running = JoinSet::new();
        info!("dispatcher listening");

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    updates.close();
                    let mut drained = 0usize;
                    while let Some(update) = updates.recv().await {
                        self.spawn_into(&mut running, &cancel, update);
                        drained += 1;
                    }
                    debug!(drained, "dispatched queued updates after cancellation");
                    break;
                },
                Some(joined) = running.join_next(), if !running.is_empty() => {
                    if let Err(e) = joined
                        && e.is_panic()
                    {
                        std::panic::resume_unwind(e.into_panic());
                    }
                },
                received = updates.recv() => match received {
                    Some(update) => self.spawn_into(&mut running, &cancel, update),
                    None => break,
                },
            }
        }

        running.detach_all();
        info!(sessions = self.len(), "dispatcher stopped");
    }

    fn spawn_into(&self, running: &mut JoinSet<()>, cancel: &CancellationToken, update: Update) {
        let (handler, update) = self.resolve(update);
        let cancel = cancel.clone();
        running.spawn(async move { handler.handle_update(cancel, update).await });
    }
}
