//! Sequential long-poll loop.

use std::sync::Arc;

use {
    switchboard_common::update::UpdateType,
    teloxide::types::Update,
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use switchboard_metrics::{counter, histogram, labels, updates as update_metrics};

use crate::{
    error::{Error, Result},
    fetch::{FetchRequest, UpdateFetcher},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingConfig {
    /// Long-poll timeout for every call after the first.
    pub timeout_secs: u32,
    /// Discard whatever was queued before startup.
    pub drop_pending: bool,
    pub allowed: Vec<UpdateType>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            drop_pending: false,
            allowed: Vec::new(),
        }
    }
}

/// Offset that acknowledges every update in `batch`.
#[must_use]
pub fn next_offset(batch: &[Update]) -> Option<i32> {
    batch.last().map(|update| update.id.as_offset())
}

pub struct Poller {
    fetcher: Arc<dyn UpdateFetcher>,
    config: PollingConfig,
}

impl Poller {
    #[must_use]
    pub fn new(fetcher: Arc<dyn UpdateFetcher>, config: PollingConfig) -> Self {
        Self { fetcher, config }
    }

    #[must_use]
    pub fn config(&self) -> &PollingConfig {
        &self.config
    }

    /// Poll until cancelled, pushing updates into `sink` one at a time in
    /// fetch order.
    ///
    /// The first call uses a zero timeout to drain the backlog. A fetch error
    /// ends the loop with [`Error::FetchFailed`]; nothing reconnects.
    /// Cancellation returns `Ok(())`.
    pub async fn run(&self, cancel: CancellationToken, sink: mpsc::Sender<Update>) -> Result<()> {
        self.fetcher.delete_webhook(self.config.drop_pending).await?;
        info!(
            timeout_secs = self.config.timeout_secs,
            drop_pending = self.config.drop_pending,
            "telegram polling started"
        );

        let mut offset: i32 = 0;
        let mut first = true;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let request = FetchRequest {
                timeout_secs: if first {
                    0
                } else {
                    self.config.timeout_secs
                },
                offset,
                allowed: self.config.allowed.clone(),
            };

            #[cfg(feature = "metrics")]
            let fetch_started = std::time::Instant::now();

            let fetched = tokio::select! {
                () = cancel.cancelled() => break,
                fetched = self.fetcher.fetch(&cancel, &request) => fetched,
            };

            #[cfg(feature = "metrics")]
            histogram!(update_metrics::FETCH_DURATION_SECONDS)
                .record(fetch_started.elapsed().as_secs_f64());

            let batch = match fetched {
                Ok(batch) => batch,
                Err(_) if cancel.is_cancelled() => break,
                Err(e) => {
                    #[cfg(feature = "metrics")]
                    counter!(update_metrics::FETCH_FAILURES_TOTAL).increment(1);

                    warn!(offset, error = %e, "telegram getUpdates failed, polling stopped");
                    return Err(Error::fetch_failed(offset, e));
                },
            };

            let Some(next) = next_offset(&batch) else {
                first = false;
                continue;
            };

            if first && self.config.drop_pending {
                debug!(dropped = batch.len(), "dropped pending updates");

                #[cfg(feature = "metrics")]
                counter!(update_metrics::DROPPED_TOTAL, labels::REASON => "pending")
                    .increment(batch.len() as u64);
            } else {
                debug!(offset, count = batch.len(), "dispatching update batch");
                for update in batch {
                    #[cfg(feature = "metrics")]
                    counter!(update_metrics::RECEIVED_TOTAL, labels::SOURCE => "polling")
                        .increment(1);

                    tokio::select! {
                        () = cancel.cancelled() => return Ok(()),
                        sent = sink.send(update) => {
                            if sent.is_err() {
                                // The dispatcher closes its end on cancellation.
                                if cancel.is_cancelled() {
                                    return Ok(());
                                }
                                return Err(Error::SinkClosed);
                            }
                        },
                    }
                }
            }

            first = false;
            offset = next;
        }

        info!(offset, "telegram polling stopped");
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use {async_trait::async_trait, switchboard_common::fixtures};

    use super::*;

    /// Replays scripted batches and records every request it saw. Once the
    /// script runs out it parks until cancelled, like an idle long poll.
    #[derive(Default)]
    struct ScriptedFetcher {
        script: Mutex<VecDeque<Result<Vec<Update>>>>,
        requests: Mutex<Vec<FetchRequest>>,
        deleted_webhook: Mutex<Option<bool>>,
    }

    impl ScriptedFetcher {
        fn new(script: Vec<Result<Vec<Update>>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            })
        }

        fn requests(&self) -> Vec<FetchRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UpdateFetcher for ScriptedFetcher {
        async fn fetch(
            &self,
            cancel: &CancellationToken,
            request: &FetchRequest,
        ) -> Result<Vec<Update>> {
            self.requests.lock().unwrap().push(request.clone());
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(result) => result,
                None => {
                    cancel.cancelled().await;
                    Ok(Vec::new())
                },
            }
        }

        async fn delete_webhook(&self, drop_pending: bool) -> Result<()> {
            *self.deleted_webhook.lock().unwrap() = Some(drop_pending);
            Ok(())
        }
    }

    fn text_update(id: u32, text: &str) -> Update {
        fixtures::update(
            id,
            "message",
            fixtures::message(
                fixtures::private_chat(7),
                Some(fixtures::user(7)),
                Some(text),
            ),
        )
    }

    async fn run_until_idle(
        fetcher: Arc<ScriptedFetcher>,
        config: PollingConfig,
        expected: usize,
    ) -> (Vec<Update>, Result<()>) {
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let poller = Poller::new(fetcher, config);
        let handle = tokio::spawn({
            let cancel = cancel.clone();
            async move { poller.run(cancel, tx).await }
        });

        let mut received = Vec::new();
        while received.len() < expected {
            received.push(rx.recv().await.unwrap());
        }
        // Let the loop reach its idle fetch before stopping it.
        tokio::task::yield_now().await;
        cancel.cancel();
        (received, handle.await.unwrap())
    }

    #[tokio::test]
    async fn first_call_drains_with_zero_timeout_then_long_polls() {
        let fetcher = ScriptedFetcher::new(vec![
            Ok(vec![text_update(10, "a"), text_update(11, "b")]),
            Ok(vec![text_update(12, "c")]),
        ]);
        let (received, result) =
            run_until_idle(Arc::clone(&fetcher), PollingConfig::default(), 3).await;
        result.unwrap();

        let ids: Vec<u32> = received.iter().map(|u| u.id.0).collect();
        assert_eq!(ids, vec![10, 11, 12]);

        let requests = fetcher.requests();
        assert_eq!(requests[0].timeout_secs, 0);
        assert_eq!(requests[0].offset, 0);
        assert_eq!(requests[1].timeout_secs, 30);
        assert_eq!(requests[1].offset, 12);
        assert_eq!(requests[2].offset, 13);
        assert_eq!(*fetcher.deleted_webhook.lock().unwrap(), Some(false));
    }

    #[tokio::test]
    async fn drop_pending_discards_backlog_but_advances_offset() {
        let fetcher = ScriptedFetcher::new(vec![
            Ok(vec![text_update(5, "stale"), text_update(6, "stale")]),
            Ok(vec![text_update(7, "fresh")]),
        ]);
        let config = PollingConfig {
            drop_pending: true,
            ..PollingConfig::default()
        };
        let (received, result) = run_until_idle(Arc::clone(&fetcher), config, 1).await;
        result.unwrap();

        assert_eq!(received.len(), 1);
        assert_eq!(received[0].id.0, 7);
        assert_eq!(fetcher.requests()[1].offset, 7);
        assert_eq!(*fetcher.deleted_webhook.lock().unwrap(), Some(true));
    }

    #[tokio::test]
    async fn empty_backlog_keeps_offset() {
        let fetcher = ScriptedFetcher::new(vec![Ok(vec![]), Ok(vec![text_update(3, "x")])]);
        let (received, result) =
            run_until_idle(Arc::clone(&fetcher), PollingConfig::default(), 1).await;
        result.unwrap();

        assert_eq!(received[0].id.0, 3);
        let requests = fetcher.requests();
        assert_eq!(requests[1].offset, 0);
        assert_eq!(requests[1].timeout_secs, 30);
    }

    #[tokio::test]
    async fn fetch_error_terminates_loop() {
        let fetcher = ScriptedFetcher::new(vec![
            Ok(vec![text_update(1, "a")]),
            Err(Error::SinkClosed),
            Ok(vec![text_update(2, "never")]),
        ]);
        let (tx, mut rx) = mpsc::channel(16);
        let poller = Poller::new(fetcher.clone(), PollingConfig::default());

        let err = poller.run(CancellationToken::new(), tx).await.unwrap_err();
        assert!(matches!(err, Error::FetchFailed { offset: 2, .. }));
        assert_eq!(rx.recv().await.unwrap().id.0, 1);
        assert!(rx.recv().await.is_none());
        assert_eq!(fetcher.requests().len(), 2);
    }

    #[tokio::test]
    async fn cancellation_interrupts_pending_fetch() {
        let fetcher = ScriptedFetcher::new(vec![]);
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let poller = Poller::new(fetcher, PollingConfig::default());

        let handle = tokio::spawn({
            let cancel = cancel.clone();
            async move { poller.run(cancel, tx).await }
        });
        tokio::task::yield_now().await;
        cancel.cancel();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn closed_sink_is_reported() {
        let fetcher = ScriptedFetcher::new(vec![Ok(vec![text_update(1, "a")])]);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let poller = Poller::new(fetcher, PollingConfig::default());
        let err = poller.run(CancellationToken::new(), tx).await.unwrap_err();
        assert!(matches!(err, Error::SinkClosed));
    }

    #[test]
    fn next_offset_acknowledges_last_update() {
        assert_eq!(next_offset(&[]), None);
        assert_eq!(
            next_offset(&[text_update(41, "a"), text_update(42, "b")]),
            Some(43)
        );
    }
}
