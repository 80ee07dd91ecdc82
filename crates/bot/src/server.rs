//! The assembled bot: admission control, transport, update source, session
//! dispatcher and router.

use std::{collections::HashSet, sync::Arc, time::Duration};

use {
    secrecy::ExposeSecret,
    switchboard_common::{
        SessionKey,
        update::{UpdateType, kind_name},
    },
    switchboard_config::{SwitchboardConfig, UpdateMode},
    switchboard_routing::{
        Error as RouteError, Event, Handler, Route, Router, RouterConfig, SharedRoute, handler_fn,
    },
    switchboard_service_traits::ChatClient,
    switchboard_sessions::{Dispatcher, NoopSessionHandler, SessionFactory, SessionHandler},
    switchboard_transport::{AdmissionControl, TelegramTransport},
    switchboard_updates::{
        Poller, TelegramFetcher, UpdateSource, WebhookListener, build_bot, register_webhook,
    },
    teloxide::{
        Bot,
        requests::{Request, Requester},
    },
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    settings::{polling_config, rate_limit_config},
};

/// Updates buffered between the source and the dispatcher.
const UPDATE_QUEUE_CAPACITY: usize = 256;

/// Serves whitelisted chats with the shared router and ignores the rest.
pub struct AllowlistFactory {
    allowed: HashSet<i64>,
    router: Arc<Router>,
}

impl AllowlistFactory {
    #[must_use]
    pub fn new(allowed: impl IntoIterator<Item = i64>, router: Arc<Router>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
            router,
        }
    }
}

impl SessionFactory for AllowlistFactory {
    fn create(&self, key: SessionKey) -> Arc<dyn SessionHandler> {
        if self.allowed.contains(&key.0) {
            debug!(session = %key, "session opened");
            Arc::clone(&self.router) as Arc<dyn SessionHandler>
        } else {
            debug!(session = %key, "chat not allowed, ignoring its updates");
            Arc::new(NoopSessionHandler)
        }
    }
}

/// Not-found hook that only records the miss.
#[must_use]
pub fn log_not_found() -> impl Handler {
    handler_fn(|event: Event| async move {
        debug!(
            update_id = event.update.id.0,
            chat_id = event.chat().map(|c| c.id.0),
            kind = kind_name(&event.update),
            "route not found"
        );
        Ok(())
    })
}

/// Error hook that logs the failure with the chat it happened in.
pub fn log_error(event: &Event, error: &RouteError) {
    warn!(
        update_id = event.update.id.0,
        chat_id = event.chat().map(|c| c.id.0),
        kind = kind_name(&event.update),
        error = %error,
        "update handling failed"
    );
}

struct WebhookRegistration {
    url: String,
    drop_pending: bool,
    secret: Option<String>,
    allowed: Vec<UpdateType>,
}

pub struct BotServer {
    bot: Bot,
    admission: Arc<AdmissionControl>,
    transport: TelegramTransport,
    source: UpdateSource,
    webhook: Option<WebhookRegistration>,
    allowed_chats: Vec<i64>,
    bot_username: Option<String>,
    routes: Vec<SharedRoute>,
    cancel: CancellationToken,
}

impl BotServer {
    /// Build every component from `config`. Nothing touches the network
    /// until [`run`](Self::run).
    pub fn new(config: &SwitchboardConfig, cancel: CancellationToken) -> Result<Self> {
        let token = config.telegram.token.as_ref().ok_or(Error::MissingToken)?;
        let updates = &config.updates;

        let admission = Arc::new(AdmissionControl::new(rate_limit_config(&config.rate_limit)));
        let bot = build_bot(
            token.expose_secret(),
            Duration::from_secs(u64::from(updates.poll_timeout_secs)),
        )?;
        let transport = TelegramTransport::new(bot.clone(), Arc::clone(&admission), cancel.clone());

        let secret = updates
            .webhook
            .secret
            .as_ref()
            .map(|s| s.expose_secret().clone());
        let (source, webhook) = match updates.mode {
            UpdateMode::Polling => {
                let fetcher = TelegramFetcher::new(bot.clone()).with_admission(Arc::clone(&admission));
                let poller = Poller::new(Arc::new(fetcher), polling_config(updates));
                (UpdateSource::Polling(poller), None)
            },
            UpdateMode::Webhook => {
                let url = updates
                    .webhook
                    .url
                    .clone()
                    .ok_or(Error::MissingWebhookUrl)?;
                let listener = WebhookListener {
                    listen: updates.webhook.listen,
                    path: updates.webhook.path.clone(),
                    secret: secret.clone(),
                };
                let registration = WebhookRegistration {
                    url,
                    drop_pending: updates.drop_pending,
                    secret,
                    allowed: updates.allowed.clone(),
                };
                (UpdateSource::Webhook(listener), Some(registration))
            },
        };

        if config.access.allowed_chats.is_empty() {
            warn!("access.allowed_chats is empty, every update will be ignored");
        }

        Ok(Self {
            bot,
            admission,
            transport,
            source,
            webhook,
            allowed_chats: config.access.allowed_chats.clone(),
            bot_username: config.telegram.username.clone(),
            routes: Vec::new(),
            cancel,
        })
    }

    /// Replace the configured update source. No webhook is registered for a
    /// replaced source.
    #[must_use]
    pub fn with_source(mut self, source: UpdateSource) -> Self {
        self.source = source;
        self.webhook = None;
        self
    }

    /// Add a route to the shared router. Routes are tried in mount order.
    #[must_use]
    pub fn mount(mut self, route: impl Route + 'static) -> Self {
        self.routes.push(Arc::new(route));
        self
    }

    #[must_use]
    pub fn mount_shared(mut self, route: SharedRoute) -> Self {
        self.routes.push(route);
        self
    }

    /// Rate-limited outbound client for handlers.
    #[must_use]
    pub fn chat_client(&self) -> Arc<dyn ChatClient> {
        Arc::new(self.transport.clone())
    }

    #[must_use]
    pub fn transport(&self) -> &TelegramTransport {
        &self.transport
    }

    #[must_use]
    pub fn admission(&self) -> &Arc<AdmissionControl> {
        &self.admission
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Configured username, or the one the platform reports for the token.
    async fn resolve_username(&self) -> Result<String> {
        if let Some(username) = &self.bot_username {
            return Ok(username.clone());
        }
        let me = self
            .transport
            .run_request("get_me", None, || self.bot.get_me().send())
            .await?;
        Ok(me.user.username.clone().unwrap_or_default())
    }

    fn router(&self, username: String) -> Router {
        let config = RouterConfig::default()
            .with_bot_username(username)
            .with_not_found(log_not_found())
            .with_error_handler(log_error)
            .recover_panics();
        self.routes
            .iter()
            .fold(Router::new(config), |router, route| {
                router.mount_shared(Arc::clone(route))
            })
    }

    /// Run until the cancel token fires or the update source fails.
    ///
    /// When the source stops, the dispatcher drains what was already queued
    /// before this returns. Handlers still running are left to finish.
    pub async fn run(self) -> Result<()> {
        let username = self.resolve_username().await?;

        if let Some(webhook) = &self.webhook {
            register_webhook(
                &self.bot,
                &webhook.url,
                webhook.drop_pending,
                webhook.secret.as_deref(),
                &webhook.allowed,
            )
            .await?;
        }

        let router = Arc::new(self.router(username.clone()));
        let factory = AllowlistFactory::new(self.allowed_chats.iter().copied(), router);
        let dispatcher = Dispatcher::new(Arc::new(factory));
        let (tx, rx) = mpsc::channel(UPDATE_QUEUE_CAPACITY);

        info!(
            mode = self.source.mode(),
            username = %username,
            routes = self.routes.len(),
            allowed_chats = self.allowed_chats.len(),
            "bot server started"
        );

        let (source_result, ()) = tokio::join!(
            self.source.run(self.cancel.clone(), tx),
            dispatcher.listen(self.cancel.clone(), rx),
        );

        match &source_result {
            Ok(()) => info!("bot server stopped"),
            Err(e) => warn!(error = %e, "update source failed, bot server stopped"),
        }
        Ok(source_result?)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use {
        async_trait::async_trait,
        secrecy::Secret,
        switchboard_common::fixtures,
        switchboard_routing::command_route,
        switchboard_updates::{FetchRequest, PollingConfig, UpdateFetcher},
        teloxide::types::Update,
    };

    use super::*;

    const ALLOWED: i64 = 100;
    const STRANGER: i64 = 200;

    fn config() -> SwitchboardConfig {
        let mut config = SwitchboardConfig::default();
        config.telegram.token = Some(Secret::new("123:test-token".to_string()));
        config.telegram.username = Some(fixtures::BOT_USERNAME.into());
        config.access.allowed_chats = vec![ALLOWED];
        config
    }

    /// Serves its batches in order, then waits for cancellation.
    struct ScriptedFetcher {
        batches: Mutex<VecDeque<switchboard_updates::Result<Vec<Update>>>>,
    }

    impl ScriptedFetcher {
        fn new(batches: Vec<switchboard_updates::Result<Vec<Update>>>) -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(batches.into()),
            })
        }
    }

    #[async_trait]
    impl UpdateFetcher for ScriptedFetcher {
        async fn fetch(
            &self,
            cancel: &CancellationToken,
            _request: &FetchRequest,
        ) -> switchboard_updates::Result<Vec<Update>> {
            let next = self.batches.lock().unwrap().pop_front();
            match next {
                Some(batch) => batch,
                None => {
                    cancel.cancelled().await;
                    Ok(Vec::new())
                },
            }
        }

        async fn delete_webhook(&self, _drop_pending: bool) -> switchboard_updates::Result<()> {
            Ok(())
        }
    }

    fn scripted(batches: Vec<switchboard_updates::Result<Vec<Update>>>) -> UpdateSource {
        UpdateSource::Polling(Poller::new(
            ScriptedFetcher::new(batches),
            PollingConfig::default(),
        ))
    }

    fn numbered(id: u32, chat_id: i64, text: &str) -> Update {
        fixtures::update(
            id,
            "message",
            fixtures::message(
                fixtures::private_chat(chat_id),
                Some(fixtures::user(chat_id)),
                Some(text),
            ),
        )
    }

    fn reporting(seen: mpsc::UnboundedSender<i64>) -> impl Handler {
        handler_fn(move |event: Event| {
            let seen = seen.clone();
            async move {
                if let Some(chat) = event.chat() {
                    let _ = seen.send(chat.id.0);
                }
                Ok(())
            }
        })
    }

    #[test]
    fn missing_token_is_rejected() {
        let err = BotServer::new(&SwitchboardConfig::default(), CancellationToken::new())
            .err()
            .unwrap();
        assert!(matches!(err, Error::MissingToken));
    }

    #[tokio::test]
    async fn webhook_mode_requires_url() {
        let mut config = config();
        config.updates.mode = UpdateMode::Webhook;
        let err = BotServer::new(&config, CancellationToken::new())
            .err()
            .unwrap();
        assert!(matches!(err, Error::MissingWebhookUrl));

        config.updates.webhook.url = Some("https://bot.example.com/hook".into());
        let server = BotServer::new(&config, CancellationToken::new()).unwrap();
        assert_eq!(server.source.mode(), "webhook");
        assert!(server.webhook.is_some());
    }

    #[tokio::test]
    async fn allowlist_decides_which_sessions_see_the_router() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let router = Arc::new(
            Router::new(RouterConfig::default()).mount(command_route("ping", None, reporting(tx))),
        );
        let factory = AllowlistFactory::new([ALLOWED], router);

        factory
            .create(SessionKey(STRANGER))
            .handle_update(
                CancellationToken::new(),
                Arc::new(numbered(1, STRANGER, "/ping")),
            )
            .await;
        factory
            .create(SessionKey(ALLOWED))
            .handle_update(
                CancellationToken::new(),
                Arc::new(numbered(2, ALLOWED, "/ping")),
            )
            .await;

        assert_eq!(rx.try_recv().unwrap(), ALLOWED);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn run_routes_polled_updates_until_cancelled() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let source = scripted(vec![Ok(vec![
            numbered(1, STRANGER, "/ping"),
            numbered(2, ALLOWED, "hello"),
            numbered(3, ALLOWED, "/ping"),
        ])]);
        let server = BotServer::new(&config(), cancel.clone())
            .unwrap()
            .with_source(source)
            .mount(command_route("ping", None, reporting(tx)));

        let running = tokio::spawn(server.run());

        let chat = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(chat, ALLOWED);

        cancel.cancel();
        running.await.unwrap().unwrap();
        // The stranger's /ping never reached a route.
        assert!(rx.try_recv().is_err());
    }

    /// Serves one batch, then cancels the server on the next round trip.
    struct CancelAfterBatch {
        batch: Mutex<Option<Vec<Update>>>,
        cancel: CancellationToken,
    }

    #[async_trait]
    impl UpdateFetcher for CancelAfterBatch {
        async fn fetch(
            &self,
            _cancel: &CancellationToken,
            _request: &FetchRequest,
        ) -> switchboard_updates::Result<Vec<Update>> {
            let batch = self.batch.lock().unwrap().take();
            if batch.is_none() {
                self.cancel.cancel();
            }
            Ok(batch.unwrap_or_default())
        }

        async fn delete_webhook(&self, _drop_pending: bool) -> switchboard_updates::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn updates_queued_before_cancel_are_still_handled() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let fetcher = Arc::new(CancelAfterBatch {
            batch: Mutex::new(Some(
                (1..=5).map(|id| numbered(id, ALLOWED, "/ping")).collect(),
            )),
            cancel: cancel.clone(),
        });
        let server = BotServer::new(&config(), cancel)
            .unwrap()
            .with_source(UpdateSource::Polling(Poller::new(
                fetcher,
                PollingConfig::default(),
            )))
            .mount(command_route("ping", None, reporting(tx)));

        tokio::time::timeout(Duration::from_secs(5), server.run())
            .await
            .unwrap()
            .unwrap();

        for _ in 0..5 {
            let chat = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(chat, ALLOWED);
        }
    }

    #[tokio::test]
    async fn fetch_failure_stops_the_server() {
        let source = scripted(vec![Err(switchboard_updates::Error::fetch_failed(
            0,
            std::io::Error::other("connection reset"),
        ))]);
        let server = BotServer::new(&config(), CancellationToken::new())
            .unwrap()
            .with_source(source)
            .mount(command_route("ping", None, log_not_found()));

        let err = tokio::time::timeout(Duration::from_secs(5), server.run())
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Updates(switchboard_updates::Error::FetchFailed { .. })
        ));
    }

    #[test]
    fn router_gets_logging_hooks_and_routes() {
        let server = BotServer::new(&config(), CancellationToken::new())
            .unwrap()
            .mount(command_route("ping", None, log_not_found()))
            .mount(command_route("pong", None, log_not_found()));
        let router = server.router(fixtures::BOT_USERNAME.into());
        assert_eq!(router.len(), 2);
        assert!(router.config().not_found.is_some());
        assert!(router.config().error_handler.is_some());
        assert!(router.config().recover_handler.is_some());
        assert_eq!(
            router.config().bot_username.as_deref(),
            Some(fixtures::BOT_USERNAME)
        );
    }
}
