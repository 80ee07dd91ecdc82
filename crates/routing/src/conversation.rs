//! Multi-step conversations driven by stored state.
//!
//! A [`ConversationRoute`] looks up the stored state for the event's
//! `(conversation, user, chat)` and delegates to the route registered for
//! that state. Handlers request transitions through [`ConversationContext`];
//! a transition is stored only once the handler has returned `Ok`, and then
//! the enter effects registered for the new state run in the same dispatch.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
};

use {
    async_trait::async_trait,
    serde_json::Value,
    switchboard_state::{ConversationData, ConversationStore, PersistenceKey},
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use switchboard_metrics::{counter, routing as routing_metrics};

use crate::{
    error::{Error, Result},
    event::Event,
    handler::{Handler, SharedHandler},
    route::{Route, SharedRoute, first_match},
};

/// Conversation state as seen by one handler invocation.
pub struct ConversationContext {
    store: Arc<dyn ConversationStore>,
    key: PersistenceKey,
    state: String,
    next_state: Mutex<Option<String>>,
}

impl ConversationContext {
    fn new(store: Arc<dyn ConversationStore>, key: PersistenceKey, state: String) -> Self {
        Self {
            store,
            key,
            state,
            next_state: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn key(&self) -> &PersistenceKey {
        &self.key
    }

    /// State the conversation was in when this handler started.
    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Move to `state` once the current handler returns successfully. The
    /// last call wins.
    pub fn set_state(&self, state: impl Into<String>) {
        *self.next_state.lock().unwrap_or_else(|e| e.into_inner()) = Some(state.into());
    }

    /// Return to the empty state, ending the conversation.
    pub fn end(&self) {
        self.set_state("");
    }

    #[must_use]
    pub fn pending_state(&self) -> Option<String> {
        self.next_state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn take_pending(&self) -> Option<String> {
        self.next_state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    pub async fn data(&self) -> Result<ConversationData> {
        Ok(self.store.get_data(&self.key).await?)
    }

    pub async fn set_data(&self, data: ConversationData) -> Result<()> {
        Ok(self.store.set_data(&self.key, data).await?)
    }

    /// Set one entry, keeping the rest.
    pub async fn insert(&self, field: impl Into<String>, value: Value) -> Result<()> {
        let mut data = self.data().await?;
        data.insert(field.into(), value);
        self.set_data(data).await
    }

    pub async fn clear_data(&self) -> Result<()> {
        Ok(self.store.clear_data(&self.key).await?)
    }
}

impl fmt::Debug for ConversationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationContext")
            .field("key", &self.key)
            .field("state", &self.state)
            .field("next_state", &self.pending_state())
            .finish_non_exhaustive()
    }
}

/// The route a conversation picked for an event in `matches`, handed to
/// `handle` so the choice is not made twice.
#[derive(Clone)]
pub(crate) struct Selection {
    key: PersistenceKey,
    state: String,
    route: SharedRoute,
}

/// Routes per state, plus the effects to run on entering a state.
#[derive(Default)]
pub struct StateTable {
    routes: HashMap<String, SharedRoute>,
    on_enter: HashMap<String, Vec<SharedHandler>>,
}

impl StateTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route for events arriving while in `state`. `""` is the state before
    /// the conversation starts.
    #[must_use]
    pub fn state(mut self, state: impl Into<String>, route: impl Route + 'static) -> Self {
        self.routes.insert(state.into(), Arc::new(route));
        self
    }

    /// Run `handler` right after a transition into `state`. Effects run in
    /// registration order. A state set by an effect is stored but does not
    /// trigger further effects.
    #[must_use]
    pub fn on_enter(mut self, state: impl Into<String>, handler: impl Handler + 'static) -> Self {
        self.on_enter
            .entry(state.into())
            .or_default()
            .push(Arc::new(handler));
        self
    }

    #[must_use]
    pub fn route(&self, state: &str) -> Option<&SharedRoute> {
        self.routes.get(state)
    }

    #[must_use]
    pub fn enter_effects(&self, state: &str) -> &[SharedHandler] {
        self.on_enter
            .get(state)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

pub struct ConversationRoute {
    id: Arc<str>,
    store: Arc<dyn ConversationStore>,
    states: StateTable,
    fallbacks: Vec<SharedRoute>,
}

impl ConversationRoute {
    pub fn new(
        id: impl Into<Arc<str>>,
        store: Arc<dyn ConversationStore>,
        states: StateTable,
    ) -> Self {
        Self {
            id: id.into(),
            store,
            states,
            fallbacks: Vec::new(),
        }
    }

    /// Tried, in order, while a conversation is active and the current
    /// state's route does not match. Typical use is `/cancel`.
    #[must_use]
    pub fn with_fallback(mut self, route: impl Route + 'static) -> Self {
        self.fallbacks.push(Arc::new(route));
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Conversations are tracked per user per chat; events missing either
    /// are not part of any conversation.
    fn key_for(&self, event: &Event) -> Option<PersistenceKey> {
        event.user()?;
        event.chat()?;
        Some(PersistenceKey::for_update(
            Arc::clone(&self.id),
            &event.update,
        ))
    }

    async fn select(&self, event: &Event, state: &str) -> Option<SharedRoute> {
        if let Some(route) = self.states.route(state)
            && route.matches(event).await
        {
            return Some(Arc::clone(route));
        }
        if state.is_empty() {
            return None;
        }
        first_match(&self.fallbacks, event).await.cloned()
    }

    /// Read the stored state and pick the route for it. `Ok(None)` when the
    /// event is outside any conversation or nothing in this state matches.
    async fn resolve(&self, event: &Event) -> Result<Option<Selection>> {
        let Some(key) = self.key_for(event) else {
            return Ok(None);
        };
        let state = self.store.get_state(&key).await?;
        let scoped = event.with_conversation(self.context(&key, state.clone()));
        Ok(self
            .select(&scoped, &state)
            .await
            .map(|route| Selection { key, state, route }))
    }

    fn context(&self, key: &PersistenceKey, state: String) -> Arc<ConversationContext> {
        Arc::new(ConversationContext::new(
            Arc::clone(&self.store),
            key.clone(),
            state,
        ))
    }

    async fn transition(&self, event: &Event, key: &PersistenceKey, from: &str, to: String) -> Result<()> {
        self.store.set_state(key, &to).await?;
        debug!(conversation = %self.id, %key, from, to = %to, "conversation state changed");

        #[cfg(feature = "metrics")]
        counter!(routing_metrics::STATE_TRANSITIONS_TOTAL).increment(1);

        for effect in self.states.enter_effects(&to) {
            let context = self.context(key, to.clone());
            effect
                .handle(&event.with_conversation(Arc::clone(&context)))
                .await?;
            if let Some(redirect) = context.take_pending() {
                self.store.set_state(key, &redirect).await?;
                debug!(
                    conversation = %self.id,
                    %key,
                    from = %to,
                    to = %redirect,
                    "conversation state changed by enter effect"
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Route for ConversationRoute {
    async fn matches(&self, event: &Event) -> bool {
        match self.resolve(event).await {
            Ok(Some(selection)) => {
                event.remember_selection(Arc::clone(&self.id), selection);
                true
            },
            Ok(None) => false,
            Err(e) => {
                warn!(conversation = %self.id, error = %e, "conversation state lookup failed");
                false
            },
        }
    }

    /// Runs the route chosen by the preceding `matches`. Called without
    /// one, the selection is made here.
    async fn handle(&self, event: &Event) -> Result<()> {
        let selection = match event.take_selection(&self.id) {
            Some(selection) => selection,
            None => self.resolve(event).await?.ok_or(Error::RouteNotFound)?,
        };
        let Selection { key, state, route } = selection;
        let context = self.context(&key, state.clone());
        route
            .handle(&event.with_conversation(Arc::clone(&context)))
            .await?;

        match context.take_pending() {
            Some(next) => self.transition(event, &key, &state, next).await,
            None => Ok(()),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use {
        serde_json::json,
        switchboard_common::fixtures,
        switchboard_state::MemoryConversationStore,
        teloxide::types::Update,
        tokio_util::sync::CancellationToken,
    };

    use {
        super::*,
        crate::{
            filter::{FilterExt, filter_fn},
            filters,
            handler::handler_fn,
            route::{BasicRoute, command_route, message_route},
            router::{Router, RouterConfig},
        },
    };

    const USER: i64 = 7;

    fn event(update: Update) -> Event {
        Event::new(
            Arc::new(update),
            Some(fixtures::BOT_USERNAME.into()),
            CancellationToken::new(),
        )
    }

    fn text(text: &str) -> Event {
        event(fixtures::private_text(USER, text))
    }

    fn key() -> PersistenceKey {
        PersistenceKey::new("signup", USER as u64, USER)
    }

    fn counting(hits: Arc<AtomicUsize>) -> impl Handler {
        handler_fn(move |_event| {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    async fn start(event: Event) -> Result<()> {
        event.conversation()?.set_state("name");
        Ok(())
    }

    async fn save_name(event: Event) -> Result<()> {
        let context = event.conversation()?;
        context
            .insert("name", json!(event.text().unwrap_or_default()))
            .await?;
        context.set_state("age");
        Ok(())
    }

    async fn finish(event: Event) -> Result<()> {
        let context = event.conversation()?;
        context.clear_data().await?;
        context.end();
        Ok(())
    }

    async fn cancel(event: Event) -> Result<()> {
        event.conversation()?.end();
        Ok(())
    }

    async fn reject(event: Event) -> Result<()> {
        event.conversation()?.set_state("next");
        Err(Error::message("validation failed"))
    }

    async fn go_to_a(event: Event) -> Result<()> {
        event.conversation()?.set_state("a");
        Ok(())
    }

    async fn enter_a(event: Event) -> Result<()> {
        let context = event.conversation()?;
        assert_eq!(context.state(), "a");
        context.set_state("b");
        Ok(())
    }

    fn signup(
        store: &Arc<MemoryConversationStore>,
        entered_age: Arc<AtomicUsize>,
    ) -> ConversationRoute {
        let answers = || Some(filters::has_text().shared());
        let states = StateTable::new()
            .state("", command_route("start", None, handler_fn(start)))
            .state("name", message_route(answers(), handler_fn(save_name)))
            .state("age", message_route(answers(), handler_fn(finish)))
            .on_enter("age", counting(entered_age));
        ConversationRoute::new("signup", store.clone(), states)
            .with_fallback(command_route("cancel", None, handler_fn(cancel)))
    }

    #[tokio::test]
    async fn wizard_walks_through_states() {
        let store = Arc::new(MemoryConversationStore::new());
        let entered_age = Arc::new(AtomicUsize::new(0));
        let conversation = signup(&store, Arc::clone(&entered_age));

        conversation.handle(&text("/start")).await.unwrap();
        assert_eq!(store.record(&key()).unwrap().state, "name");

        conversation.handle(&text("Ada")).await.unwrap();
        let record = store.record(&key()).unwrap();
        assert_eq!(record.state, "age");
        assert_eq!(record.data.get("name"), Some(&json!("Ada")));
        assert_eq!(entered_age.load(Ordering::SeqCst), 1);

        conversation.handle(&text("36")).await.unwrap();
        let record = store.record(&key()).unwrap();
        assert_eq!(record.state, "");
        assert!(record.data.is_empty());
        assert_eq!(entered_age.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fallback_applies_only_while_active() {
        let store = Arc::new(MemoryConversationStore::new());
        let not_found = Arc::new(AtomicUsize::new(0));
        let router =
            Router::new(RouterConfig::default().with_not_found(counting(Arc::clone(&not_found))))
                .mount(signup(&store, Arc::default()));

        router.handle(&text("/cancel")).await.unwrap();
        assert_eq!(not_found.load(Ordering::SeqCst), 1);

        router.handle(&text("/start")).await.unwrap();
        router.handle(&text("/cancel")).await.unwrap();
        assert_eq!(store.record(&key()).unwrap().state, "");
        assert_eq!(not_found.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn router_dispatch_checks_state_filter_once() {
        let store = Arc::new(MemoryConversationStore::new());
        let checks = Arc::new(AtomicUsize::new(0));
        let filter = filter_fn({
            let checks = Arc::clone(&checks);
            move |_event: &Event| {
                checks.fetch_add(1, Ordering::SeqCst);
                true
            }
        });
        let states = StateTable::new().state("", BasicRoute::new(filter, handler_fn(start)));
        let router = Router::new(RouterConfig::default())
            .mount(ConversationRoute::new("signup", store.clone(), states));

        router.handle(&text("hi")).await.unwrap();
        assert_eq!(checks.load(Ordering::SeqCst), 1);
        assert_eq!(store.record(&key()).unwrap().state, "name");
    }

    #[tokio::test]
    async fn handle_runs_the_route_chosen_by_matches() {
        let store = Arc::new(MemoryConversationStore::new());
        let conversation = signup(&store, Arc::default());
        let start_event = text("/start");
        assert!(conversation.matches(&start_event).await);

        // Another update for the same session moves the state on in between.
        store.set_state(&key(), "age").await.unwrap();
        conversation.handle(&start_event).await.unwrap();
        assert_eq!(store.record(&key()).unwrap().state, "name");
    }

    #[tokio::test]
    async fn unmatched_input_in_state_is_not_found() {
        let store = Arc::new(MemoryConversationStore::new());
        let conversation = signup(&store, Arc::default());
        conversation.handle(&text("/start")).await.unwrap();

        // A command other than the fallback is not an answer.
        let probe = text("/help");
        assert!(!conversation.matches(&probe).await);
        assert!(conversation.handle(&probe).await.unwrap_err().is_not_found());
        assert_eq!(store.record(&key()).unwrap().state, "name");
    }

    #[tokio::test]
    async fn failed_handler_keeps_previous_state() {
        let store = Arc::new(MemoryConversationStore::new());
        let states =
            StateTable::new().state("", BasicRoute::new(filters::any(), handler_fn(reject)));
        let conversation = ConversationRoute::new("flaky", store.clone(), states);

        let err = conversation.handle(&text("hi")).await.unwrap_err();
        assert_eq!(err.to_string(), "validation failed");
        let key = PersistenceKey::new("flaky", USER as u64, USER);
        assert!(store.record(&key).is_none());
    }

    #[tokio::test]
    async fn enter_effect_redirect_does_not_chain() {
        let store = Arc::new(MemoryConversationStore::new());
        let entered_b = Arc::new(AtomicUsize::new(0));
        let states = StateTable::new()
            .state("", BasicRoute::new(filters::any(), handler_fn(go_to_a)))
            .on_enter("a", handler_fn(enter_a))
            .on_enter("b", counting(Arc::clone(&entered_b)));
        let conversation = ConversationRoute::new("hop", store.clone(), states);

        conversation.handle(&text("go")).await.unwrap();
        let key = PersistenceKey::new("hop", USER as u64, USER);
        assert_eq!(store.record(&key).unwrap().state, "b");
        assert_eq!(entered_b.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn events_without_user_are_never_in_a_conversation() {
        let store = Arc::new(MemoryConversationStore::new());
        let conversation = signup(&store, Arc::default());
        let post = event(fixtures::update(
            3,
            "channel_post",
            fixtures::message(fixtures::channel_chat(-100), None, Some("/start")),
        ));
        assert!(!conversation.matches(&post).await);
        assert!(conversation.handle(&post).await.unwrap_err().is_not_found());
        assert!(store.is_empty());
    }

    #[test]
    fn conversation_is_absent_outside_a_conversation_route() {
        let err = text("hi").conversation().unwrap_err();
        assert!(matches!(err, Error::NoConversation));
    }

    #[test]
    fn context_debug_shows_key_and_states() {
        let context = ConversationContext::new(
            Arc::new(MemoryConversationStore::new()),
            key(),
            "name".into(),
        );
        context.set_state("age");
        let rendered = format!("{context:?}");
        assert!(rendered.contains("\"name\""));
        assert!(rendered.contains("Some(\"age\")"));
    }

    #[test]
    fn last_set_state_wins() {
        let context = ConversationContext::new(
            Arc::new(MemoryConversationStore::new()),
            key(),
            String::new(),
        );
        assert_eq!(context.pending_state(), None);
        context.set_state("a");
        context.end();
        assert_eq!(context.pending_state().as_deref(), Some(""));
    }

    struct BrokenStore;

    #[async_trait]
    impl ConversationStore for BrokenStore {
        async fn get_state(&self, _key: &PersistenceKey) -> switchboard_state::Result<String> {
            Err(switchboard_state::Error::message("disk full"))
        }

        async fn set_state(
            &self,
            _key: &PersistenceKey,
            _state: &str,
        ) -> switchboard_state::Result<()> {
            Err(switchboard_state::Error::message("disk full"))
        }

        async fn get_data(
            &self,
            _key: &PersistenceKey,
        ) -> switchboard_state::Result<ConversationData> {
            Err(switchboard_state::Error::message("disk full"))
        }

        async fn set_data(
            &self,
            _key: &PersistenceKey,
            _data: ConversationData,
        ) -> switchboard_state::Result<()> {
            Err(switchboard_state::Error::message("disk full"))
        }

        async fn clear_data(&self, _key: &PersistenceKey) -> switchboard_state::Result<()> {
            Err(switchboard_state::Error::message("disk full"))
        }
    }

    #[tokio::test]
    async fn store_failure_means_no_match() {
        let states = StateTable::new().state("", command_route("start", None, handler_fn(start)));
        let conversation = ConversationRoute::new("signup", Arc::new(BrokenStore), states);
        assert!(!conversation.matches(&text("/start")).await);
        assert!(matches!(
            conversation.handle(&text("/start")).await.unwrap_err(),
            Error::Store(_)
        ));
    }
}
