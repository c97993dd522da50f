//! Owner of the application state and the action stream.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::{
    actions::Action,
    persist::{SliceStorage, AUTH_KEY},
    slice::RequestId,
    state::{AppState, AuthState},
};

const ACTION_CHANNEL_CAPACITY: usize = 1024;

/// Supplies the bearer token for outgoing calls.
pub trait TokenSource: Send + Sync {
    fn token(&self) -> Option<String>;
}

pub struct Store {
    state: watch::Sender<AppState>,
    actions: broadcast::Sender<Action>,
    next_request: AtomicU64,
    storage: Arc<dyn SliceStorage>,
}

impl Store {
    pub fn new(storage: Arc<dyn SliceStorage>) -> Arc<Self> {
        let initial = AppState {
            auth: rehydrate_auth(storage.as_ref()),
            ..AppState::default()
        };
        let (state, _) = watch::channel(initial);
        let (actions, _) = broadcast::channel(ACTION_CHANNEL_CAPACITY);
        Arc::new(Self {
            state,
            actions,
            next_request: AtomicU64::new(1),
            storage,
        })
    }

    pub fn state(&self) -> AppState {
        self.state.borrow().clone()
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&AppState) -> R) -> R {
        f(&self.state.borrow())
    }

    pub fn next_request_id(&self) -> RequestId {
        RequestId(self.next_request.fetch_add(1, Ordering::Relaxed))
    }

    pub fn dispatch(&self, action: impl Into<Action>) {
        let action = action.into();
        let mut auth_changed = false;
        let changed = self.state.send_if_modified(|state| {
            let before = state.clone();
            state.reduce(&action);
            auth_changed = state.auth != before.auth;
            *state != before
        });
        debug!(action = action.name(), changed, "store: dispatched");

        if auth_changed {
            self.persist_auth();
        }

        if self.actions.send(action).is_err() {
            debug!("store: no listener attached");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.state.subscribe()
    }

    pub fn subscribe_actions(&self) -> broadcast::Receiver<Action> {
        self.actions.subscribe()
    }

    /// Resolves with the first state that satisfies `predicate`, starting with the current one.
    pub async fn wait_until(&self, mut predicate: impl FnMut(&AppState) -> bool) -> AppState {
        let mut receiver = self.state.subscribe();
        let state = match receiver.wait_for(|state| predicate(state)).await {
            Ok(state) => state.clone(),
            // The sender is owned by `self`, so the channel outlives this call.
            Err(_) => self.state(),
        };
        state
    }

    fn persist_auth(&self) {
        let json = match self.with_state(|state| serde_json::to_string(&state.auth)) {
            Ok(json) => json,
            Err(err) => {
                warn!("store: failed to encode auth slice: {err}");
                return;
            }
        };
        if let Err(err) = self.storage.save(AUTH_KEY, &json) {
            warn!(key = AUTH_KEY, "store: failed to persist slice: {err:#}");
        }
    }
}

impl TokenSource for Store {
    fn token(&self) -> Option<String> {
        self.state.borrow().auth.token.clone()
    }
}

fn rehydrate_auth(storage: &dyn SliceStorage) -> AuthState {
    let json = match storage.load(AUTH_KEY) {
        Ok(Some(json)) => json,
        Ok(None) => return AuthState::default(),
        Err(err) => {
            warn!(key = AUTH_KEY, "store: failed to load persisted slice: {err:#}");
            return AuthState::default();
        }
    };
    match serde_json::from_str::<AuthState>(&json) {
        Ok(auth) => auth.restored(),
        Err(err) => {
            warn!(key = AUTH_KEY, "store: discarding unreadable persisted slice: {err}");
            AuthState::default()
        }
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
