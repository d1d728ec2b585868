//! Per-session decode state.
//!
//! A [`Session`] pairs the token history of a conversation with the model's
//! incremental context for it. The [`SessionStore`] owns every session by
//! value, keyed by the caller-supplied id; removing an entry or dropping the
//! store drops the context with it.
//!
//! There is no eviction. Every distinct id adds an entry for the lifetime of
//! the store.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::TokenId;

/// Key used when a request carries an empty session id.
pub const DEFAULT_SESSION_KEY: &str = "__default__";

/// Token history plus the incremental context it was evaluated into.
///
/// `tokens().len()` always equals the number of tokens evaluated through the
/// context. Not `Clone`: the context owns a cache that cannot be duplicated.
#[derive(Debug)]
pub struct Session<C> {
    tokens: Vec<TokenId>,
    context: C,
}

impl<C> Session<C> {
    /// A session with an empty history over a fresh context.
    pub fn new(context: C) -> Self {
        Self {
            tokens: Vec::new(),
            context,
        }
    }

    /// Every token evaluated so far, BOS first.
    pub fn tokens(&self) -> &[TokenId] {
        &self.tokens
    }

    /// No token has been evaluated yet.
    pub fn is_fresh(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    /// Record tokens that were just evaluated through the context.
    pub fn record(&mut self, tokens: &[TokenId]) {
        self.tokens.extend_from_slice(tokens);
    }
}

/// Sessions keyed by id.
#[derive(Debug)]
pub struct SessionStore<C> {
    sessions: HashMap<String, Session<C>>,
}

impl<C> Default for SessionStore<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> SessionStore<C> {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Map a request's session id to its store key.
    pub fn resolve_key(session_id: &str) -> &str {
        if session_id.is_empty() {
            DEFAULT_SESSION_KEY
        } else {
            session_id
        }
    }

    /// Fetch the session for `session_id`, creating it with a context from
    /// `create` on first use. A failed `create` leaves the store unchanged.
    pub fn get_or_create<E, F>(&mut self, session_id: &str, create: F) -> Result<&mut Session<C>, E>
    where
        F: FnOnce() -> Result<C, E>,
    {
        let key = Self::resolve_key(session_id);
        match self.sessions.entry(key.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let context = create()?;
                tracing::debug!(session = key, "session created");
                Ok(entry.insert(Session::new(context)))
            }
        }
    }

    pub fn get(&self, session_id: &str) -> Option<&Session<C>> {
        self.sessions.get(Self::resolve_key(session_id))
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(Self::resolve_key(session_id))
    }

    /// Drop a session and its context. Returns whether it existed.
    pub fn remove(&mut self, session_id: &str) -> bool {
        self.sessions.remove(Self::resolve_key(session_id)).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
