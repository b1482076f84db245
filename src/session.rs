use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub id: String,
}

impl SessionUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// The auth provider has not answered yet.
    #[default]
    Pending,
    SignedOut,
    SignedIn(SessionUser),
}

impl SessionState {
    pub fn user(&self) -> Option<&SessionUser> {
        match self {
            SessionState::SignedIn(user) => Some(user),
            _ => None,
        }
    }
}

/// Source of the signed-in user. `subscribe` yields every login and logout.
pub trait SessionProvider: Send + Sync {
    fn current_user(&self) -> Option<SessionUser>;
    fn subscribe(&self) -> watch::Receiver<SessionState>;
}

/// Session backed by a watch channel; whoever owns it decides when the
/// session resolves.
pub struct WatchSession {
    tx: watch::Sender<SessionState>,
}

impl WatchSession {
    #[cfg(test)]
    pub fn pending() -> Self {
        let (tx, _rx) = watch::channel(SessionState::Pending);
        Self { tx }
    }

    pub fn signed_in(user: SessionUser) -> Self {
        let (tx, _rx) = watch::channel(SessionState::SignedIn(user));
        Self { tx }
    }

    #[cfg(test)]
    pub fn resolve(&self, state: SessionState) {
        self.tx.send_replace(state);
    }
}

impl SessionProvider for WatchSession {
    fn current_user(&self) -> Option<SessionUser> {
        self.tx.borrow().user().cloned()
    }

    fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }
}
