use std::sync::RwLock;

/// Source of the bearer token attached to chat requests.
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
    /// Forgets the current token, e.g. after the backend rejected it.
    fn clear(&self);
}

/// Provider for anonymous requests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoToken;

impl TokenProvider for NoToken {
    fn token(&self) -> Option<String> {
        None
    }

    fn clear(&self) {}
}

/// In-memory token slot.
#[derive(Debug, Default)]
pub struct MemoryToken {
    token: RwLock<Option<String>>,
}

impl MemoryToken {
    pub fn new(token: Option<String>) -> Self {
        let token = token
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty());
        Self {
            token: RwLock::new(token),
        }
    }
}

impl TokenProvider for MemoryToken {
    fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|slot| slot.clone())
    }

    fn clear(&self) {
        if let Ok(mut slot) = self.token.write() {
            *slot = None;
        }
    }
}
