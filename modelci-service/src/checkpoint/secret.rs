// Secrets
// Gated-download tokens, where they come from and how they are kept out of logs

use std::collections::HashMap;
use std::fmt;

/// Replacement text for redacted secret values
pub const REDACTED: &str = "***";

/// A credential for gated checkpoint downloads.
///
/// Has no `Display`, and `Debug` never shows the value.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    /// Wrap a value; empty or whitespace-only values are treated as absent
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken(***)")
    }
}

/// Source of named secrets
pub trait SecretStore: Send + Sync {
    fn get(&self, name: &str) -> Option<SecretToken>;
}

/// Reads secrets from the process environment (how CI injects them)
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
    fn get(&self, name: &str) -> Option<SecretToken> {
        std::env::var(name).ok().and_then(SecretToken::new)
    }
}

/// Fixed in-memory secrets
#[derive(Debug, Clone, Default)]
pub struct StaticSecretStore {
    secrets: HashMap<String, SecretToken>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let Some(token) = SecretToken::new(value) {
            self.secrets.insert(name.into(), token);
        }
        self
    }
}

impl SecretStore for StaticSecretStore {
    fn get(&self, name: &str) -> Option<SecretToken> {
        self.secrets.get(name).cloned()
    }
}

/// Masks known secret values in text
#[derive(Default)]
pub struct Redactor {
    tokens: Vec<SecretToken>,
}

impl Redactor {
    pub fn new<'a>(tokens: impl IntoIterator<Item = &'a SecretToken>) -> Self {
        let mut tokens: Vec<SecretToken> = tokens.into_iter().cloned().collect();
        // Longest first so overlapping secrets are fully masked
        tokens.sort_by_key(|t| std::cmp::Reverse(t.0.len()));
        Self { tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn redact(&self, text: &str) -> String {
        let mut text = text.to_string();
        for token in &self.tokens {
            if text.contains(token.expose()) {
                text = text.replace(token.expose(), REDACTED);
            }
        }
        text
    }
}

impl fmt::Debug for Redactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Redactor")
            .field("secrets", &self.tokens.len())
            .finish()
    }
}
