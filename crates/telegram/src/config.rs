use secrecy::{ExposeSecret, Secret};

/// Configuration for the Telegram transport.
#[derive(Clone)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    pub token: Secret<String>,
}

impl TelegramConfig {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Secret::new(token.into()),
        }
    }

    #[must_use]
    pub(crate) fn token(&self) -> &str {
        self.token.expose_secret()
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"[REDACTED]")
            .finish()
    }
}
