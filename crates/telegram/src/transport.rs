//! Bot API implementation of the engine's transport seam.

use std::sync::{Arc, Mutex};

use {
    async_trait::async_trait,
    teloxide::{
        ApiError, RequestError,
        net::Download,
        payloads::SendDocumentSetters,
        prelude::*,
        types::{ChatId, InputFile, MessageId, Recipient},
    },
    tempfile::NamedTempFile,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use courier_engine::{
    transport::{DownloadedDocument, Result, SessionInfo, Transport, TransportError},
    types::{ChannelRef, RemoteMessage},
};

use crate::{
    cache::{UpdateCache, run_update_poller},
    config::TelegramConfig,
};

pub struct TelegramTransport {
    bot: Bot,
    cache: Arc<UpdateCache>,
    poller_cancel: CancellationToken,
    poller_started: Mutex<bool>,
}

impl TelegramTransport {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        // Client timeout must exceed the 30s long-polling timeout so the
        // HTTP client never aborts a getUpdates call early.
        let client = teloxide::net::default_reqwest_settings()
            .timeout(std::time::Duration::from_secs(45))
            .build()
            .map_err(|e| TransportError::external("building http client", e))?;
        Ok(Self {
            bot: Bot::with_client(config.token(), client),
            cache: Arc::new(UpdateCache::default()),
            poller_cancel: CancellationToken::new(),
            poller_started: Mutex::new(false),
        })
    }

    /// Spawn the background update poller exactly once.
    fn ensure_poller(&self) {
        let mut started = self
            .poller_started
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if *started {
            return;
        }
        *started = true;

        let bot = self.bot.clone();
        let cache = Arc::clone(&self.cache);
        let cancel = self.poller_cancel.clone();
        tokio::spawn(run_update_poller(bot, cache, cancel));
    }
}

/// Turn an identifier into an addressable recipient. Numeric identifiers are
/// chat ids; anything else is treated as a public channel username.
fn parse_recipient(identifier: &str) -> Recipient {
    if let Ok(id) = identifier.parse::<i64>() {
        return Recipient::Id(ChatId(id));
    }
    let username = identifier.trim_start_matches('@');
    Recipient::ChannelUsername(format!("@{username}"))
}

/// Map a Bot API failure onto the engine's error vocabulary.
fn map_request_error(error: RequestError, channel: &str, context: &str) -> TransportError {
    match error {
        RequestError::RetryAfter(wait) => TransportError::RateLimited {
            seconds: wait.duration().as_secs(),
        },
        RequestError::Api(ApiError::ChatNotFound) => TransportError::not_found(channel),
        RequestError::Api(
            ApiError::BotKicked
            | ApiError::BotKickedFromSupergroup
            | ApiError::NotEnoughRightsToPostMessages,
        ) => TransportError::unavailable(channel),
        other => TransportError::external(context.to_owned(), other),
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn connect(&self) -> Result<SessionInfo> {
        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| TransportError::auth(format!("getMe failed: {e}")))?;

        // Long polling only works with no webhook registered.
        if let Err(e) = self.bot.delete_webhook().await {
            warn!(error = %e, "failed to clear webhook");
        }

        self.ensure_poller();

        info!(username = %me.username(), "connected to telegram");
        Ok(SessionInfo {
            username: me.user.username.clone(),
            display_name: me.user.first_name.clone(),
        })
    }

    async fn resolve_channel(&self, identifier: &str) -> Result<ChannelRef> {
        let chat = self
            .bot
            .get_chat(parse_recipient(identifier))
            .await
            .map_err(|e| map_request_error(e, identifier, "getChat"))?;

        debug!(identifier, chat_id = chat.id.0, "resolved channel");
        Ok(ChannelRef {
            input: identifier.to_owned(),
            chat_id: chat.id.0,
            title: chat.title().map(str::to_owned),
        })
    }

    async fn recent_messages(
        &self,
        channel: &ChannelRef,
        limit: usize,
    ) -> Result<Vec<RemoteMessage>> {
        // Served from the update-fed cache; channels that have posted nothing
        // since startup legitimately yield no messages.
        Ok(self.cache.recent(channel.chat_id, limit))
    }

    async fn download(&self, message: &RemoteMessage) -> Result<DownloadedDocument> {
        let document = message
            .document
            .as_ref()
            .ok_or_else(|| TransportError::external(
                "download",
                std::io::Error::other("message has no document"),
            ))?;

        let file = self
            .bot
            .get_file(document.remote_id.clone())
            .await
            .map_err(|e| map_request_error(e, &message.chat_id.to_string(), "getFile"))?;

        let temp = NamedTempFile::new()?;
        let mut dst = tokio::fs::File::create(temp.path()).await?;
        self.bot
            .download_file(&file.path, &mut dst)
            .await
            .map_err(|e| TransportError::external("downloadFile", e))?;
        dst.sync_all().await?;

        debug!(
            message_id = message.id,
            size = document.size,
            "downloaded document"
        );
        Ok(DownloadedDocument::new(temp, document.size))
    }

    async fn publish_document(
        &self,
        destination: &ChannelRef,
        bytes: &[u8],
        filename: &str,
        caption: &str,
    ) -> Result<()> {
        let input = InputFile::memory(bytes.to_vec()).file_name(filename.to_owned());
        self.bot
            .send_document(parse_recipient(&destination.input), input)
            .caption(caption)
            .await
            .map_err(|e| map_request_error(e, &destination.input, "sendDocument"))?;

        info!(
            destination = %destination.display_name(),
            filename,
            "published document"
        );
        Ok(())
    }

    async fn forward_message(
        &self,
        destination: &ChannelRef,
        message: &RemoteMessage,
    ) -> Result<()> {
        let message_id = i32::try_from(message.id)
            .map_err(|e| TransportError::external("forwardMessage", e))?;
        self.bot
            .forward_message(
                ChatId(destination.chat_id),
                ChatId(message.chat_id),
                MessageId(message_id),
            )
            .await
            .map_err(|e| map_request_error(e, &destination.input, "forwardMessage"))?;

        info!(
            destination = %destination.display_name(),
            message_id = message.id,
            "forwarded message"
        );
        Ok(())
    }

    async fn disconnect(&self) {
        self.poller_cancel.cancel();
        info!("telegram transport disconnected");
    }
}
