//! # Meeting-Bot Lifecycle Client
//!
//! Thin client for the meeting-bot platform: one request to send a bot into
//! a meeting, one best-effort request to remove it again. No state machine;
//! the only thing remembered between the two calls is the bot's opaque id.

use crate::config::MeetingConfig;
use crate::error::AppResult;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Serialize)]
struct CreateBotRequest<'a> {
    meeting_url: &'a str,
    bot_name: &'a str,
    /// Where the platform streams the meeting's audio: the proxy's public
    /// WebSocket endpoint.
    websocket_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateBotResponse {
    id: String,
}

/// Client for creating and removing the remote meeting bot.
pub struct MeetingBotClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    bot_id: Option<String>,
}

impl MeetingBotClient {
    pub fn new(config: &MeetingConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            bot_id: None,
        }
    }

    /// Ask the platform to join a bot into the meeting and stream its audio
    /// to `websocket_url`. Returns `Ok(false)` when the platform rejects the
    /// request; transport failures surface as errors.
    pub async fn connect(
        &mut self,
        meeting_url: &str,
        bot_name: &str,
        websocket_url: &str,
    ) -> AppResult<bool> {
        let body = CreateBotRequest {
            meeting_url,
            bot_name,
            websocket_url,
        };

        let response = self
            .http
            .post(format!("{}/api/v1/bot/", self.api_url))
            .header("Authorization", format!("Token {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            warn!(
                status = %response.status(),
                "bot platform rejected the join request"
            );
            return Ok(false);
        }

        let created: CreateBotResponse = response.json().await?;
        info!(bot_id = %created.id, "meeting bot created");
        self.bot_id = Some(created.id);
        Ok(true)
    }

    /// Best-effort removal of the bot. Runs during shutdown, so failures are
    /// logged and swallowed; they must never block process exit.
    pub async fn disconnect(&mut self) {
        let Some(bot_id) = self.bot_id.take() else {
            return;
        };

        let result = self
            .http
            .post(format!("{}/api/v1/bot/{}/leave_call/", self.api_url, bot_id))
            .header("Authorization", format!("Token {}", self.api_key))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!(bot_id = %bot_id, "meeting bot removed");
            }
            Ok(response) => {
                warn!(bot_id = %bot_id, status = %response.status(), "bot removal rejected");
            }
            Err(e) => {
                warn!(bot_id = %bot_id, "bot removal failed: {}", e);
            }
        }
    }
}
