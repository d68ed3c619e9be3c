//! Mobile push notifications.
//!
//! Device tokens are Expo push tokens registered per (user, token). Delivery
//! goes through a [`PushSender`]; the Expo implementation posts to the Expo
//! push API in chunks, the logging implementation only records what would
//! have been sent.

use std::sync::Arc;

use async_trait::async_trait;
use chorus_common::{AppError, AppResult, IdGenerator, config::PushConfig};
use chorus_db::{
    entities::{notification_setting, push_token},
    repositories::{NotificationSettingRepository, NotificationSettingUpdate, PushTokenRepository},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use super::fanout::FanoutService;
use super::guard::{gates, require};
use super::identity::Caller;

const EXPO_PUSH_URL: &str = "https://exp.host/--/api/v2/push/send";

/// Messages per request accepted by the Expo push API.
const EXPO_CHUNK_SIZE: usize = 100;

/// Whether a token looks like an Expo push token.
#[must_use]
pub fn is_expo_push_token(token: &str) -> bool {
    ["ExponentPushToken[", "ExpoPushToken["]
        .iter()
        .find_map(|prefix| token.strip_prefix(prefix))
        .and_then(|rest| rest.strip_suffix(']'))
        .is_some_and(|inner| !inner.is_empty() && !inner.contains(['[', ']']))
}

/// One message for one device.
#[derive(Debug, Clone, Serialize)]
pub struct PushMessage {
    pub to: String,
    pub title: String,
    pub body: String,
    pub sound: &'static str,
    pub data: Value,
}

/// Delivers push messages to devices.
#[async_trait]
pub trait PushSender: Send + Sync {
    /// Send messages, returning how many were accepted.
    async fn send(&self, messages: Vec<PushMessage>) -> AppResult<usize>;
}

/// Shared push sender handle.
pub type PushSenderService = Arc<dyn PushSender>;

/// Sender that logs messages instead of delivering them.
pub struct LoggingPushSender;

#[async_trait]
impl PushSender for LoggingPushSender {
    async fn send(&self, messages: Vec<PushMessage>) -> AppResult<usize> {
        for message in &messages {
            tracing::info!(to = %message.to, title = %message.title, "Push delivery disabled, message logged");
        }
        Ok(messages.len())
    }
}

#[derive(Debug, Deserialize)]
struct ExpoResponse {
    #[serde(default)]
    data: Vec<ExpoTicket>,
}

#[derive(Debug, Deserialize)]
struct ExpoTicket {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

/// Sender backed by the Expo push API.
pub struct ExpoPushSender {
    http_client: reqwest::Client,
    access_token: Option<String>,
}

impl ExpoPushSender {
    #[must_use]
    pub fn new(access_token: Option<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            access_token,
        }
    }
}

#[async_trait]
impl PushSender for ExpoPushSender {
    async fn send(&self, messages: Vec<PushMessage>) -> AppResult<usize> {
        let mut accepted = 0;

        for chunk in messages.chunks(EXPO_CHUNK_SIZE) {
            let mut request = self.http_client.post(EXPO_PUSH_URL).json(chunk);
            if let Some(ref token) = self.access_token {
                request = request.bearer_auth(token);
            }

            // A failed chunk does not stop the rest
            let response = match request.send().await.and_then(reqwest::Response::error_for_status) {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(error = %e, size = chunk.len(), "Expo push request failed");
                    continue;
                }
            };

            match response.json::<ExpoResponse>().await {
                Ok(body) => {
                    for ticket in &body.data {
                        if ticket.status == "ok" {
                            accepted += 1;
                        } else {
                            tracing::warn!(message = ?ticket.message, "Expo rejected a push message");
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Unreadable Expo push response"),
            }
        }

        Ok(accepted)
    }
}

/// Build the sender selected by configuration.
#[must_use]
pub fn sender_from_config(config: &PushConfig) -> PushSenderService {
    if config.expo_enabled {
        Arc::new(ExpoPushSender::new(config.expo_access_token.clone()))
    } else {
        Arc::new(LoggingPushSender)
    }
}

/// Input for registering a device.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPushTokenInput {
    #[validate(length(min = 1, max = 255))]
    pub token: String,
    #[validate(length(min = 1, max = 16))]
    pub platform: String,
}

/// Input for an operator push.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendPushInput {
    #[validate(length(min = 1, max = 1000))]
    pub user_ids: Vec<String>,
    #[validate(length(min = 1, max = 100))]
    pub title: String,
    #[validate(length(min = 1, max = 1000))]
    pub body: String,
    pub data: Option<Value>,
}

/// Outcome of a push send.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSendResult {
    /// Devices messages were addressed to.
    pub devices: usize,
    /// Messages the sender accepted.
    pub delivered: usize,
    /// Recipients notified in-app.
    pub notified: usize,
}

/// Push notification service.
#[derive(Clone)]
pub struct PushNotificationService {
    token_repo: PushTokenRepository,
    setting_repo: NotificationSettingRepository,
    sender: PushSenderService,
    fanout: FanoutService,
    id_gen: IdGenerator,
}

impl PushNotificationService {
    /// Create a new push notification service.
    #[must_use]
    pub fn new(
        token_repo: PushTokenRepository,
        setting_repo: NotificationSettingRepository,
        sender: PushSenderService,
        fanout: FanoutService,
    ) -> Self {
        Self {
            token_repo,
            setting_repo,
            sender,
            fanout,
            id_gen: IdGenerator::new(),
        }
    }

    /// Register a device token for the caller, reactivating a known one.
    pub async fn register_token(
        &self,
        caller: &Caller,
        input: RegisterPushTokenInput,
    ) -> AppResult<push_token::Model> {
        let me = require(gates::REGISTER_PUSH_TOKEN, caller)?;
        input.validate()?;

        if !is_expo_push_token(&input.token) {
            return Err(AppError::Validation("Invalid push token".to_string()));
        }

        self.token_repo
            .upsert(
                self.id_gen.generate(),
                me.id(),
                &input.token,
                &input.platform.to_lowercase(),
                Utc::now().into(),
            )
            .await
    }

    /// The caller's notification settings, created with defaults on first read.
    pub async fn settings(&self, caller: &Caller) -> AppResult<notification_setting::Model> {
        let me = require(gates::PUSH_SETTINGS, caller)?;
        self.setting_repo
            .get_or_create(me.id(), Utc::now().into())
            .await
    }

    pub async fn update_settings(
        &self,
        caller: &Caller,
        update: NotificationSettingUpdate,
    ) -> AppResult<notification_setting::Model> {
        let me = require(gates::PUSH_SETTINGS, caller)?;
        self.setting_repo
            .upsert(me.id(), &update, Utc::now().into())
            .await
    }

    /// Operator push: an in-app message to every recipient, plus a device
    /// push to those who allow operator pushes.
    pub async fn send(&self, caller: &Caller, input: SendPushInput) -> AppResult<PushSendResult> {
        let me = require(gates::SEND_PUSH, caller)?;
        input.validate()?;

        let mut user_ids = input.user_ids;
        user_ids.sort();
        user_ids.dedup();

        let tokens = self.token_repo.find_active_by_users(&user_ids).await?;
        if tokens.is_empty() {
            return Err(AppError::BadRequest("No active push tokens found".to_string()));
        }

        let mut messages = Vec::with_capacity(tokens.len());
        for token in tokens {
            if !self.accepts_operator_push(&token.user_id).await? {
                continue;
            }
            messages.push(PushMessage {
                to: token.token,
                title: input.title.clone(),
                body: input.body.clone(),
                sound: "default",
                data: input.data.clone().unwrap_or_else(|| Value::Object(Default::default())),
            });
        }

        let devices = messages.len();
        let delivered = self.deliver(messages).await;

        let report = self
            .fanout
            .admin_message(me.user(), &user_ids, &input.title, &input.body, input.data.as_ref())
            .await;

        tracing::info!(sender = %me.id(), devices, delivered, "Operator push sent");

        Ok(PushSendResult {
            devices,
            delivered,
            notified: report.notifications,
        })
    }

    /// Push a test message to the caller's own devices.
    pub async fn test(&self, caller: &Caller) -> AppResult<PushSendResult> {
        let me = require(gates::TEST_PUSH, caller)?;

        let tokens = self
            .token_repo
            .find_active_by_users(&[me.id().to_string()])
            .await?;
        if tokens.is_empty() {
            return Err(AppError::BadRequest("No active push tokens found".to_string()));
        }

        let messages: Vec<PushMessage> = tokens
            .into_iter()
            .map(|token| PushMessage {
                to: token.token,
                title: "Test Notification".to_string(),
                body: "This is a test push notification!".to_string(),
                sound: "default",
                data: serde_json::json!({ "test": true }),
            })
            .collect();

        let devices = messages.len();
        let delivered = self.deliver(messages).await;
        let success = delivered > 0;

        self.fanout.push_status(
            me.id(),
            success,
            &format!("Test notification sent to {delivered} of {devices} devices"),
        );

        Ok(PushSendResult {
            devices,
            delivered,
            notified: 0,
        })
    }

    async fn accepts_operator_push(&self, user_id: &str) -> AppResult<bool> {
        Ok(self
            .setting_repo
            .find(user_id)
            .await?
            .is_none_or(|s| s.push_enabled && s.admin_message))
    }

    async fn deliver(&self, messages: Vec<PushMessage>) -> usize {
        if messages.is_empty() {
            return 0;
        }
        match self.sender.send(messages).await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(error = %e, "Push delivery failed");
                0
            }
        }
    }
}
