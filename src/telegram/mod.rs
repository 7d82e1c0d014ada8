pub mod dto;

use std::env;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;

use crate::datefmt;
use crate::error::AppError;
use crate::models::{TaskRecord, User};
use crate::models::task::parse_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKind {
    WeekBefore,
    DayBefore,
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Deep link to the mini app, e.g. `https://t.me/bot/app`. The "open"
    /// button is omitted when unset.
    pub app_link: Option<String>,
}

impl TelegramConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        let bot_token = env::var("BOT_TOKEN")
            .map_err(|_| AppError::BadRequest("BOT_TOKEN is not set".to_string()))?;
        let app_link = env::var("APP_LINK").ok();
        Ok(Self {
            bot_token,
            app_link,
        })
    }
}

/// Outbound reminder delivery. Trait-shaped so the scheduler and tests can
/// run without a bot token.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_reminder(
        &self,
        user: &User,
        task: &TaskRecord,
        kind: ReminderKind,
    ) -> Result<(), AppError>;
}

pub struct TelegramHttpNotifier {
    client: Client,
    config: TelegramConfig,
}

impl TelegramHttpNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Notify(format!("Failed to build http client: {e}")))?;
        Ok(Self { client, config })
    }

    fn keyboard(&self, task: &TaskRecord, language: &str) -> dto::ReplyMarkup {
        let (ready, not_going, open) = match language {
            "en" => ("✅ Ready", "❌ Not going", "🔗 Open"),
            _ => ("✅ Готовий", "❌ Не йду", "🔗 Відкрити"),
        };

        let mut row = vec![
            dto::InlineKeyboardButton::callback(ready, format!("ready_{}", task.id)),
            dto::InlineKeyboardButton::callback(not_going, format!("notgoing_{}", task.id)),
        ];
        if let Some(link) = &self.config.app_link {
            row.push(dto::InlineKeyboardButton::link(
                open,
                format!("{link}?startapp=task_{}", task.id),
            ));
        }
        dto::ReplyMarkup {
            inline_keyboard: vec![row],
        }
    }
}

#[async_trait]
impl Notifier for TelegramHttpNotifier {
    async fn send_reminder(
        &self,
        user: &User,
        task: &TaskRecord,
        kind: ReminderKind,
    ) -> Result<(), AppError> {
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.config.bot_token
        );

        let request_body = dto::SendMessageRequest {
            chat_id: user.telegram_id,
            text: reminder_text(task, kind, &user.language),
            parse_mode: "HTML".to_string(),
            reply_markup: Some(self.keyboard(task, &user.language)),
        };

        let response = self
            .client
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| AppError::Notify(format!("sendMessage request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Notify(format!(
                "Telegram API error {status}: {body}"
            )));
        }

        let parsed: dto::SendMessageResponse = response
            .json()
            .await
            .map_err(|e| AppError::Notify(format!("Failed to parse Telegram response: {e}")))?;
        if !parsed.ok {
            return Err(AppError::Notify(
                parsed
                    .description
                    .unwrap_or_else(|| "sendMessage rejected".to_string()),
            ));
        }

        Ok(())
    }
}

/// Reminder body, localized to the recipient's language.
pub fn reminder_text(task: &TaskRecord, kind: ReminderKind, language: &str) -> String {
    let (emoji, title) = match (language, kind) {
        ("en", ReminderKind::WeekBefore) => ("📅", "Reminder: event in a week!"),
        ("en", ReminderKind::DayBefore) => ("⏰", "Reminder: event tomorrow!"),
        (_, ReminderKind::WeekBefore) => ("📅", "Нагадування: через тиждень подія!"),
        (_, ReminderKind::DayBefore) => ("⏰", "Нагадування: завтра подія!"),
    };
    let created_by = match language {
        "en" => "Created by",
        _ => "Створив",
    };

    let mut text = format!("{emoji} <b>{title}</b>\n\n📝 <b>{}</b>\n", task.title);
    if let Some(event) = parse_timestamp(&task.event_date) {
        text.push_str(&format!(
            "🗓 {}\n",
            datefmt::deadline_label(event, Utc::now(), language)
        ));
    }
    text.push_str(&format!("👤 {created_by}: @{}", task.created_by_username));
    text
}

pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send_reminder(
        &self,
        _user: &User,
        _task: &TaskRecord,
        _kind: ReminderKind,
    ) -> Result<(), AppError> {
        Ok(())
    }
}
