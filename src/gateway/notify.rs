//! Push notifications and notification clicks.

use chrono::Utc;
use serde::{Deserialize, Serialize};

const TITLE: &str = "Hotel PMS";
const DEFAULT_BODY: &str = "New notification from Hotel PMS";
/// Opened when the "explore" action is chosen
const EXPLORE_URL: &str = "/dashboard";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub data: NotificationData,
  pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
  /// Milliseconds since the Unix epoch
  pub date_of_arrival: i64,
  pub primary_key: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
  pub icon: String,
}

impl Notification {
  /// Build the notification shown for a push message.
  pub fn from_push(payload: Option<&str>) -> Self {
    let body = payload
      .map(str::trim)
      .filter(|p| !p.is_empty())
      .unwrap_or(DEFAULT_BODY);

    Self {
      title: TITLE.to_string(),
      body: body.to_string(),
      icon: "/icons/icon-192x192.png".to_string(),
      badge: "/icons/icon-72x72.png".to_string(),
      vibrate: vec![100, 50, 100],
      data: NotificationData {
        date_of_arrival: Utc::now().timestamp_millis(),
        primary_key: 1,
      },
      actions: vec![
        NotificationAction {
          action: "explore".to_string(),
          title: "View Details".to_string(),
          icon: "/icons/checkmark.png".to_string(),
        },
        NotificationAction {
          action: "close".to_string(),
          title: "Close".to_string(),
          icon: "/icons/xmark.png".to_string(),
        },
      ],
    }
  }
}

/// A click on a shown notification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationClick {
  /// Chosen action button; absent when the body was clicked
  #[serde(default)]
  pub action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickOutcome {
  /// The notification is always dismissed
  pub close: bool,
  pub open_url: Option<String>,
}

impl NotificationClick {
  pub fn outcome(&self) -> ClickOutcome {
    let open_url = match self.action.as_deref() {
      Some("explore") => Some(EXPLORE_URL.to_string()),
      _ => None,
    };

    ClickOutcome {
      close: true,
      open_url,
    }
  }
}
