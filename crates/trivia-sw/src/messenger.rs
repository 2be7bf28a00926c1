//! Messages between the worker and window clients.
//!
//! Two independent protocols live here: a liveness ping answered with a
//! fixed acknowledgement, and routing of prayer-reminder notification clicks
//! to an open window.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tracing::{debug, info};
use url::Url;

use crate::clients::{ClientId, ClientMatchOptions, Clients};
use crate::ServiceWorkerError;

/// Notification kind this worker routes.
pub const PRAYER_REMINDER: &str = "prayer-reminder";

// ==================== Wire messages ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Received,
}

/// Action buttons on a prayer reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderAction {
    Pray,
    Snooze,
}

/// Worker → window message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerMessage {
    /// `{ "status": "received" }`
    Ack { status: AckStatus },
    Notification(NotificationMessage),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NotificationMessage {
    #[serde(rename = "notification-action", rename_all = "camelCase")]
    Action {
        action: ReminderAction,
        reminder_id: String,
        #[serde(default)]
        prayer_list_id: Option<String>,
    },
    #[serde(rename = "notification-click", rename_all = "camelCase")]
    Click {
        reminder_id: String,
        #[serde(default)]
        prayer_list_id: Option<String>,
    },
}

impl WorkerMessage {
    pub fn ack() -> Self {
        WorkerMessage::Ack {
            status: AckStatus::Received,
        }
    }

    fn action(action: ReminderAction, payload: &NotificationPayload) -> Self {
        WorkerMessage::Notification(NotificationMessage::Action {
            action,
            reminder_id: payload.reminder_id.clone(),
            prayer_list_id: payload.prayer_list_id.clone(),
        })
    }

    fn click(payload: &NotificationPayload) -> Self {
        WorkerMessage::Notification(NotificationMessage::Click {
            reminder_id: payload.reminder_id.clone(),
            prayer_list_id: payload.prayer_list_id.clone(),
        })
    }
}

// ==================== Events ====================

/// A `message` event posted to the worker.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub data: JsonValue,
    /// Reply port, if the sender transferred one.
    pub port: Option<mpsc::UnboundedSender<WorkerMessage>>,
}

/// Data attached to a push notification by the messaging provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub reminder_id: String,
    #[serde(default)]
    pub prayer_list_id: Option<String>,
}

/// A displayed notification.
#[derive(Debug, Clone)]
pub struct Notification {
    pub title: String,
    pub data: NotificationPayload,
    closed: bool,
}

impl Notification {
    pub fn new(title: impl Into<String>, data: NotificationPayload) -> Self {
        Self {
            title: title.into(),
            data,
            closed: false,
        }
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// A `notificationclick` event.
#[derive(Debug, Clone)]
pub struct NotificationClickEvent {
    pub notification: Notification,
    /// Action button id, `None` for a click on the body.
    pub action: Option<String>,
}

/// How a click was routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickRoute {
    Focused(ClientId),
    Opened(ClientId),
    Broadcast { delivered: usize },
    /// Not a prayer reminder.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct ClickOutcome {
    /// The notification, already closed.
    pub notification: Notification,
    pub route: ClickRoute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Replied { delivered: bool },
    Broadcast { delivered: usize },
}

// ==================== Messenger ====================

/// Routes messages and notification clicks for one origin.
#[derive(Debug, Clone)]
pub struct Messenger {
    origin: Url,
}

impl Messenger {
    pub fn new(origin: Url) -> Self {
        Self { origin }
    }

    /// Answer a ping on its port, or broadcast the ack when there is none.
    pub fn handle_message(&self, event: MessageEvent, clients: &Clients) -> MessageOutcome {
        debug!(data = %event.data, "Worker message");
        let ack = WorkerMessage::ack();

        match event.port {
            Some(port) => MessageOutcome::Replied {
                delivered: port.send(ack).is_ok(),
            },
            None => MessageOutcome::Broadcast {
                delivered: broadcast(clients, &ack),
            },
        }
    }

    pub fn handle_notification_click(
        &self,
        event: NotificationClickEvent,
        clients: &mut Clients,
    ) -> Result<ClickOutcome, ServiceWorkerError> {
        let NotificationClickEvent {
            mut notification,
            action,
        } = event;
        notification.close();

        if notification.data.kind != PRAYER_REMINDER {
            debug!(kind = %notification.data.kind, "Ignoring notification click");
            return Ok(ClickOutcome {
                notification,
                route: ClickRoute::Ignored,
            });
        }

        let payload = &notification.data;
        info!(reminder = %payload.reminder_id, action = ?action, "Prayer reminder clicked");

        let route = match action.as_deref() {
            Some("pray") => {
                self.focus_or_open(clients, &WorkerMessage::action(ReminderAction::Pray, payload))?
            }
            Some("snooze") => ClickRoute::Broadcast {
                delivered: broadcast(
                    clients,
                    &WorkerMessage::action(ReminderAction::Snooze, payload),
                ),
            },
            _ => self.focus_or_open(clients, &WorkerMessage::click(payload))?,
        };

        Ok(ClickOutcome {
            notification,
            route,
        })
    }

    /// Focus the first same-origin window and post to it, or open the root.
    fn focus_or_open(
        &self,
        clients: &mut Clients,
        message: &WorkerMessage,
    ) -> Result<ClickRoute, ServiceWorkerError> {
        let target = clients
            .match_all(ClientMatchOptions::all_windows())
            .into_iter()
            .find(|c| c.url.origin() == self.origin.origin())
            .map(|c| c.id);

        match target {
            Some(id) => {
                let client = clients.focus(id)?;
                client.post_message(message);
                Ok(ClickRoute::Focused(id))
            }
            None => {
                let root = self
                    .origin
                    .join("/")
                    .map_err(|e| ServiceWorkerError::InvalidUrl(e.to_string()))?;
                debug!(url = %root, "No open window, opening one");
                Ok(ClickRoute::Opened(clients.open_window(root)))
            }
        }
    }
}

/// Post to every window, controlled or not. Returns how many were reached.
fn broadcast(clients: &Clients, message: &WorkerMessage) -> usize {
    clients
        .match_all(ClientMatchOptions::all_windows())
        .into_iter()
        .filter(|c| c.post_message(message))
        .count()
}
