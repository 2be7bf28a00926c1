//! Reaction to a new interaction on a prayer request.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::providers::{EmailSender, NotificationStore, ProfileStore, PushSender};
use crate::types::{EmailMessage, Interaction, NotificationRecord, PrayerRequest, PushMessage};
use crate::NotifyError;

/// What happened on one side channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ChannelOutcome {
    /// Disabled on the profile, or nothing to send to.
    Skipped,
    Sent { delivered: usize },
    Failed { reason: String },
}

/// Summary of one trigger run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutReport {
    /// Set when the actor owns the prayer and nothing was done.
    pub self_interaction: bool,
    pub notification_id: Option<String>,
    pub push: ChannelOutcome,
    pub email: ChannelOutcome,
}

impl FanoutReport {
    fn skipped() -> Self {
        Self {
            self_interaction: true,
            notification_id: None,
            push: ChannelOutcome::Skipped,
            email: ChannelOutcome::Skipped,
        }
    }
}

pub struct InteractionNotifier {
    notifications: Arc<dyn NotificationStore>,
    profiles: Arc<dyn ProfileStore>,
    push: Arc<dyn PushSender>,
    email: Arc<dyn EmailSender>,
}

impl InteractionNotifier {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        profiles: Arc<dyn ProfileStore>,
        push: Arc<dyn PushSender>,
        email: Arc<dyn EmailSender>,
    ) -> Self {
        Self {
            notifications,
            profiles,
            push,
            email,
        }
    }

    /// Write the owner's notification, then fan out to push and email.
    ///
    /// Only the notification write can fail the call. Side channel errors
    /// are logged and reported.
    pub async fn on_interaction_created(
        &self,
        prayer: &PrayerRequest,
        interaction: &Interaction,
    ) -> Result<FanoutReport, NotifyError> {
        if interaction.actor_uid == prayer.owner_uid {
            debug!(prayer = %prayer.id, "Skipping self-interaction");
            return Ok(FanoutReport::skipped());
        }

        let title = interaction.headline();
        let body = interaction
            .message
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| prayer.title.clone());

        let record = NotificationRecord {
            recipient_uid: prayer.owner_uid.clone(),
            actor_uid: interaction.actor_uid.clone(),
            prayer_id: prayer.id.clone(),
            interaction_id: interaction.id.clone(),
            kind: interaction.kind.clone(),
            title: title.clone(),
            body: body.clone(),
            read: false,
            created_at: Utc::now().timestamp_millis(),
        };
        let notification_id = self.notifications.create(record).await?;
        info!(prayer = %prayer.id, owner = %prayer.owner_uid, %notification_id, "Created notification");

        let profile = match self.profiles.profile(&prayer.owner_uid).await {
            Ok(profile) => profile.unwrap_or_default(),
            Err(err) => {
                warn!(owner = %prayer.owner_uid, error = %err, "Failed to load profile, skipping fan-out");
                let reason = err.to_string();
                return Ok(FanoutReport {
                    self_interaction: false,
                    notification_id: Some(notification_id),
                    push: ChannelOutcome::Failed { reason: reason.clone() },
                    email: ChannelOutcome::Failed { reason },
                });
            }
        };

        let push = if profile.wants_push() {
            let message = PushMessage {
                title: title.clone(),
                body: body.clone(),
                prayer_id: prayer.id.clone(),
            };
            match self.push.send_multicast(&profile.push_tokens, &message).await {
                Ok(receipt) => {
                    if receipt.failure_count > 0 {
                        warn!(failed = receipt.failure_count, "Some push tokens were rejected");
                    }
                    ChannelOutcome::Sent {
                        delivered: receipt.success_count,
                    }
                }
                Err(err) => {
                    warn!(owner = %prayer.owner_uid, error = %err, "Push fan-out failed");
                    ChannelOutcome::Failed {
                        reason: err.to_string(),
                    }
                }
            }
        } else {
            ChannelOutcome::Skipped
        };

        let email = match profile.email_address() {
            Some(to) => {
                let message = EmailMessage {
                    to: to.to_string(),
                    subject: title,
                    body,
                };
                match self.email.send(&message).await {
                    Ok(()) => ChannelOutcome::Sent { delivered: 1 },
                    Err(err) => {
                        warn!(owner = %prayer.owner_uid, error = %err, "Email fan-out failed");
                        ChannelOutcome::Failed {
                            reason: err.to_string(),
                        }
                    }
                }
            }
            None => ChannelOutcome::Skipped,
        };

        Ok(FanoutReport {
            self_interaction: false,
            notification_id: Some(notification_id),
            push,
            email,
        })
    }
}
