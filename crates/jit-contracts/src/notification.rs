//! Notification types dispatched by the notification engine (C5, §4.5).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationType {
    RequestActivation,
    ActivationApproved,
    ActivationSelfApproved,
}

/// A rendered-but-not-yet-dispatched notification. `properties` feeds the
/// `{{KEY}}` placeholder substitution in the configured HTML template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub recipients: Vec<String>,
    pub cc_recipients: Vec<String>,
    pub subject: String,
    pub notification_type: NotificationType,
    pub properties: BTreeMap<String, String>,
}
