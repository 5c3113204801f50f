//! `Activation` — the observable outcome of a successful `activate`/`approve`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::request::ActivationRequest;

/// The result of provisioning succeeding. `end_time == start_time + duration`
/// of the underlying request (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activation {
    pub request: ActivationRequest,
    pub end_time: DateTime<Utc>,
}
