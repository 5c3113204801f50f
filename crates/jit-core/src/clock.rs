//! The production `Clock` (§2a Supplemented Features, §6 `Clock`). Every
//! other implementation in this workspace exists only for deterministic
//! tests — this is the one the engine actually runs with.

use chrono::{DateTime, Utc};

use crate::traits::Clock;

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
