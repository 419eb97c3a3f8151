use std::sync::Arc;

use chrono::{DateTime, Local, Utc};

pub use mockable::{Clock, DefaultClock};

/// Source of "now" for audit timestamps, shared by both managers.
pub type SharedClock = Arc<dyn Clock + Send + Sync>;

/// Always reports the same instant. Used by tests and the demo walkthrough.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn local(&self) -> DateTime<Local> {
        self.0.with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        self.0
    }
}
