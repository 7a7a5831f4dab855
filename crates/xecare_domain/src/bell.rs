use std::time::{Duration, Instant};

use serde::Serialize;

pub const DEFAULT_RING_HOLD: Duration = Duration::from_millis(2000);
pub const BADGE_LIMIT: u32 = 99;
pub const NOTIFICATIONS_ROUTE: &str = "/notifications";

/// What a front end needs to draw the bell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BellView {
    pub badge: Option<String>,
    pub ringing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BellAction {
    Navigate(&'static str),
}

/// Formats the unread badge: nothing at zero, the literal count up to 99,
/// `99+` above that.
pub fn badge_label(count: u32) -> Option<String> {
    match count {
        0 => None,
        n if n > BADGE_LIMIT => Some(format!("{BADGE_LIMIT}+")),
        n => Some(n.to_string()),
    }
}

/// Ring trigger logic for the notification bell.
///
/// Time is passed in by the caller so the driver can use whatever clock its
/// runtime provides.
#[derive(Debug, Clone)]
pub struct BellIndicator {
    hold: Duration,
    last_count: Option<u32>,
    ringing_until: Option<Instant>,
}

impl Default for BellIndicator {
    fn default() -> Self {
        Self::new(DEFAULT_RING_HOLD)
    }
}

impl BellIndicator {
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            last_count: None,
            ringing_until: None,
        }
    }

    pub fn hold(&self) -> Duration {
        self.hold
    }

    /// Feeds the latest unread count. Returns `true` when the count rose
    /// above the previously observed value and a ring cycle started. The
    /// first observation only sets the baseline.
    pub fn observe(&mut self, count: u32, now: Instant) -> bool {
        let previous = self.last_count.replace(count);
        match previous {
            Some(previous) if count > previous => {
                self.ring(now);
                true
            }
            _ => false,
        }
    }

    /// A "new notification" signal rings regardless of the count.
    pub fn ring(&mut self, now: Instant) {
        self.ringing_until = Some(now + self.hold);
    }

    pub fn is_ringing(&self, now: Instant) -> bool {
        self.ringing_until.is_some_and(|until| now < until)
    }

    pub fn ringing_until(&self) -> Option<Instant> {
        self.ringing_until
    }

    /// Drops an expired ring deadline; returns `true` if the bell just went quiet.
    pub fn settle(&mut self, now: Instant) -> bool {
        match self.ringing_until {
            Some(until) if now >= until => {
                self.ringing_until = None;
                true
            }
            _ => false,
        }
    }

    pub fn view(&self, now: Instant) -> BellView {
        BellView {
            badge: badge_label(self.last_count.unwrap_or(0)),
            ringing: self.is_ringing(now),
        }
    }

    pub fn click(&self) -> BellAction {
        BellAction::Navigate(NOTIFICATIONS_ROUTE)
    }
}
