use chrono::{DateTime, Utc};

/// Unread state shown to the user: the badge, the toast, and the baseline
/// that decides whether a new count is worth a toast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnreadSnapshot {
    /// Badge value
    pub count: u64,
    /// Highest count seen since the last reset
    pub previous_count: u64,
    pub toast_active: bool,
    /// Bumped on every reset
    pub reset_generation: u64,
    pub last_polled_at: Option<DateTime<Utc>>,
}

impl UnreadSnapshot {
    /// Record a poll result. Returns `true` if it should raise a toast.
    ///
    /// Only a count above everything seen since the last reset toasts;
    /// repeats and decreases just move the badge.
    pub fn observe(&mut self, count: u64, at: DateTime<Utc>) -> bool {
        let toast = count > self.previous_count && count > 0;
        self.count = count;
        self.previous_count = self.previous_count.max(count);
        self.last_polled_at = Some(at);
        if toast {
            self.toast_active = true;
        }
        toast
    }

    /// The user opened the message view: zero the badge and the baseline.
    pub fn reset(&mut self) {
        self.count = 0;
        self.previous_count = 0;
        self.toast_active = false;
        self.reset_generation += 1;
    }

    /// Returns `false` if no toast was showing.
    pub fn dismiss_toast(&mut self) -> bool {
        std::mem::replace(&mut self.toast_active, false)
    }

    pub fn badge_label(&self) -> Option<String> {
        match self.count {
            0 => None,
            1..=99 => Some(self.count.to_string()),
            _ => Some("99+".to_string()),
        }
    }
}
