/// Decides whether the user walked away, for platforms that only report time since last input.
pub struct AfkEvaluator {
    threshold_ms: u32,
}

impl AfkEvaluator {
    pub fn from_seconds(threshold_s: u32) -> Self {
        Self {
            threshold_ms: threshold_s.saturating_mul(1000),
        }
    }

    pub fn is_afk(&self, idle_time: u32) -> bool {
        self.threshold_ms < idle_time
    }
}
