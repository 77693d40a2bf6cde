use chrono::{DateTime, Duration, Local, Utc};

/// This is the standard way of printing a moment in activitymon.
pub fn format_moment(moment: DateTime<Utc>) -> String {
    moment
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Formats a duration as `1h2m3s`, dropping leading zero units.
pub fn format_duration(v: Duration) -> String {
    if v.num_hours() > 0 {
        format!(
            "{}h{}m{}s",
            v.num_hours(),
            v.num_minutes() % 60,
            v.num_seconds() % 60
        )
    } else if v.num_minutes() > 0 {
        format!("{}m{}s", v.num_minutes() % 60, v.num_seconds() % 60)
    } else {
        format!("{}s", v.num_seconds() % 60)
    }
}

/// Shortens `value` to at most `max_chars` characters, marking the cut with `...`.
pub fn truncate_name(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let kept = max_chars.saturating_sub(3);
    let mut truncated = value.chars().take(kept).collect::<String>();
    truncated.push_str("...");
    truncated
}

/// Serializes a [Duration] as whole seconds.
pub mod duration_ser {
    use chrono::Duration;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(duration.num_seconds())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = i64::deserialize(deserializer)?;
        Ok(Duration::seconds(s))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::{format_duration, truncate_name};

    #[test]
    fn durations_drop_empty_units() {
        assert_eq!(format_duration(Duration::seconds(42)), "42s");
        assert_eq!(format_duration(Duration::seconds(61)), "1m1s");
        assert_eq!(format_duration(Duration::seconds(3600 * 2 + 5)), "2h0m5s");
    }

    #[test]
    fn long_names_are_cut() {
        assert_eq!(truncate_name("github.com", 30), "github.com");
        assert_eq!(truncate_name("abcdefghij", 8), "abcde...");
    }
}
