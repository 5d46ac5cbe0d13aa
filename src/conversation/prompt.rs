//! Prompt rendering helpers.
//!
//! Templates use `{name}` placeholders filled by plain text substitution.
//! Unknown placeholders are left untouched.

use chrono::{DateTime, Local};
use std::time::Instant;

/// Rendered in place of a time that never happened.
pub const NEVER: &str = "никогда";

/// Substitutes every `{key}` in `template` with its value.
///
/// Single pass: substituted values are never scanned for placeholders, so
/// chat text cannot pull other prompt sections in.
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let key = &after[..close];
            values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, close))
        });

        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// `HH:MM:SS`, or [`NEVER`] for `None`.
pub fn format_time(time: Option<&DateTime<Local>>) -> String {
    match time {
        Some(time) => time.format("%H:%M:%S").to_string(),
        None => NEVER.to_string(),
    }
}

/// `HH:MM:SS - user: text`.
pub fn format_message(time: &DateTime<Local>, username: &str, text: &str) -> String {
    format!("{} - {}: {}", format_time(Some(time)), username, text)
}

/// Tells the model how long ago it last wrote to the chat.
pub fn last_reply_text(last_reply: Option<Instant>, now: Instant) -> String {
    match last_reply {
        None => "Ты еще не писал сообщений в чат".to_string(),
        Some(at) => format!(
            "Ты отвечал {} секунд назад",
            now.saturating_duration_since(at).as_secs()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    #[test]
    fn test_render_template_replaces_all_occurrences() {
        let rendered = render_template(
            "{channel}: {username} в {channel}, {unknown}",
            &[("channel", "durka"), ("username", "bot")],
        );
        assert_eq!(rendered, "durka: bot в durka, {unknown}");
    }

    #[test]
    fn test_render_template_does_not_expand_values() {
        let rendered = render_template("{a} {b}", &[("a", "{b}"), ("b", "x")]);
        assert_eq!(rendered, "{b} x");
    }

    #[test]
    fn test_render_template_keeps_stray_braces() {
        let rendered = render_template("{\"json\": {a}} {", &[("a", "1")]);
        assert_eq!(rendered, "{\"json\": 1} {");
    }

    #[test]
    fn test_format_time() {
        let time = Local.with_ymd_and_hms(2026, 1, 2, 7, 8, 9).unwrap();
        assert_eq!(format_time(Some(&time)), "07:08:09");
        assert_eq!(format_time(None), "никогда");
    }

    #[test]
    fn test_format_message() {
        let time = Local.with_ymd_and_hms(2026, 1, 2, 18, 30, 0).unwrap();
        assert_eq!(
            format_message(&time, "alice", "привет"),
            "18:30:00 - alice: привет"
        );
    }

    #[test]
    fn test_last_reply_text() {
        let now = Instant::now();
        assert_eq!(last_reply_text(None, now), "Ты еще не писал сообщений в чат");
        assert_eq!(
            last_reply_text(Some(now), now + Duration::from_millis(12_900)),
            "Ты отвечал 12 секунд назад"
        );
    }
}
