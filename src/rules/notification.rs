use std::collections::BTreeMap;

/// Clip prefixes; the notification key is appended.
pub const NOTIFICATION_SOUND: &str = "triggered_notification_sound";
pub const VICTORY_SOUND: &str = "triggered_victory_sound";
pub const DEFEAT_SOUND: &str = "triggered_defeat_sound";

/// Player-facing message texts by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationCatalog {
    messages: BTreeMap<String, String>,
}

impl NotificationCatalog {
    pub fn new(messages: BTreeMap<String, String>) -> Self {
        Self { messages }
    }

    pub fn message(&self, key: &str) -> Option<&str> {
        self.messages.get(key.trim()).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.messages.contains_key(key.trim())
    }
}

/// `"A"`, `"A and B"`, `"A, B and C"`.
pub fn name_list(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

/// Markup-free text of at most `limit` characters for history records.
pub fn shorten_for_history(message: &str, limit: usize) -> String {
    let trimmed = message.trim();
    if trimmed.chars().count() <= limit {
        return trimmed.to_string();
    }
    let mut plain = String::with_capacity(trimmed.len());
    let mut in_tag = false;
    for c in trimmed.chars() {
        match c {
            '<' => {
                in_tag = true;
                plain.push(' ');
            }
            '>' => in_tag = false,
            _ if !in_tag => plain.push(c),
            _ => {}
        }
    }
    let collapsed = plain.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= limit {
        return collapsed;
    }
    let cut: String = collapsed.chars().take(limit.saturating_sub(4)).collect();
    format!("{cut}....")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_read_naturally() {
        let names: Vec<String> = ["Germany", "Italy", "Japan"].iter().map(|s| s.to_string()).collect();
        assert_eq!(name_list(&names[..1]), "Germany");
        assert_eq!(name_list(&names[..2]), "Germany and Italy");
        assert_eq!(name_list(&names), "Germany, Italy and Japan");
    }

    #[test]
    fn long_messages_lose_markup_and_are_cut() {
        let long = format!("<b>{}</b>", "x".repeat(300));
        let short = shorten_for_history(&long, 150);
        assert!(!short.contains('<'));
        assert_eq!(short.chars().count(), 150);
        assert!(short.ends_with("...."));
        assert_eq!(shorten_for_history("  short  ", 150), "short");
    }
}
