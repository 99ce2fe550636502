use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How dice reach the game. Forum and email games draw from a remote,
/// synchronized service and are paced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Transport {
    #[default]
    Local,
    Forum,
    Email,
}

string_enum!(Transport {
    Local => "local",
    Forum => "forum",
    Email => "email",
});

impl Transport {
    pub fn is_remote(self) -> bool {
        !matches!(self, Transport::Local)
    }
}

/// Engine tuning, shared by every firing pass of a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub transport: Transport,
    /// Pause before each chance roll when the transport is remote.
    #[serde(with = "millis")]
    pub forum_roll_delay: Duration,
    /// Notification history text longer than this is shortened.
    pub notification_history_limit: usize,
    pub victory_history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transport: Transport::Local,
            forum_roll_delay: Duration::from_millis(100),
            notification_history_limit: 190,
            victory_history_limit: 150,
        }
    }
}

impl EngineConfig {
    /// The pause to take before a chance roll, if any.
    pub fn roll_delay(&self) -> Option<Duration> {
        (self.transport.is_remote() && !self.forum_roll_delay.is_zero())
            .then_some(self.forum_roll_delay)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_games_never_pause() {
        assert_eq!(EngineConfig::default().roll_delay(), None);
        let forum = EngineConfig {
            transport: Transport::Forum,
            ..Default::default()
        };
        assert_eq!(forum.roll_delay(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"transport":"email","forum_roll_delay":250}"#).unwrap();
        assert_eq!(config.transport, Transport::Email);
        assert_eq!(config.forum_roll_delay, Duration::from_millis(250));
        assert_eq!(config.victory_history_limit, 150);
    }
}
