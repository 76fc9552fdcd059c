//! The configuration snapshot the session machine reads.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigError;
use crate::timer::Speed;

pub const MIN_BREATHS: u32 = 5;
pub const MAX_BREATHS: u32 = 60;
pub const MAX_FINITE_ROUNDS: u32 = 10;
pub const MAX_VOLUME: f64 = 0.5;

/// How many rounds a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounds {
    Finite(u32),
    /// Repeat until the user finishes explicitly.
    Unbounded,
}

impl Rounds {
    pub fn finite(self) -> Option<u32> {
        match self {
            Rounds::Finite(n) => Some(n),
            Rounds::Unbounded => None,
        }
    }
}

impl Default for Rounds {
    fn default() -> Self {
        Rounds::Finite(3)
    }
}

impl std::fmt::Display for Rounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rounds::Finite(n) => write!(f, "{n}"),
            Rounds::Unbounded => f.write_str("∞"),
        }
    }
}

impl std::str::FromStr for Rounds {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unbounded" | "infinite" | "∞" => Ok(Rounds::Unbounded),
            other => match other.parse::<u32>() {
                Ok(0) => Err("rounds must be at least 1".into()),
                Ok(n) => Ok(Rounds::Finite(n)),
                Err(_) => Err(format!("cannot parse '{other}' as rounds")),
            },
        }
    }
}

impl Serialize for Rounds {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Rounds::Finite(n) => serializer.serialize_u32(*n),
            Rounds::Unbounded => serializer.serialize_str("unbounded"),
        }
    }
}

impl<'de> Deserialize<'de> for Rounds {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Count(u64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Count(0) => Err(serde::de::Error::custom("rounds must be at least 1")),
            Repr::Count(n) => u32::try_from(n)
                .map(Rounds::Finite)
                .map_err(|_| serde::de::Error::custom("rounds out of range")),
            Repr::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// `{speed, rounds, breaths, volume}` as read by the session machine.
///
/// `volume` is passed through to cue emitters as the tone gain; the machine
/// only looks at it to decide whether cues are muted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default)]
    pub speed: Speed,
    #[serde(default)]
    pub rounds: Rounds,
    #[serde(default = "default_breaths")]
    pub breaths: u32,
    #[serde(default = "default_volume")]
    pub volume: f64,
}

fn default_breaths() -> u32 {
    30
}
fn default_volume() -> f64 {
    0.25
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            speed: Speed::default(),
            rounds: Rounds::default(),
            breaths: default_breaths(),
            volume: default_volume(),
        }
    }
}

impl SessionSettings {
    /// Replace each out-of-range field with its default, leaving valid
    /// fields untouched.
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        Self {
            speed: self.speed,
            rounds: match self.rounds {
                Rounds::Finite(n) if (1..=MAX_FINITE_ROUNDS).contains(&n) => self.rounds,
                Rounds::Unbounded => Rounds::Unbounded,
                Rounds::Finite(_) => defaults.rounds,
            },
            breaths: if (MIN_BREATHS..=MAX_BREATHS).contains(&self.breaths) {
                self.breaths
            } else {
                defaults.breaths
            },
            volume: if (0.0..=MAX_VOLUME).contains(&self.volume) {
                self.volume
            } else {
                defaults.volume
            },
        }
    }

    /// Reject the first out-of-range field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Rounds::Finite(n) = self.rounds {
            if !(1..=MAX_FINITE_ROUNDS).contains(&n) {
                return Err(ConfigError::InvalidValue {
                    key: "session.rounds".into(),
                    message: format!("{n} is outside 1..={MAX_FINITE_ROUNDS} (or \"unbounded\")"),
                });
            }
        }
        if !(MIN_BREATHS..=MAX_BREATHS).contains(&self.breaths) {
            return Err(ConfigError::InvalidValue {
                key: "session.breaths".into(),
                message: format!("{} is outside {MIN_BREATHS}..={MAX_BREATHS}", self.breaths),
            });
        }
        if !(0.0..=MAX_VOLUME).contains(&self.volume) {
            return Err(ConfigError::InvalidValue {
                key: "session.volume".into(),
                message: format!("{} is outside 0.0..={MAX_VOLUME}", self.volume),
            });
        }
        Ok(())
    }

    /// Zero volume mutes tones and haptics alike.
    pub fn cues_muted(&self) -> bool {
        self.volume <= 0.0
    }
}

/// Read accessor for the current settings.
///
/// The machine calls this at each step, so a shared source may change
/// between sessions.
pub trait SettingsSource {
    fn current(&self) -> SessionSettings;
}

impl SettingsSource for SessionSettings {
    fn current(&self) -> SessionSettings {
        *self
    }
}

impl SettingsSource for Rc<RefCell<SessionSettings>> {
    fn current(&self) -> SessionSettings {
        *self.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_serialize_as_number_or_sentinel() {
        let finite = serde_json::to_value(Rounds::Finite(4)).unwrap();
        assert_eq!(finite, serde_json::json!(4));
        let unbounded = serde_json::to_value(Rounds::Unbounded).unwrap();
        assert_eq!(unbounded, serde_json::json!("unbounded"));
    }

    #[test]
    fn rounds_deserialize_from_number_or_word() {
        let rounds: Rounds = serde_json::from_value(serde_json::json!(11)).unwrap();
        assert_eq!(rounds, Rounds::Finite(11));
        let rounds: Rounds = serde_json::from_value(serde_json::json!("unbounded")).unwrap();
        assert_eq!(rounds, Rounds::Unbounded);
        assert!(serde_json::from_value::<Rounds>(serde_json::json!(0)).is_err());
    }

    #[test]
    fn sanitized_keeps_valid_fields() {
        let settings = SessionSettings {
            speed: Speed::Fast,
            rounds: Rounds::Finite(42),
            breaths: 4,
            volume: 0.4,
        }
        .sanitized();
        assert_eq!(settings.speed, Speed::Fast);
        assert_eq!(settings.rounds, Rounds::Finite(3));
        assert_eq!(settings.breaths, 30);
        assert_eq!(settings.volume, 0.4);
    }

    #[test]
    fn validate_reports_key() {
        let settings = SessionSettings {
            volume: 0.9,
            ..SessionSettings::default()
        };
        match settings.validate() {
            Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, "session.volume"),
            other => panic!("expected InvalidValue, got {other:?}"),
        }
        assert!(SessionSettings::default().validate().is_ok());
    }

    #[test]
    fn shared_source_sees_updates() {
        let shared = Rc::new(RefCell::new(SessionSettings::default()));
        let source: Box<dyn SettingsSource> = Box::new(shared.clone());
        shared.borrow_mut().breaths = 12;
        assert_eq!(source.current().breaths, 12);
    }
}
