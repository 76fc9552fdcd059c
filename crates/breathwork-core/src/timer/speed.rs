use serde::{Deserialize, Serialize};

/// Breathing pace selected by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speed {
    Slow,
    #[default]
    Standard,
    Fast,
}

impl Speed {
    pub const ALL: [Speed; 3] = [Speed::Slow, Speed::Standard, Speed::Fast];

    pub fn profile(self) -> SpeedProfile {
        match self {
            Speed::Slow => SpeedProfile {
                inhale_ms: 2500,
                exhale_ms: 1500,
            },
            Speed::Standard => SpeedProfile {
                inhale_ms: 2000,
                exhale_ms: 1000,
            },
            Speed::Fast => SpeedProfile {
                inhale_ms: 1000,
                exhale_ms: 1000,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Speed::Slow => "slow",
            Speed::Standard => "standard",
            Speed::Fast => "fast",
        }
    }
}

impl std::str::FromStr for Speed {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slow" => Ok(Speed::Slow),
            "standard" => Ok(Speed::Standard),
            "fast" => Ok(Speed::Fast),
            other => Err(format!("unknown speed '{other}' (expected slow, standard or fast)")),
        }
    }
}

impl std::fmt::Display for Speed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inhale and exhale durations for one paced breath.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedProfile {
    pub inhale_ms: u64,
    pub exhale_ms: u64,
}

impl SpeedProfile {
    /// Length of one full breath in milliseconds.
    pub fn cycle_ms(&self) -> u64 {
        self.inhale_ms + self.exhale_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_table() {
        assert_eq!(Speed::Slow.profile().cycle_ms(), 4000);
        assert_eq!(Speed::Standard.profile().inhale_ms, 2000);
        assert_eq!(Speed::Standard.profile().exhale_ms, 1000);
        assert_eq!(Speed::Fast.profile().cycle_ms(), 2000);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("FAST".parse::<Speed>().unwrap(), Speed::Fast);
        assert!("brisk".parse::<Speed>().is_err());
    }
}
