//! Room types and the rulesets they select.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Partition key of the matchmaking pool. Each room type plays a fixed
/// number of rounds; everything else about the ruleset is currently shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomType {
    Quick,
    Standard,
    Marathon,
}

impl RoomType {
    pub const ALL: [RoomType; 3] = [RoomType::Quick, RoomType::Standard, RoomType::Marathon];

    /// The ruleset played in rooms of this type.
    pub fn ruleset(&self) -> Ruleset {
        let total_rounds = match self {
            RoomType::Quick => 3,
            RoomType::Standard => 6,
            RoomType::Marathon => 12,
        };
        Ruleset {
            total_rounds,
            ..Ruleset::default()
        }
    }
}

impl fmt::Display for RoomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoomType::Quick => "QUICK",
            RoomType::Standard => "STANDARD",
            RoomType::Marathon => "MARATHON",
        };
        f.write_str(name)
    }
}

impl FromStr for RoomType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUICK" => Ok(RoomType::Quick),
            "STANDARD" => Ok(RoomType::Standard),
            "MARATHON" => Ok(RoomType::Marathon),
            _ => Err(()),
        }
    }
}

/// Everything the round logic needs to know about how a game is scored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ruleset {
    pub total_rounds: u8,
    /// Cards in the deck. Always 48 today; kept explicit because the card
    /// conservation invariant is checked against it.
    pub deck_size: u8,
    /// Whether the curtain + sake cup yaku counts.
    pub hanami_enabled: bool,
    /// Whether the moon + sake cup yaku counts.
    pub tsukimi_enabled: bool,
    /// Whether teshi / kuttsuki / field kuttsuki end the round right after
    /// the deal.
    pub instant_end_enabled: bool,
}

impl Default for Ruleset {
    fn default() -> Self {
        Ruleset {
            total_rounds: 6,
            deck_size: crate::cards::DECK_SIZE as u8,
            hanami_enabled: true,
            tsukimi_enabled: true,
            instant_end_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_types_select_round_counts() {
        assert_eq!(RoomType::Quick.ruleset().total_rounds, 3);
        assert_eq!(RoomType::Standard.ruleset().total_rounds, 6);
        assert_eq!(RoomType::Marathon.ruleset().total_rounds, 12);
    }

    #[test]
    fn wire_names_are_screaming_snake() {
        let json = serde_json::to_string(&RoomType::Marathon).unwrap();
        assert_eq!(json, "\"MARATHON\"");
        assert_eq!("QUICK".parse::<RoomType>().unwrap(), RoomType::Quick);
        assert!("quick".parse::<RoomType>().is_err());
    }
}
