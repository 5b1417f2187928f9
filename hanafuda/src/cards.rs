//! The 48-card hanafuda deck.
//!
//! A card is addressed by a four-digit code `MMNN`: month 01-12 and index
//! 01-04 within the month. Index 1 is the highest card of the month, index 4
//! the lowest, so `"0301"` is the cherry-blossom curtain and `"1204"` is a
//! paulownia chaff card. The code is the wire format and the storage format;
//! the category table below is derived data and never serialized.

use rand::seq::SliceRandom;
use serde::de::{self, Deserialize, Deserializer, Visitor};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of cards in a full deck: 12 months with 4 cards each.
pub const DECK_SIZE: usize = 48;

/// Colour of a ribbon card, relevant for the ribbon yaku.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RibbonColour {
    /// Red ribbon with a poem, months 1-3.
    Poetry,
    /// Blue ribbon, months 6, 9 and 10.
    Blue,
    /// Plain red ribbon.
    Plain,
}

/// The scoring category of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Bright,
    Seed,
    Ribbon(RibbonColour),
    Chaff,
}

/// Compact card identifier, formatted as `MMNN`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CardId {
    month: u8,
    index: u8,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CardParseError {
    #[error("card code must be four digits, got {0:?}")]
    Malformed(String),
    #[error("month {0} out of range 1-12")]
    MonthOutOfRange(u8),
    #[error("card index {0} out of range 1-4")]
    IndexOutOfRange(u8),
}

impl CardId {
    /// Builds a card id from month and index. Panics on out-of-range input,
    /// which is only reachable from a programming error; parsed input goes
    /// through [`FromStr`] instead.
    pub const fn of(month: u8, index: u8) -> CardId {
        assert!(month >= 1 && month <= 12);
        assert!(index >= 1 && index <= 4);
        CardId { month, index }
    }

    pub const fn month(&self) -> u8 {
        self.month
    }

    pub const fn index(&self) -> u8 {
        self.index
    }

    /// Two cards match when they belong to the same month.
    pub const fn matches(&self, other: &CardId) -> bool {
        self.month == other.month
    }

    /// The scoring category of the card.
    pub const fn category(&self) -> Category {
        use Category::*;
        use RibbonColour::*;
        match (self.month, self.index) {
            // The five brights.
            (1, 1) | (3, 1) | (8, 1) | (11, 1) | (12, 1) => Bright,
            // Seeds: the animal cards, plus the sake cup and the bridge.
            (2, 1) | (4, 1) | (5, 1) | (6, 1) | (7, 1) | (9, 1) | (10, 1) => Seed,
            (8, 2) | (11, 2) => Seed,
            // Ribbons.
            (1, 2) | (2, 2) | (3, 2) => Ribbon(Poetry),
            (6, 2) | (9, 2) | (10, 2) => Ribbon(Blue),
            (4, 2) | (5, 2) | (7, 2) | (11, 3) => Ribbon(Plain),
            // Everything else is chaff, including the willow lightning card
            // and all four paulownia leftovers.
            _ => Chaff,
        }
    }
}

// The named cards the yaku definitions care about.

/// Crane over pine, January bright.
pub const CRANE: CardId = CardId::of(1, 1);
/// Curtain under cherry blossoms, March bright.
pub const CURTAIN: CardId = CardId::of(3, 1);
/// Full moon over pampas, August bright.
pub const MOON: CardId = CardId::of(8, 1);
/// The rain man, November bright. Excluded from the dry three- and
/// four-bright yaku.
pub const RAIN_MAN: CardId = CardId::of(11, 1);
/// Phoenix, December bright.
pub const PHOENIX: CardId = CardId::of(12, 1);
/// Boar in bush clover, July seed.
pub const BOAR: CardId = CardId::of(7, 1);
/// Deer in maple, October seed.
pub const DEER: CardId = CardId::of(10, 1);
/// Butterflies over peony, June seed.
pub const BUTTERFLIES: CardId = CardId::of(6, 1);
/// The sake cup, September seed; pairs with the curtain and the moon.
pub const SAKE_CUP: CardId = CardId::of(9, 1);

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}{:02}", self.month, self.index)
    }
}

impl fmt::Debug for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}{:02}", self.month, self.index)
    }
}

impl FromStr for CardId {
    type Err = CardParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CardParseError::Malformed(s.to_string()));
        }
        let month: u8 = s[0..2].parse().expect("digits checked above");
        let index: u8 = s[2..4].parse().expect("digits checked above");
        if !(1..=12).contains(&month) {
            return Err(CardParseError::MonthOutOfRange(month));
        }
        if !(1..=4).contains(&index) {
            return Err(CardParseError::IndexOutOfRange(index));
        }
        Ok(CardId { month, index })
    }
}

impl Serialize for CardId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CardId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CardVisitor;

        impl Visitor<'_> for CardVisitor {
            type Value = CardId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a four-digit card code like \"0301\"")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<CardId, E> {
                v.parse().map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(CardVisitor)
    }
}

/// All 48 cards in month/index order.
pub fn full_deck() -> Vec<CardId> {
    let mut deck = Vec::with_capacity(DECK_SIZE);
    for month in 1..=12 {
        for index in 1..=4 {
            deck.push(CardId::of(month, index));
        }
    }
    deck
}

/// A full deck in random order, ready to deal.
pub fn shuffled_deck<R: rand::Rng + ?Sized>(rng: &mut R) -> Vec<CardId> {
    let mut deck = full_deck();
    deck.shuffle(rng);
    deck
}

/// The cards on the field that the given card can capture.
pub fn matchable_cards(card: CardId, field: &[CardId]) -> Vec<CardId> {
    field.iter().copied().filter(|f| f.matches(&card)).collect()
}
