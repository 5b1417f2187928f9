//! Yaku recognition.
//!
//! A yaku is a pure function of a player's depository (plus the ruleset
//! toggles), so this whole module is table-driven and stateless. The runtime
//! calls [`recognize`] after every capture step and compares the result with
//! the previous turn via [`newly_formed`] to decide whether the player gets a
//! koi-koi decision.

use crate::cards::{
    BOAR, BUTTERFLIES, CURTAIN, CardId, Category, DEER, MOON, RAIN_MAN, RibbonColour, SAKE_CUP,
};
use crate::ruleset::Ruleset;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum YakuKind {
    /// All five brights.
    Goko,
    /// Four brights without the rain man.
    Shiko,
    /// Four brights including the rain man.
    AmeShiko,
    /// Three brights without the rain man.
    Sanko,
    /// Curtain and sake cup.
    HanamiZake,
    /// Moon and sake cup.
    TsukimiZake,
    /// Boar, deer and butterflies.
    Inoshikacho,
    /// The three poetry ribbons.
    Akatan,
    /// The three blue ribbons.
    Aotan,
    /// Five or more ribbons of any colour.
    Tanzaku,
    /// Five or more seeds.
    Tane,
    /// Ten or more chaff cards.
    Kasu,
    /// Four cards of one month dealt into a hand.
    Teshi,
    /// A hand dealt as four month-pairs.
    Kuttsuki,
}

/// One recognized yaku with the points it is currently worth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YakuScore {
    pub kind: YakuKind,
    pub points: u32,
}

/// Points awarded for the dealt-hand yaku that end a round instantly.
pub const INSTANT_YAKU_POINTS: u32 = 6;

/// All yaku currently present in a depository, in a stable order.
pub fn recognize(depository: &[CardId], ruleset: &Ruleset) -> Vec<YakuScore> {
    let mut found = Vec::new();

    let brights: Vec<CardId> = depository
        .iter()
        .copied()
        .filter(|c| c.category() == Category::Bright)
        .collect();
    let has_rain = brights.contains(&RAIN_MAN);
    let dry = brights.len() - usize::from(has_rain);
    match (brights.len(), has_rain) {
        (5, _) => found.push(YakuScore {
            kind: YakuKind::Goko,
            points: 10,
        }),
        (4, false) => found.push(YakuScore {
            kind: YakuKind::Shiko,
            points: 8,
        }),
        (4, true) => found.push(YakuScore {
            kind: YakuKind::AmeShiko,
            points: 7,
        }),
        _ if dry == 3 => found.push(YakuScore {
            kind: YakuKind::Sanko,
            points: 5,
        }),
        _ => {}
    }

    let has = |card: CardId| depository.contains(&card);

    if ruleset.hanami_enabled && has(CURTAIN) && has(SAKE_CUP) {
        found.push(YakuScore {
            kind: YakuKind::HanamiZake,
            points: 5,
        });
    }
    if ruleset.tsukimi_enabled && has(MOON) && has(SAKE_CUP) {
        found.push(YakuScore {
            kind: YakuKind::TsukimiZake,
            points: 5,
        });
    }
    if has(BOAR) && has(DEER) && has(BUTTERFLIES) {
        found.push(YakuScore {
            kind: YakuKind::Inoshikacho,
            points: 5,
        });
    }

    let ribbons_of = |colour: RibbonColour| {
        depository
            .iter()
            .filter(|c| c.category() == Category::Ribbon(colour))
            .count()
    };
    if ribbons_of(RibbonColour::Poetry) == 3 {
        found.push(YakuScore {
            kind: YakuKind::Akatan,
            points: 5,
        });
    }
    if ribbons_of(RibbonColour::Blue) == 3 {
        found.push(YakuScore {
            kind: YakuKind::Aotan,
            points: 5,
        });
    }

    let count_of = |pred: &dyn Fn(Category) -> bool| {
        depository.iter().filter(|c| pred(c.category())).count() as u32
    };
    let ribbons = count_of(&|c| matches!(c, Category::Ribbon(_)));
    if ribbons >= 5 {
        found.push(YakuScore {
            kind: YakuKind::Tanzaku,
            points: 1 + (ribbons - 5),
        });
    }
    let seeds = count_of(&|c| c == Category::Seed);
    if seeds >= 5 {
        found.push(YakuScore {
            kind: YakuKind::Tane,
            points: 1 + (seeds - 5),
        });
    }
    let chaff = count_of(&|c| c == Category::Chaff);
    if chaff >= 10 {
        found.push(YakuScore {
            kind: YakuKind::Kasu,
            points: 1 + (chaff - 10),
        });
    }

    found
}

/// Sum of the base points of a yaku list.
pub fn base_points(yaku: &[YakuScore]) -> u32 {
    yaku.iter().map(|y| y.points).sum()
}

/// The yaku that are new relative to `before`: a kind that was absent, or a
/// counting yaku whose points went up. Either one re-opens the koi-koi
/// decision.
pub fn newly_formed(before: &[YakuScore], after: &[YakuScore]) -> Vec<YakuScore> {
    after
        .iter()
        .copied()
        .filter(|y| {
            match before.iter().find(|b| b.kind == y.kind) {
                None => true,
                Some(b) => y.points > b.points,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{CRANE, PHOENIX};

    fn rules() -> Ruleset {
        Ruleset::default()
    }

    fn kinds(yaku: &[YakuScore]) -> Vec<YakuKind> {
        yaku.iter().map(|y| y.kind).collect()
    }

    #[test]
    fn empty_depository_has_no_yaku() {
        assert!(recognize(&[], &rules()).is_empty());
    }

    #[test]
    fn bright_ladder() {
        let mut dep = vec![CRANE, CURTAIN, MOON];
        assert_eq!(kinds(&recognize(&dep, &rules())), vec![YakuKind::Sanko]);

        dep.push(RAIN_MAN);
        // Rain man does not upgrade sanko to shiko; it makes ame-shiko.
        assert_eq!(kinds(&recognize(&dep, &rules())), vec![YakuKind::AmeShiko]);

        dep.push(PHOENIX);
        let all = recognize(&dep, &rules());
        assert_eq!(kinds(&all), vec![YakuKind::Goko]);
        assert_eq!(base_points(&all), 10);
    }

    #[test]
    fn shiko_needs_four_dry_brights() {
        let dep = vec![CRANE, CURTAIN, MOON, PHOENIX];
        assert_eq!(kinds(&recognize(&dep, &rules())), vec![YakuKind::Shiko]);
    }

    #[test]
    fn viewing_yaku_respect_toggles() {
        let dep = vec![CURTAIN, SAKE_CUP];
        assert_eq!(
            kinds(&recognize(&dep, &rules())),
            vec![YakuKind::HanamiZake]
        );

        let mut no_hanami = rules();
        no_hanami.hanami_enabled = false;
        assert!(recognize(&dep, &no_hanami).is_empty());
    }

    #[test]
    fn counting_yaku_grow_with_extras() {
        // Five ribbons score 1, each further ribbon adds one point.
        let mut dep = vec![
            CardId::of(1, 2),
            CardId::of(2, 2),
            CardId::of(4, 2),
            CardId::of(5, 2),
            CardId::of(7, 2),
        ];
        let five = recognize(&dep, &rules());
        assert_eq!(kinds(&five), vec![YakuKind::Tanzaku]);
        assert_eq!(five[0].points, 1);

        dep.push(CardId::of(6, 2));
        let six = recognize(&dep, &rules());
        assert_eq!(six.iter().find(|y| y.kind == YakuKind::Tanzaku).unwrap().points, 2);
    }

    #[test]
    fn akatan_and_tanzaku_can_coexist() {
        let dep = vec![
            CardId::of(1, 2),
            CardId::of(2, 2),
            CardId::of(3, 2),
            CardId::of(4, 2),
            CardId::of(5, 2),
        ];
        let yaku = recognize(&dep, &rules());
        assert!(kinds(&yaku).contains(&YakuKind::Akatan));
        assert!(kinds(&yaku).contains(&YakuKind::Tanzaku));
    }

    #[test]
    fn kasu_counts_chaff() {
        let dep: Vec<CardId> = crate::cards::full_deck()
            .into_iter()
            .filter(|c| c.category() == Category::Chaff)
            .take(11)
            .collect();
        let yaku = recognize(&dep, &rules());
        assert_eq!(kinds(&yaku), vec![YakuKind::Kasu]);
        assert_eq!(yaku[0].points, 2);
    }

    #[test]
    fn newly_formed_catches_upgrades() {
        let before = vec![YakuScore {
            kind: YakuKind::Tane,
            points: 1,
        }];
        let after = vec![
            YakuScore {
                kind: YakuKind::Tane,
                points: 2,
            },
            YakuScore {
                kind: YakuKind::Inoshikacho,
                points: 5,
            },
        ];
        let fresh = newly_formed(&before, &after);
        assert_eq!(kinds(&fresh), vec![YakuKind::Tane, YakuKind::Inoshikacho]);
        assert!(newly_formed(&after, &after).is_empty());
    }
}
