//! Suit safety for the Null contract.
//!
//! A Null declarer loses as soon as they are forced to win a trick. A suit is
//! safe when, however the opponents lead it, the declarer can always play
//! under the card on the table. With both sides' ranks sorted ascending this
//! reduces to a prefix-domination test: the declarer's i-th lowest card must
//! sit below the opponents' i-th lowest card.

use crate::model::hand::Hand;
use crate::model::rank::Rank;
use crate::model::suit::Suit;
use crate::order::{NullOrder, RankOrder, SuitRanks};
use core::fmt;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SuitSafety {
    pub is_safe: bool,
    pub unsafe_gaps: u8,
}

impl SuitSafety {
    pub const SAFE: SuitSafety = SuitSafety {
        is_safe: true,
        unsafe_gaps: 0,
    };
}

/// Evaluates one suit in Null rank positions (0 = seven … 7 = ace).
///
/// `known_excluded` holds ranks proven not to be with an opponent, such as
/// the declarer's own discard. Pass an empty slice for the worst case where
/// every unseen card may be adversarial. Positions outside the domain are
/// ignored.
pub fn is_suit_safe(held: &[u8], known_excluded: &[u8]) -> SuitSafety {
    let mut taken = [false; NullOrder::DOMAIN as usize];
    let mut held_sorted: Vec<u8> = held
        .iter()
        .copied()
        .filter(|rank| *rank < NullOrder::DOMAIN)
        .collect();
    held_sorted.sort_unstable();
    held_sorted.dedup();
    for rank in held_sorted.iter().chain(known_excluded.iter()) {
        if let Some(slot) = taken.get_mut(*rank as usize) {
            *slot = true;
        }
    }

    let opponents: Vec<u8> = (0..NullOrder::DOMAIN)
        .filter(|rank| !taken[*rank as usize])
        .collect();

    if opponents.is_empty() || held_sorted.is_empty() {
        return SuitSafety::SAFE;
    }

    let unsafe_gaps = held_sorted
        .iter()
        .zip(opponents.iter())
        .filter(|(mine, theirs)| mine > theirs)
        .count() as u8;

    SuitSafety {
        is_safe: unsafe_gaps == 0,
        unsafe_gaps,
    }
}

/// Safety of all four suits of `hand`, with `excluded` cards (e.g. the
/// declarer's discard) removed from the opponents' reach.
pub fn evaluate_suits(hand: Hand, excluded: Hand) -> [SuitSafety; 4] {
    let held = SuitRanks::from_hand(hand, &NullOrder);
    let gone = SuitRanks::from_hand(excluded.difference(hand), &NullOrder);
    Suit::ALL.map(|suit| is_suit_safe(held.get(suit), gone.get(suit)))
}

/// A single suit holding rendered the way players talk about it: `7-9-Q`,
/// or `Void` for an empty suit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SuitPattern(Vec<Rank>);

impl SuitPattern {
    pub fn of(hand: Hand, suit: Suit) -> Self {
        Self(hand.ranks(suit))
    }

    /// The four suit holdings of `hand` in Clubs, Spades, Hearts, Diamonds order.
    pub fn all(hand: Hand) -> [SuitPattern; 4] {
        Suit::ALL.map(|suit| Self::of(hand, suit))
    }

    pub fn is_void(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SuitPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("Void");
        }
        let labels: Vec<&str> = self.0.iter().map(|rank| rank.label()).collect();
        f.write_str(&labels.join("-"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seven_ten_against_eight_nine_has_one_gap() {
        assert_eq!(
            is_suit_safe(&[0, 3], &[]),
            SuitSafety {
                is_safe: false,
                unsafe_gaps: 1
            }
        );
    }

    #[test]
    fn void_suit_is_always_safe() {
        assert_eq!(is_suit_safe(&[], &[]), SuitSafety::SAFE);
        assert_eq!(is_suit_safe(&[], &[0, 1, 2]), SuitSafety::SAFE);
    }

    #[test]
    fn full_suit_is_safe() {
        assert_eq!(is_suit_safe(&[0, 1, 2, 3, 4, 5, 6, 7], &[]), SuitSafety::SAFE);
    }

    #[test]
    fn exclusions_can_make_a_suit_safe() {
        // 7-10 is unsafe while 8 and 9 may be out; with both in the discard
        // the opponents' lowest card is the jack.
        assert!(!is_suit_safe(&[0, 3], &[]).is_safe);
        assert_eq!(is_suit_safe(&[0, 3], &[1, 2]), SuitSafety::SAFE);
    }

    #[test]
    fn high_singleton_is_one_gap() {
        let safety = is_suit_safe(&[7], &[]);
        assert!(!safety.is_safe);
        assert_eq!(safety.unsafe_gaps, 1);
    }

    #[test]
    fn unsorted_input_is_normalised() {
        assert_eq!(is_suit_safe(&[3, 0], &[]), is_suit_safe(&[0, 3], &[]));
    }

    #[test]
    fn evaluate_suits_uses_discard_as_exclusion() {
        let hand = Hand::parse("C7 CT S7 S8 S9 H7").hand;
        let discard = Hand::parse("C8 C9").hand;
        let before = evaluate_suits(hand, Hand::new());
        let after = evaluate_suits(hand, discard);
        assert!(!before[Suit::Clubs.index()].is_safe);
        assert!(after[Suit::Clubs.index()].is_safe);
        assert!(after[Suit::Spades.index()].is_safe);
        assert_eq!(after[Suit::Diamonds.index()], SuitSafety::SAFE);
    }

    #[test]
    fn patterns_render_with_ten_label() {
        let hand = Hand::parse("C7 C9 CQ ST").hand;
        let [clubs, spades, hearts, _] = SuitPattern::all(hand);
        assert_eq!(clubs.to_string(), "7-9-Q");
        assert_eq!(spades.to_string(), "10");
        assert!(hearts.is_void());
        assert_eq!(hearts.to_string(), "Void");
    }
}
