//! Hand signatures: small integer tuples summarising a hand's structure.
//!
//! Signatures are the aggregation keys of every report. Many concrete hands
//! collapse onto one signature and extraction is a pure function of the hand
//! and its contract context.

use crate::model::hand::Hand;
use crate::model::rank::Rank;
use crate::model::suit::Suit;
use crate::null::{SuitSafety, evaluate_suits};
use crate::order::{SuitOrder, SuitRanks};
use core::fmt;
use serde::{Deserialize, Serialize};

/// Which cards count as trumps when extracting a trump signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrumpGame {
    /// Jacks plus the named suit.
    Suit(Suit),
    /// Jacks only.
    Grand,
    /// Jacks plus the longest side suit, before any game is declared.
    BestSuit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractContext {
    Trump {
        game: TrumpGame,
        /// Skat cards the declarer knows about (picked up or discarded).
        skat: Hand,
    },
    Null {
        /// Cards out of the opponents' reach, normally the declarer's discard.
        discard: Hand,
        /// Rank that makes a singleton "blank"; a lone seven by default.
        blank_low_rank: Rank,
    },
}

impl ContractContext {
    pub const fn trump(game: TrumpGame) -> Self {
        ContractContext::Trump {
            game,
            skat: Hand::new(),
        }
    }

    pub const fn null() -> Self {
        ContractContext::Null {
            discard: Hand::new(),
            blank_low_rank: Rank::Seven,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TrumpSignature {
    pub trump_length: u8,
    pub jacks: u8,
    pub safe_fulls: u8,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NullSignature {
    pub safe_suits: u8,
    pub void_suits: u8,
    pub total_gaps: u8,
    pub blank_low_cards: u8,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Signature {
    Trump(TrumpSignature),
    Null(NullSignature),
}

impl fmt::Display for TrumpSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "T{} J{} F{}",
            self.trump_length, self.jacks, self.safe_fulls
        )
    }
}

impl fmt::Display for NullSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "safe {} void {} gaps {} blank {}",
            self.safe_suits, self.void_suits, self.total_gaps, self.blank_low_cards
        )
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signature::Trump(sig) => sig.fmt(f),
            Signature::Null(sig) => sig.fmt(f),
        }
    }
}

/// Detailed trump-game features of a hand. [`TrumpSignature`] is the
/// projection used as an aggregation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TrumpProfile {
    /// Jack bits: clubs 8, spades 4, hearts 2, diamonds 1.
    pub jack_mask: u8,
    pub jacks: u8,
    pub trump_suit: Option<Suit>,
    pub trump_length: u8,
    pub aces: u8,
    pub tens: u8,
    /// Tens whose ace is held or lies in the skat.
    pub attached_tens: u8,
    /// Tens that are the only non-jack card of their suit.
    pub blank_tens: u8,
    /// Suits holding ten, king and at least one of 7/8/9.
    pub ten_king_small: u8,
    pub max_side_len: u8,
    pub skat_fulls: u8,
    pub card_count: u8,
}

impl TrumpProfile {
    pub fn from_hand(hand: Hand, game: TrumpGame, skat: Hand) -> Self {
        let jacks = hand.jacks();
        let jack_mask = jacks
            .iter()
            .fold(0u8, |mask, card| mask | (8 >> card.suit.index()));
        // Side-suit views: jacks drop out, ten ranks between king and ace.
        let held = SuitRanks::from_hand(hand, &SuitOrder);
        let in_skat = SuitRanks::from_hand(skat, &SuitOrder);
        let side_len = |suit: Suit| held.get(suit).len() as u8;
        let max_side_len = Suit::ALL.into_iter().map(side_len).max().unwrap_or(0);

        let (trump_suit, trump_length) = match game {
            TrumpGame::Suit(suit) => (Some(suit), jacks.len() as u8 + side_len(suit)),
            TrumpGame::Grand => (None, jacks.len() as u8),
            TrumpGame::BestSuit => (None, jacks.len() as u8 + max_side_len),
        };

        let mut profile = TrumpProfile {
            jack_mask,
            jacks: jacks.len() as u8,
            trump_suit,
            trump_length,
            aces: 0,
            tens: 0,
            attached_tens: 0,
            blank_tens: 0,
            ten_king_small: 0,
            max_side_len,
            skat_fulls: skat.iter().filter(|card| card.rank.is_full()).count() as u8,
            card_count: hand.len() as u8,
        };

        for (suit, ranks) in held.iter() {
            if Some(suit) == trump_suit {
                continue;
            }
            let has = |position: u8| ranks.contains(&position);
            let ace_out_of_reach =
                has(SuitOrder::ACE) || in_skat.get(suit).contains(&SuitOrder::ACE);
            if has(SuitOrder::ACE) {
                profile.aces += 1;
            }
            if has(SuitOrder::TEN) {
                profile.tens += 1;
                if ace_out_of_reach {
                    profile.attached_tens += 1;
                }
                if ranks.len() == 1 {
                    profile.blank_tens += 1;
                }
                let has_small = ranks.first().is_some_and(|low| *low < SuitOrder::QUEEN);
                if has(SuitOrder::KING) && has_small {
                    profile.ten_king_small += 1;
                }
            }
        }

        profile
    }

    pub fn safe_fulls(&self) -> u8 {
        self.aces + self.attached_tens
    }

    pub fn signature(&self) -> TrumpSignature {
        TrumpSignature {
            trump_length: self.trump_length,
            jacks: self.jacks,
            safe_fulls: self.safe_fulls(),
        }
    }
}

/// Per-suit Null safety of a hand, the source of [`NullSignature`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NullProfile {
    pub suits: [SuitSafety; 4],
    pub lengths: [u8; 4],
    pub blank_low_cards: u8,
}

impl NullProfile {
    pub fn from_hand(hand: Hand, discard: Hand, blank_low_rank: Rank) -> Self {
        let lengths = Suit::ALL.map(|suit| hand.suit(suit).len() as u8);
        let blank_low_cards = Suit::ALL
            .into_iter()
            .filter(|suit| hand.ranks(*suit) == [blank_low_rank])
            .count() as u8;
        Self {
            suits: evaluate_suits(hand, discard),
            lengths,
            blank_low_cards,
        }
    }

    pub fn signature(&self) -> NullSignature {
        NullSignature {
            safe_suits: self.suits.iter().filter(|s| s.is_safe).count() as u8,
            void_suits: self.lengths.iter().filter(|len| **len == 0).count() as u8,
            total_gaps: self.suits.iter().map(|s| s.unsafe_gaps).sum(),
            blank_low_cards: self.blank_low_cards,
        }
    }
}

/// Extracts the signature of `hand` under `context`. Total: any hand,
/// including an empty one, yields exactly one signature.
pub fn extract_signature(hand: Hand, context: &ContractContext) -> Signature {
    match *context {
        ContractContext::Trump { game, skat } => {
            Signature::Trump(TrumpProfile::from_hand(hand, game, skat).signature())
        }
        ContractContext::Null {
            discard,
            blank_low_rank,
        } => Signature::Null(NullProfile::from_hand(hand, discard, blank_low_rank).signature()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hand(text: &str) -> Hand {
        Hand::parse_strict(text).expect("valid hand")
    }

    #[test]
    fn suit_game_counts_trumps_and_side_fulls() {
        // Clubs trump: two jacks plus CA CT C7; hearts king/eight, diamonds 7-9.
        let h = hand("CJ SJ CA CT C7 HK H8 D7 D8 D9");
        let profile = TrumpProfile::from_hand(h, TrumpGame::Suit(Suit::Clubs), Hand::new());
        assert_eq!(profile.jack_mask, 12);
        assert_eq!(profile.trump_length, 5);
        // Club ace and ten are trumps now, not side fulls.
        assert_eq!(profile.safe_fulls(), 0);
        assert_eq!(profile.max_side_len, 3);
    }

    #[test]
    fn grand_counts_fulls_in_every_suit() {
        let h = hand("CJ SJ CA CT C7 HK H8 D7 D8 D9");
        let sig = extract_signature(h, &ContractContext::trump(TrumpGame::Grand));
        assert_eq!(
            sig,
            Signature::Trump(TrumpSignature {
                trump_length: 2,
                jacks: 2,
                safe_fulls: 2,
            })
        );
    }

    #[test]
    fn best_suit_uses_longest_side_suit() {
        let h = hand("CJ SJ CA CT C7 HK H8 D7 D8 D9");
        let sig = extract_signature(h, &ContractContext::trump(TrumpGame::BestSuit));
        assert_eq!(
            sig,
            Signature::Trump(TrumpSignature {
                trump_length: 5,
                jacks: 2,
                safe_fulls: 2,
            })
        );
    }

    #[test]
    fn ten_protected_by_ace_in_skat() {
        let h = hand("HJ ST S9 D7");
        let bare = TrumpProfile::from_hand(h, TrumpGame::Suit(Suit::Hearts), Hand::new());
        let covered = TrumpProfile::from_hand(h, TrumpGame::Suit(Suit::Hearts), hand("SA C7"));
        assert_eq!(bare.safe_fulls(), 0);
        assert_eq!(covered.safe_fulls(), 1);
        assert_eq!(covered.skat_fulls, 1);
    }

    #[test]
    fn ten_king_small_and_blank_tens() {
        let profile = TrumpProfile::from_hand(hand("HT HK H7 DT"), TrumpGame::Grand, Hand::new());
        assert_eq!(profile.tens, 2);
        assert_eq!(profile.ten_king_small, 1);
        assert_eq!(profile.blank_tens, 1);
    }

    #[test]
    fn jacks_leave_their_printed_suit() {
        // The diamond jack is a trump, so the diamond ten stays blank and the
        // clubs ten has no small card beside its king.
        let profile =
            TrumpProfile::from_hand(hand("DT DJ CT CK CJ"), TrumpGame::Grand, Hand::new());
        assert_eq!(profile.jacks, 2);
        assert_eq!(profile.blank_tens, 1);
        assert_eq!(profile.ten_king_small, 0);
        assert_eq!(profile.max_side_len, 2);
    }

    #[test]
    fn null_signature_aggregates_suit_safety() {
        // Clubs 7-10 (one gap), spades 7-8-9 safe, hearts blank 7, diamonds void.
        let h = hand("C7 CT S7 S8 S9 H7");
        let sig = extract_signature(h, &ContractContext::null());
        assert_eq!(
            sig,
            Signature::Null(NullSignature {
                safe_suits: 3,
                void_suits: 1,
                total_gaps: 1,
                blank_low_cards: 1,
            })
        );
    }

    #[test]
    fn null_discard_closes_gaps_and_blank_rank_is_configurable() {
        let h = hand("C7 CT S8 H7");
        let context = ContractContext::Null {
            discard: hand("C8 C9"),
            blank_low_rank: Rank::Eight,
        };
        let Signature::Null(sig) = extract_signature(h, &context) else {
            panic!("null context yields a null signature");
        };
        // Clubs 7-10 is closed by the discarded 8 and 9; the lone spade
        // eight still sits over the seven.
        assert_eq!(sig.total_gaps, 1);
        assert_eq!(sig.safe_suits, 3);
        assert_eq!(sig.blank_low_cards, 1);
    }

    #[test]
    fn extraction_is_total_and_idempotent() {
        let contexts = [
            ContractContext::null(),
            ContractContext::trump(TrumpGame::Grand),
            ContractContext::trump(TrumpGame::BestSuit),
            ContractContext::trump(TrumpGame::Suit(Suit::Diamonds)),
        ];
        for context in &contexts {
            let empty = extract_signature(Hand::new(), context);
            assert_eq!(empty, extract_signature(Hand::new(), context));
            let h = hand("CJ DJ SA ST S7 HQ HK D8 D9 DA");
            assert_eq!(extract_signature(h, context), extract_signature(h, context));
        }
    }

    #[test]
    fn signatures_serialize_with_family_tag() {
        let sig = Signature::Trump(TrumpSignature {
            trump_length: 6,
            jacks: 2,
            safe_fulls: 3,
        });
        let json = serde_json::to_string(&sig).expect("serialize");
        assert_eq!(
            json,
            r#"{"family":"trump","trump_length":6,"jacks":2,"safe_fulls":3}"#
        );
    }
}
