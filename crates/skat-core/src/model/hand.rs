use crate::model::card::{Card, CardParseError};
use crate::model::rank::Rank;
use crate::model::suit::Suit;
use core::fmt;
use tracing::debug;

/// An unordered set of Skat cards, stored as a bit set over the 32-card deck.
///
/// The same type models a player's hand and the known pools beside it
/// (skat, discard, pickup). Duplicates are impossible by construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Hand {
    bits: u32,
}

/// Result of a lenient parse: the cards that were understood plus the raw
/// tokens that were skipped (unknown, malformed or repeated).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedHand {
    pub hand: Hand,
    pub skipped: Vec<String>,
}

impl Hand {
    /// A record hand never holds more than ten cards.
    pub const MAX_CARDS: usize = 10;

    pub const fn new() -> Self {
        Self { bits: 0 }
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self { bits }
    }

    pub const fn bits(self) -> u32 {
        self.bits
    }

    pub fn with_cards(cards: impl IntoIterator<Item = Card>) -> Self {
        let mut hand = Self::new();
        for card in cards {
            hand.add(card);
        }
        hand
    }

    /// Lenient parse of a whitespace-separated token list such as
    /// `[CJ SA ST H7]`. Bracket delimiters are stripped; anything that is not
    /// a card, or repeats a card already seen, is skipped.
    pub fn parse(text: &str) -> ParsedHand {
        let mut parsed = ParsedHand::default();
        for token in tokens(text) {
            match token.parse::<Card>() {
                Ok(card) => {
                    if !parsed.hand.add(card) {
                        debug!(target: "skat_core::parse", token, "skipping repeated card");
                        parsed.skipped.push(token.to_string());
                    }
                }
                Err(err) => {
                    debug!(target: "skat_core::parse", token, error = %err, "skipping token");
                    parsed.skipped.push(token.to_string());
                }
            }
        }
        parsed
    }

    /// Strict parse: the first token outside the deck is an error.
    /// Repeated cards collapse silently because the result is a set.
    pub fn parse_strict(text: &str) -> Result<Self, CardParseError> {
        let mut hand = Self::new();
        for token in tokens(text) {
            hand.add(token.parse::<Card>()?);
        }
        Ok(hand)
    }

    /// Adds `card`; returns `false` if it was already present.
    pub fn add(&mut self, card: Card) -> bool {
        let mask = mask(card);
        let fresh = self.bits & mask == 0;
        self.bits |= mask;
        fresh
    }

    pub fn remove(&mut self, card: Card) -> bool {
        let mask = mask(card);
        let present = self.bits & mask != 0;
        self.bits &= !mask;
        present
    }

    pub const fn contains(self, card: Card) -> bool {
        self.bits & mask(card) != 0
    }

    pub const fn len(self) -> usize {
        self.bits.count_ones() as usize
    }

    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }

    pub const fn union(self, other: Hand) -> Hand {
        Hand::from_bits(self.bits | other.bits)
    }

    pub const fn difference(self, other: Hand) -> Hand {
        Hand::from_bits(self.bits & !other.bits)
    }

    pub const fn is_disjoint(self, other: Hand) -> bool {
        self.bits & other.bits == 0
    }

    /// Cards in deck order: suit-major, Null rank order within a suit.
    pub fn iter(self) -> impl Iterator<Item = Card> {
        (0..32u8)
            .filter(move |id| self.bits & (1 << id) != 0)
            .filter_map(Card::from_id)
    }

    pub fn cards(self) -> Vec<Card> {
        self.iter().collect()
    }

    /// All held cards of `suit`, jacks included.
    pub fn suit(self, suit: Suit) -> Hand {
        Hand::from_bits(self.bits & (0xFF << (suit.index() * 8)))
    }

    pub fn jacks(self) -> Hand {
        Hand::with_cards(self.iter().filter(|card| card.is_jack()))
    }

    /// Ranks held in `suit`, jacks included, ascending in Null order.
    pub fn ranks(self, suit: Suit) -> Vec<Rank> {
        self.suit(suit).iter().map(|card| card.rank).collect()
    }
}

impl FromIterator<Card> for Hand {
    fn from_iter<I: IntoIterator<Item = Card>>(iter: I) -> Self {
        Hand::with_cards(iter)
    }
}

impl fmt::Display for Hand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (idx, card) in self.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{card}")?;
        }
        f.write_str("]")
    }
}

const fn mask(card: Card) -> u32 {
    1 << card.to_id()
}

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c.is_whitespace() || c == '[' || c == ']' || c == ',')
        .filter(|token| !token.is_empty())
}
