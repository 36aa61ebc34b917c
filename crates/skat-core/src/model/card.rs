use crate::model::rank::Rank;
use crate::model::suit::Suit;
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Card {
    pub suit: Suit,
    pub rank: Rank,
}

impl Card {
    pub const fn new(rank: Rank, suit: Suit) -> Self {
        Self { suit, rank }
    }

    /// Position in the 32-card deck: suit-major, Null rank order within a suit.
    pub const fn to_id(self) -> u8 {
        (self.suit.index() * 8 + self.rank.index()) as u8
    }

    pub const fn from_id(id: u8) -> Option<Self> {
        let Some(suit) = Suit::from_index(id as usize / 8) else {
            return None;
        };
        let Some(rank) = Rank::from_index(id as usize % 8) else {
            return None;
        };
        Some(Self::new(rank, suit))
    }

    pub const fn is_jack(self) -> bool {
        matches!(self.rank, Rank::Jack)
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.suit, self.rank)
    }
}

/// A card token that does not name a card of the Skat deck.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CardParseError {
    #[error("card token '{0}' is too short")]
    BadLength(String),
    #[error("unknown suit in card token '{0}'")]
    UnknownSuit(String),
    #[error("unknown rank in card token '{0}'")]
    UnknownRank(String),
}

impl FromStr for Card {
    type Err = CardParseError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let mut chars = token.chars();
        let Some(suit_char) = chars.next() else {
            return Err(CardParseError::BadLength(token.to_string()));
        };
        let rank_part = chars.as_str();
        if rank_part.is_empty() {
            return Err(CardParseError::BadLength(token.to_string()));
        }
        let suit =
            Suit::from_char(suit_char).ok_or_else(|| CardParseError::UnknownSuit(token.to_string()))?;
        let rank =
            Rank::from_symbol(rank_part).ok_or_else(|| CardParseError::UnknownRank(token.to_string()))?;
        Ok(Card::new(rank, suit))
    }
}
