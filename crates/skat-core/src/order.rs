//! Contract-dependent rank orders and the suit-partitioned hand view.

use crate::model::card::Card;
use crate::model::hand::Hand;
use crate::model::rank::Rank;
use crate::model::suit::Suit;
use serde::Serialize;

/// Maps a card to its position inside its suit for one contract family.
///
/// Returning `None` removes the card from the suit view entirely, which is
/// how trump orders keep jacks out of their natural suit.
pub trait RankOrder {
    /// Number of positions a suit can hold under this order.
    const DOMAIN: u8;

    fn position(&self, card: Card) -> Option<u8>;
}

/// Null ranking: 7, 8, 9, 10, J, Q, K, A.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullOrder;

impl RankOrder for NullOrder {
    const DOMAIN: u8 = 8;

    fn position(&self, card: Card) -> Option<u8> {
        Some(card.rank.index() as u8)
    }
}

/// Side-suit ranking in suit and grand games: 7, 8, 9, Q, K, 10, A.
/// Jacks are trumps and never belong to their printed suit.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuitOrder;

impl SuitOrder {
    pub const QUEEN: u8 = 3;
    pub const KING: u8 = 4;
    pub const TEN: u8 = 5;
    pub const ACE: u8 = 6;
}

impl RankOrder for SuitOrder {
    const DOMAIN: u8 = 7;

    fn position(&self, card: Card) -> Option<u8> {
        match card.rank {
            Rank::Seven => Some(0),
            Rank::Eight => Some(1),
            Rank::Nine => Some(2),
            Rank::Queen => Some(Self::QUEEN),
            Rank::King => Some(Self::KING),
            Rank::Ten => Some(Self::TEN),
            Rank::Ace => Some(Self::ACE),
            Rank::Jack => None,
        }
    }
}

/// Ascending rank positions per suit. All four suits are always present;
/// a void suit is an empty list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct SuitRanks {
    ranks: [Vec<u8>; 4],
}

impl SuitRanks {
    pub fn from_hand<O: RankOrder>(hand: Hand, order: &O) -> Self {
        let mut ranks: [Vec<u8>; 4] = Default::default();
        for card in hand.iter() {
            if let Some(position) = order.position(card) {
                ranks[card.suit.index()].push(position);
            }
        }
        for list in ranks.iter_mut() {
            list.sort_unstable();
            list.dedup();
        }
        Self { ranks }
    }

    pub fn get(&self, suit: Suit) -> &[u8] {
        &self.ranks[suit.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Suit, &[u8])> {
        Suit::ALL.into_iter().map(move |suit| (suit, self.get(suit)))
    }

    pub fn len(&self) -> usize {
        self.ranks.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parses free-form hand text into per-suit rank lists under `order`.
/// Unknown or malformed tokens are skipped.
pub fn parse_hand<O: RankOrder>(text: &str, order: &O) -> SuitRanks {
    SuitRanks::from_hand(Hand::parse(text).hand, order)
}
