use crate::model::card::Card;
use crate::model::hand::Hand;
use crate::model::rank::Rank;
use crate::model::suit::Suit;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

pub const DECK_SIZE: usize = 32;
pub const SKAT_SIZE: usize = 2;

#[derive(Debug, Clone)]
pub struct Deck {
    cards: Vec<Card>,
}

/// One seat's view of a fresh deal: the ten dealt cards and the two-card skat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deal {
    pub hand: Hand,
    pub skat: Hand,
}

impl Deck {
    pub fn standard() -> Self {
        let mut cards = Vec::with_capacity(DECK_SIZE);
        for suit in Suit::ALL.iter().copied() {
            for rank in Rank::ORDERED.iter().copied() {
                cards.push(Card::new(rank, suit));
            }
        }
        Self { cards }
    }

    pub fn full_set() -> Hand {
        Hand::from_bits(u32::MAX)
    }

    pub fn shuffled<R: rand::Rng + ?Sized>(rng: &mut R) -> Self {
        let mut deck = Self::standard();
        deck.shuffle_in_place(rng);
        deck
    }

    pub fn shuffled_with_seed(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::shuffled(&mut rng)
    }

    pub fn shuffle_in_place<R: rand::Rng + ?Sized>(&mut self, rng: &mut R) {
        self.cards.shuffle(rng);
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Takes the first ten cards as the analyzed hand and the last two as skat.
    pub fn deal(&self) -> Deal {
        let hand = self.cards.iter().take(Hand::MAX_CARDS).copied().collect();
        let skat = self.cards.iter().rev().take(SKAT_SIZE).copied().collect();
        Deal { hand, skat }
    }
}
