#![deny(warnings)]
//! Card model and hand feature extraction for Skat hand statistics.

pub mod model;
pub mod null;
pub mod order;
pub mod signature;

pub use model::card::{Card, CardParseError};
pub use model::hand::Hand;
pub use model::rank::Rank;
pub use model::suit::Suit;
pub use signature::{ContractContext, Signature, TrumpGame, extract_signature};
