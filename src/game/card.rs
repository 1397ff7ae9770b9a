//! Cards, Deck, and Hand
//!
//! The 52-card model and the "31" scoring rules. A hand is worth the
//! best same-suit total of its cards, 30.5 for three of a kind, and a
//! suit total of 31 wins the round on the spot.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Card suit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Suit {
    /// Hearts (♥)
    Hearts,
    /// Diamonds (♦)
    Diamonds,
    /// Clubs (♣)
    Clubs,
    /// Spades (♠)
    Spades,
}

impl Suit {
    /// All four suits, in deck-building order.
    pub const ALL: [Suit; 4] = [Suit::Hearts, Suit::Diamonds, Suit::Clubs, Suit::Spades];

    /// Unicode symbol for display.
    pub fn symbol(self) -> char {
        match self {
            Suit::Hearts => '♥',
            Suit::Diamonds => '♦',
            Suit::Clubs => '♣',
            Suit::Spades => '♠',
        }
    }
}

impl std::fmt::Display for Suit {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Card rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    /// Ace, worth 11.
    Ace,
    /// Two
    Two,
    /// Three
    Three,
    /// Four
    Four,
    /// Five
    Five,
    /// Six
    Six,
    /// Seven
    Seven,
    /// Eight
    Eight,
    /// Nine
    Nine,
    /// Ten
    Ten,
    /// Jack, worth 10.
    Jack,
    /// Queen, worth 10.
    Queen,
    /// King, worth 10.
    King,
}

impl Rank {
    /// All thirteen ranks, in deck-building order.
    pub const ALL: [Rank; 13] = [
        Rank::Ace,
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
    ];

    /// Point value toward a suit total: A=11, face=10, else pip count.
    pub fn value(self) -> u16 {
        match self {
            Rank::Ace => 11,
            Rank::Jack | Rank::Queen | Rank::King => 10,
            Rank::Two => 2,
            Rank::Three => 3,
            Rank::Four => 4,
            Rank::Five => 5,
            Rank::Six => 6,
            Rank::Seven => 7,
            Rank::Eight => 8,
            Rank::Nine => 9,
            Rank::Ten => 10,
        }
    }
}

impl std::fmt::Display for Rank {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            Rank::Ace => "A",
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
        };
        write!(f, "{}", s)
    }
}

/// A playing card. Immutable once created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Card {
    /// Suit of the card.
    pub suit: Suit,
    /// Rank of the card.
    pub rank: Rank,
}

impl Card {
    /// Create a card.
    pub const fn new(suit: Suit, rank: Rank) -> Self {
        Self { suit, rank }
    }

    /// Point value toward a suit total.
    pub fn value(&self) -> u16 {
        self.rank.value()
    }
}

impl std::fmt::Display for Card {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}{}", self.rank, self.suit)
    }
}

/// Hand score in half-point units.
///
/// "31" scores are integers except the 30.5 awarded for three of a
/// kind, so scores are kept doubled internally. This keeps `Ord` exact
/// (no floats) while still serializing as fractional points on the
/// wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandScore(u16);

impl HandScore {
    /// Empty or unscorable hand.
    pub const ZERO: HandScore = HandScore(0);
    /// Three of a kind: 30.5 points, beaten only by 31.
    pub const THREE_OF_A_KIND: HandScore = HandScore(61);
    /// A full 31, the instant round win.
    pub const THIRTY_ONE: HandScore = HandScore(62);

    /// Build from a whole-point suit total.
    pub const fn from_points(points: u16) -> Self {
        HandScore(points * 2)
    }

    /// Score in points, with the .5 preserved.
    pub fn as_points(self) -> f32 {
        f32::from(self.0) / 2.0
    }
}

impl std::fmt::Display for HandScore {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.0 % 2 == 0 {
            write!(f, "{}", self.0 / 2)
        } else {
            write!(f, "{}.5", self.0 / 2)
        }
    }
}

/// A shuffled draw pile. Owned exclusively by one game.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Deck {
    cards: Vec<Card>,
}

impl Deck {
    /// A fresh 52-card deck, uniformly shuffled.
    pub fn shuffled() -> Self {
        let mut cards = Vec::with_capacity(52);
        for suit in Suit::ALL {
            for rank in Rank::ALL {
                cards.push(Card::new(suit, rank));
            }
        }
        cards.shuffle(&mut rand::thread_rng());
        Self { cards }
    }

    /// Rebuild a deck from recycled discards, reshuffled.
    pub fn reshuffled(mut cards: Vec<Card>) -> Self {
        cards.shuffle(&mut rand::thread_rng());
        Self { cards }
    }

    /// Draw the top card, or `None` when the pile is exhausted.
    pub fn draw(&mut self) -> Option<Card> {
        self.cards.pop()
    }

    /// True when no cards remain.
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Remaining card count.
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// Iterate remaining cards (for invariant checks).
    pub fn iter(&self) -> impl Iterator<Item = &Card> {
        self.cards.iter()
    }
}

/// One player's cards: three steady-state, four between draw and discard.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Hand {
    cards: Vec<Card>,
}

impl Hand {
    /// An empty hand.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a card to the hand.
    pub fn add(&mut self, card: Card) {
        self.cards.push(card);
    }

    /// Remove the card at `index`, or `None` if out of range.
    pub fn remove(&mut self, index: usize) -> Option<Card> {
        if index < self.cards.len() {
            Some(self.cards.remove(index))
        } else {
            None
        }
    }

    /// Drop all cards.
    pub fn clear(&mut self) {
        self.cards.clear();
    }

    /// Cards currently held, in pickup order.
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Number of cards held.
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// True when the hand holds no cards.
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Score the hand. Only a settled 3-card hand scores; anything
    /// else is `HandScore::ZERO`.
    pub fn score(&self) -> HandScore {
        if self.cards.len() != 3 {
            return HandScore::ZERO;
        }

        if self.cards[0].rank == self.cards[1].rank && self.cards[1].rank == self.cards[2].rank {
            return HandScore::THREE_OF_A_KIND;
        }

        let best = Suit::ALL
            .iter()
            .map(|&suit| {
                self.cards
                    .iter()
                    .filter(|c| c.suit == suit)
                    .map(Card::value)
                    .sum::<u16>()
            })
            .max()
            .unwrap_or(0);

        HandScore::from_points(best)
    }

    /// True iff the hand scores exactly 31.
    pub fn is_complete(&self) -> bool {
        self.score() == HandScore::THIRTY_ONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn hand_of(cards: &[(Rank, Suit)]) -> Hand {
        let mut hand = Hand::new();
        for &(rank, suit) in cards {
            hand.add(Card::new(suit, rank));
        }
        hand
    }

    #[test]
    fn test_card_values() {
        assert_eq!(Rank::Ace.value(), 11);
        assert_eq!(Rank::King.value(), 10);
        assert_eq!(Rank::Queen.value(), 10);
        assert_eq!(Rank::Jack.value(), 10);
        assert_eq!(Rank::Ten.value(), 10);
        assert_eq!(Rank::Two.value(), 2);
    }

    #[test]
    fn test_deck_is_full_permutation() {
        let mut deck = Deck::shuffled();
        assert_eq!(deck.len(), 52);

        let mut seen = BTreeSet::new();
        while let Some(card) = deck.draw() {
            assert!(seen.insert(card), "duplicate card {}", card);
        }
        assert_eq!(seen.len(), 52);
    }

    #[test]
    fn test_score_three_of_a_kind() {
        let hand = hand_of(&[
            (Rank::Seven, Suit::Hearts),
            (Rank::Seven, Suit::Clubs),
            (Rank::Seven, Suit::Spades),
        ]);
        assert_eq!(hand.score(), HandScore::THREE_OF_A_KIND);
        assert_eq!(hand.score().as_points(), 30.5);
        assert!(!hand.is_complete());
    }

    #[test]
    fn test_score_thirty_one() {
        let hand = hand_of(&[
            (Rank::King, Suit::Spades),
            (Rank::Queen, Suit::Spades),
            (Rank::Ace, Suit::Spades),
        ]);
        assert_eq!(hand.score(), HandScore::THIRTY_ONE);
        assert!(hand.is_complete());
    }

    #[test]
    fn test_thirty_one_beats_three_of_a_kind() {
        assert!(HandScore::THIRTY_ONE > HandScore::THREE_OF_A_KIND);
        assert!(HandScore::THREE_OF_A_KIND > HandScore::from_points(30));
    }

    #[test]
    fn test_score_no_shared_suit() {
        // No two cards share a suit: best single card wins.
        let hand = hand_of(&[
            (Rank::Two, Suit::Hearts),
            (Rank::Three, Suit::Diamonds),
            (Rank::Nine, Suit::Clubs),
        ]);
        assert_eq!(hand.score(), HandScore::from_points(9));
    }

    #[test]
    fn test_score_same_suit_pair() {
        let hand = hand_of(&[
            (Rank::Four, Suit::Hearts),
            (Rank::Six, Suit::Hearts),
            (Rank::Two, Suit::Diamonds),
        ]);
        assert_eq!(hand.score(), HandScore::from_points(10));
    }

    #[test]
    fn test_score_requires_three_cards() {
        let mut hand = hand_of(&[
            (Rank::King, Suit::Spades),
            (Rank::Queen, Suit::Spades),
        ]);
        assert_eq!(hand.score(), HandScore::ZERO);

        hand.add(Card::new(Suit::Spades, Rank::Ace));
        hand.add(Card::new(Suit::Hearts, Rank::Two));
        // Four cards mid-turn: not scorable either.
        assert_eq!(hand.score(), HandScore::ZERO);
    }

    #[test]
    fn test_hand_remove_out_of_range() {
        let mut hand = hand_of(&[(Rank::Two, Suit::Hearts)]);
        assert!(hand.remove(3).is_none());
        assert_eq!(hand.len(), 1);
        let card = hand.remove(0).unwrap();
        assert_eq!(card.rank, Rank::Two);
    }

    #[test]
    fn test_score_display() {
        assert_eq!(HandScore::THREE_OF_A_KIND.to_string(), "30.5");
        assert_eq!(HandScore::THIRTY_ONE.to_string(), "31");
        assert_eq!(HandScore::from_points(9).to_string(), "9");
    }

    proptest! {
        #[test]
        fn prop_shuffles_are_permutations(_seed in 0u32..32) {
            let deck = Deck::shuffled();
            let unique: BTreeSet<_> = deck.iter().copied().collect();
            prop_assert_eq!(unique.len(), 52);
        }

        #[test]
        fn prop_score_never_exceeds_thirty_one(
            indices in proptest::collection::vec(0usize..52, 3)
        ) {
            let all: Vec<Card> = Suit::ALL
                .iter()
                .flat_map(|&s| Rank::ALL.iter().map(move |&r| Card::new(s, r)))
                .collect();
            let mut hand = Hand::new();
            for &i in &indices {
                hand.add(all[i]);
            }
            prop_assert!(hand.score() <= HandScore::THIRTY_ONE);
        }
    }
}
