use std::fmt;

use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};

/// Decimals of the chain's native unit, used when rendering smallest-unit
/// amounts such as the prize pool.
pub const NATIVE_DECIMALS: u32 = 9;

/// Fixed wager sent alongside each guess: 0.001 native units.
pub const DEFAULT_STAKE: u64 = 1_000_000;

/// Backend-computed distance indicator for a guess. The backend is allowed to
/// answer with a rank number, a numeric string, or the literal `"far"`; all
/// of those collapse into this canonical form at the DTO boundary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Proximity {
    Rank(u64),
    Far,
}

impl Default for Proximity {
    fn default() -> Self {
        Proximity::Far
    }
}

impl fmt::Display for Proximity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Proximity::Rank(rank) => write!(f, "{rank}"),
            Proximity::Far => write!(f, "far"),
        }
    }
}

/// One record of a submitted guess, newest-first in the session log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GuessLogEntry {
    pub player: String,
    pub guess: String,
    /// Closeness score in `[0, 1]`.
    pub similarity: f64,
    pub proximity: Proximity,
    pub submitted_at: DateTime<Utc>,
}

impl GuessLogEntry {
    /// Entries are keyed by `(player, guess)` for dedup and reconciliation.
    /// Both sides compare trimmed and case-insensitive.
    pub fn matches(&self, player: &str, guess: &str) -> bool {
        self.player.trim().eq_ignore_ascii_case(player.trim())
            && self.guess.trim().eq_ignore_ascii_case(guess.trim())
    }

    pub fn same_key(&self, other: &GuessLogEntry) -> bool {
        self.matches(&other.player, &other.guess)
    }
}

/// Read-only snapshot of the on-chain game.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    /// Accumulated wagers in smallest units.
    pub prize_pool: u64,
    pub ended: bool,
}

impl GameState {
    pub fn display_prize_pool(&self) -> String {
        format_native(self.prize_pool)
    }
}

/// Renders a smallest-unit amount in human-readable native units, trimming
/// trailing zeros ("1000000" -> "0.001" with 9 decimals).
pub fn format_native(amount: u64) -> String {
    let scale = 10u64.pow(NATIVE_DECIMALS);
    let whole = amount / scale;
    let frac = amount % scale;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:0width$}", width = NATIVE_DECIMALS as usize);
    let frac = frac.trim_end_matches('0');
    format!("{whole}.{frac}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_native_renders_default_stake() {
        assert_eq!(format_native(DEFAULT_STAKE), "0.001");
    }

    #[test]
    fn format_native_trims_trailing_zeros() {
        assert_eq!(format_native(0), "0");
        assert_eq!(format_native(10u64.pow(NATIVE_DECIMALS)), "1");
        assert_eq!(format_native(2_500_000_000), "2.5");
        assert_eq!(format_native(1), "0.000000001");
    }

    #[test]
    fn entry_key_matching_ignores_case_and_whitespace() {
        let entry = GuessLogEntry {
            player: "0xABC".into(),
            guess: "apple".into(),
            similarity: 0.42,
            proximity: Proximity::Rank(120),
            submitted_at: Utc::now(),
        };
        assert!(entry.matches("0xabc", " Apple "));
        assert!(!entry.matches("0xABC", "apples"));
        assert!(!entry.matches("0xDEF", "apple"));
    }

    #[test]
    fn proximity_displays_rank_and_far() {
        assert_eq!(Proximity::Rank(120).to_string(), "120");
        assert_eq!(Proximity::Far.to_string(), "far");
    }
}
