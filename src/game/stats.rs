//! Persistent per-player statistic counters
//!
//! Loaded when a player enters an arena and saved when they leave or a
//! match ends. Stored by the persistence adapter; the core only mutates
//! the counters.

use serde::{Deserialize, Serialize};

/// Lifetime counters for one player
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerStats {
    pub kills: u32,
    pub deaths: u32,
    pub catches: u32,
    pub wins: u32,
    pub losses: u32,
    pub throws: u32,
    pub games_played: u32,
    /// Total time spent in matches, in milliseconds
    pub playtime_ms: u64,
}

impl PlayerStats {
    pub fn record_win(&mut self) {
        self.wins += 1;
        self.games_played += 1;
    }

    pub fn record_loss(&mut self) {
        self.losses += 1;
        self.games_played += 1;
    }

    pub fn add_playtime(&mut self, millis: u64) {
        self.playtime_ms = self.playtime_ms.saturating_add(millis);
    }

    /// Kills per death; the raw kill count when there are no deaths
    pub fn kd_ratio(&self) -> f64 {
        if self.deaths == 0 {
            self.kills as f64
        } else {
            self.kills as f64 / self.deaths as f64
        }
    }

    /// Percentage of decided games won
    pub fn win_rate(&self) -> f64 {
        if self.games_played == 0 {
            0.0
        } else {
            self.wins as f64 / self.games_played as f64 * 100.0
        }
    }
}
