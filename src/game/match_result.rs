//! Match outcome rules and result summaries

use crate::game::constants::format_clock;
use crate::game::participant::{ParticipantId, ParticipantSnapshot};
use crate::game::team::{team_info, Team};

/// Decided result of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Winner(Team),
    Draw,
}

impl MatchOutcome {
    /// Headline broadcast when the match ends
    pub fn headline(&self) -> String {
        match self {
            MatchOutcome::Winner(team) => {
                format!("{} WINS!", team_info(*team).display_name.to_uppercase())
            }
            MatchOutcome::Draw => "DRAW!".to_string(),
        }
    }

    pub fn winner(&self) -> Option<Team> {
        match self {
            MatchOutcome::Winner(team) => Some(*team),
            MatchOutcome::Draw => None,
        }
    }
}

/// Elimination check while the match is running
///
/// `None` while both teams still have someone alive.
pub fn elimination_outcome(red_alive: usize, blue_alive: usize) -> Option<MatchOutcome> {
    match (red_alive, blue_alive) {
        (0, 0) => Some(MatchOutcome::Draw),
        (0, _) => Some(MatchOutcome::Winner(Team::Blue)),
        (_, 0) => Some(MatchOutcome::Winner(Team::Red)),
        _ => None,
    }
}

/// Decision when the countdown reaches zero
pub fn time_up_outcome(red_alive: usize, blue_alive: usize) -> MatchOutcome {
    use std::cmp::Ordering;
    match red_alive.cmp(&blue_alive) {
        Ordering::Greater => MatchOutcome::Winner(Team::Red),
        Ordering::Less => MatchOutcome::Winner(Team::Blue),
        Ordering::Equal => MatchOutcome::Draw,
    }
}

/// Per-participant line of the end-of-match summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchLine {
    pub id: ParticipantId,
    pub name: String,
    pub hits: u32,
    pub catches: u32,
    pub throws: u32,
}

impl MatchLine {
    pub fn from_snapshot(p: &ParticipantSnapshot) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            hits: p.successful_hits,
            catches: p.balls_caught,
            throws: p.balls_thrown,
        }
    }

    pub fn render(&self) -> String {
        format!(
            "{} - K: {} C: {} T: {}",
            self.name, self.hits, self.catches, self.throws
        )
    }
}

/// Summary of a finished match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSummary {
    pub arena: String,
    pub outcome: MatchOutcome,
    pub duration_ms: u64,
    pub lines: Vec<MatchLine>,
}

impl MatchSummary {
    /// Chat lines broadcast at match end, in order
    pub fn broadcast_lines(&self) -> Vec<String> {
        let mut lines = vec![
            self.outcome.headline(),
            format!("Duration: {}", format_clock(self.duration_ms / 1000)),
            "=== Match Statistics ===".to_string(),
        ];
        lines.extend(self.lines.iter().map(MatchLine::render));
        lines
    }
}
