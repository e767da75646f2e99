//! Teams and play modes
//!
//! The variants carry no behavior; display attributes live in the lookup
//! tables below.

use serde::{Deserialize, Serialize};

/// Team a participant plays for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    Red,
    Blue,
    Spectator,
}

/// Display attributes of a team
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamInfo {
    pub display_name: &'static str,
}

const RED_INFO: TeamInfo = TeamInfo {
    display_name: "Red Team",
};

const BLUE_INFO: TeamInfo = TeamInfo {
    display_name: "Blue Team",
};

const SPECTATOR_INFO: TeamInfo = TeamInfo {
    display_name: "Spectators",
};

/// Look up display attributes for a team
pub fn team_info(team: Team) -> &'static TeamInfo {
    match team {
        Team::Red => &RED_INFO,
        Team::Blue => &BLUE_INFO,
        Team::Spectator => &SPECTATOR_INFO,
    }
}

/// Game mode tag stored with an arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayMode {
    #[default]
    Classic,
    Elimination,
    Infection,
    KingOfTheHill,
    CaptureTheFlag,
}

/// Display attributes of a play mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayModeInfo {
    pub display_name: &'static str,
    pub description: &'static str,
}

/// Look up display attributes for a play mode
pub fn play_mode_info(mode: PlayMode) -> PlayModeInfo {
    let (display_name, description) = match mode {
        PlayMode::Classic => ("Classic", "Last team standing wins"),
        PlayMode::Elimination => ("Elimination", "Eliminated players don't respawn"),
        PlayMode::Infection => ("Infection", "Hit players join the other team"),
        PlayMode::KingOfTheHill => ("King of the Hill", "Control the center area"),
        PlayMode::CaptureTheFlag => ("Capture the Flag", "Capture enemy's flag"),
    };
    PlayModeInfo {
        display_name,
        description,
    }
}
