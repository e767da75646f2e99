//! Arena settings, named locations and the persisted arena definition

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::game::constants::arena::*;
use crate::game::team::PlayMode;
use crate::util::vec3::Vec3;

/// Per-arena gameplay settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaSettings {
    pub powerups_enabled: bool,
    pub respawn_enabled: bool,
    pub ball_damage: u32,
    /// Launch speed of thrown balls (units per tick)
    pub ball_speed: f64,
    /// Match length in seconds
    pub game_duration_secs: u32,
    /// Visual model id carried by spawned balls
    pub ball_model: u32,
}

impl Default for ArenaSettings {
    fn default() -> Self {
        Self {
            powerups_enabled: true,
            respawn_enabled: false,
            ball_damage: DEFAULT_BALL_DAMAGE,
            ball_speed: DEFAULT_BALL_SPEED,
            game_duration_secs: DEFAULT_DURATION_SECS,
            ball_model: DEFAULT_BALL_MODEL,
        }
    }
}

/// Named arena locations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationKey {
    Lobby,
    Center,
    Team1Spawn,
    Team2Spawn,
    Spectator,
    MinBound,
    MaxBound,
}

impl LocationKey {
    pub const ALL: [LocationKey; 7] = [
        LocationKey::Lobby,
        LocationKey::Center,
        LocationKey::Team1Spawn,
        LocationKey::Team2Spawn,
        LocationKey::Spectator,
        LocationKey::MinBound,
        LocationKey::MaxBound,
    ];

    /// Locations an arena needs before it counts as set up
    pub const REQUIRED: [LocationKey; 6] = [
        LocationKey::Lobby,
        LocationKey::Center,
        LocationKey::Team1Spawn,
        LocationKey::Team2Spawn,
        LocationKey::MinBound,
        LocationKey::MaxBound,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LocationKey::Lobby => "LOBBY",
            LocationKey::Center => "CENTER",
            LocationKey::Team1Spawn => "TEAM1_SPAWN",
            LocationKey::Team2Spawn => "TEAM2_SPAWN",
            LocationKey::Spectator => "SPECTATOR",
            LocationKey::MinBound => "MIN_BOUND",
            LocationKey::MaxBound => "MAX_BOUND",
        }
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocationKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        LocationKey::ALL
            .iter()
            .find(|key| key.as_str() == upper)
            .copied()
            .ok_or_else(|| format!("Unknown location '{}'", s))
    }
}

/// Everything needed to recreate an arena
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaDefinition {
    pub id: String,
    pub name: String,
    #[serde(default = "default_min_players")]
    pub min_players: usize,
    #[serde(default = "default_max_players")]
    pub max_players: usize,
    #[serde(default)]
    pub mode: PlayMode,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub locations: BTreeMap<LocationKey, Vec3>,
    #[serde(default)]
    pub settings: ArenaSettings,
}

fn default_min_players() -> usize {
    DEFAULT_MIN_PLAYERS
}

fn default_max_players() -> usize {
    DEFAULT_MAX_PLAYERS
}

fn default_enabled() -> bool {
    true
}

impl ArenaDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            min_players: DEFAULT_MIN_PLAYERS,
            max_players: DEFAULT_MAX_PLAYERS,
            mode: PlayMode::default(),
            enabled: true,
            locations: BTreeMap::new(),
            settings: ArenaSettings::default(),
        }
    }

    pub fn with_capacity(mut self, min_players: usize, max_players: usize) -> Self {
        self.min_players = min_players;
        self.max_players = max_players;
        self
    }

    pub fn with_location(mut self, key: LocationKey, position: Vec3) -> Self {
        self.locations.insert(key, position);
        self
    }

    /// Check capacity bounds and id charset
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty()
            || !self
                .id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(format!(
                "Arena id '{}' must be non-empty and use only [A-Za-z0-9_-]",
                self.id
            ));
        }
        if self.min_players == 0 {
            return Err("min_players must be at least 1".to_string());
        }
        if self.max_players < self.min_players {
            return Err(format!(
                "max_players ({}) must be >= min_players ({})",
                self.max_players, self.min_players
            ));
        }
        if !self.settings.ball_speed.is_finite() || self.settings.ball_speed <= 0.0 {
            return Err("ball_speed must be a positive number".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = ArenaSettings::default();
        assert!(settings.powerups_enabled);
        assert!(!settings.respawn_enabled);
        assert_eq!(settings.ball_damage, 4);
        assert_eq!(settings.ball_speed, 1.5);
        assert_eq!(settings.game_duration_secs, 300);
    }

    #[test]
    fn test_location_key_parse() {
        assert_eq!("team1_spawn".parse::<LocationKey>(), Ok(LocationKey::Team1Spawn));
        assert_eq!("MAX_BOUND".parse::<LocationKey>(), Ok(LocationKey::MaxBound));
        assert!("roof".parse::<LocationKey>().is_err());
    }

    #[test]
    fn test_location_key_serde_matches_display() {
        for key in LocationKey::ALL {
            let json = serde_json::to_string(&key).unwrap();
            assert_eq!(json, format!("\"{}\"", key));
        }
    }

    #[test]
    fn test_definition_json_defaults() {
        let def: ArenaDefinition =
            serde_json::from_str(r#"{"id": "court", "name": "Court"}"#).unwrap();
        assert_eq!(def.min_players, 2);
        assert_eq!(def.max_players, 10);
        assert_eq!(def.mode, PlayMode::Classic);
        assert!(def.enabled);
        assert!(def.locations.is_empty());
    }

    #[test]
    fn test_definition_locations_as_named_map() {
        let def = ArenaDefinition::new("court", "Court")
            .with_location(LocationKey::Center, Vec3::new(0.0, 65.0, 0.0));
        let json = serde_json::to_string(&def).unwrap();
        assert!(json.contains("\"CENTER\""));

        let back: ArenaDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, def);
    }

    #[test]
    fn test_validate() {
        assert!(ArenaDefinition::new("ok_1", "Ok").validate().is_ok());
        assert!(ArenaDefinition::new("../etc", "Bad").validate().is_err());
        assert!(ArenaDefinition::new("a", "A").with_capacity(4, 2).validate().is_err());
        assert!(ArenaDefinition::new("a", "A").with_capacity(0, 2).validate().is_err());
    }
}
