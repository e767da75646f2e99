//! Dodgeball Arena Server Library
//!
//! Multi-arena dodgeball minigame core: arena lifecycle, ball physics with
//! hit / catch / pickup resolution, and match timing. The hosting world is
//! reached only through the collaborators in [`host`].

pub mod arena;
pub mod config;
pub mod game;
pub mod host;
pub mod metrics;
pub mod server;
pub mod util;
