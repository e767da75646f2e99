pub mod ball;
pub mod ball_engine;
pub mod constants;
pub mod lifecycle;
pub mod match_result;
pub mod participant;
pub mod stats;
pub mod systems;
pub mod team;
