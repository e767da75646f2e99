//! Collaborators supplied by the hosting world
//!
//! The core never talks to a renderer, disk, world geometry or timer
//! directly; it goes through the traits in these modules, bundled in a
//! [`Context`] handed to every component.

pub mod clock;
pub mod environment;
pub mod persistence;
pub mod presentation;

use std::sync::Arc;

use clock::Clock;
use environment::Environment;
use persistence::Persistence;
use presentation::Presentation;

/// Shared collaborator bundle
#[derive(Clone)]
pub struct Context {
    pub presentation: Arc<dyn Presentation>,
    pub persistence: Arc<dyn Persistence>,
    pub environment: Arc<dyn Environment>,
    pub clock: Arc<dyn Clock>,
}

impl Context {
    pub fn new(
        presentation: Arc<dyn Presentation>,
        persistence: Arc<dyn Persistence>,
        environment: Arc<dyn Environment>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            presentation,
            persistence,
            environment,
            clock,
        }
    }
}
