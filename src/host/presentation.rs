//! Presentation seam
//!
//! Everything a viewer sees (ball entities, chat, action bar, particles,
//! teleports) leaves the core through [`Presentation`]. Calls are
//! fire-and-forget: implementations swallow their own failures.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::game::participant::ParticipantId;
use crate::game::team::Team;
use crate::util::vec3::Vec3;

/// Visual handle of a ball entity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallView {
    pub entity_id: u64,
    pub position: Vec3,
    pub item_model: u32,
    pub team: Option<Team>,
}

/// Fire-and-forget world effects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Bounce,
    /// Dust trail tinted by the ball's team (white for neutral)
    Trail(Option<Team>),
    Throw,
    Hit,
    Catch,
    Pickup,
}

/// Presentation collaborator
pub trait Presentation: Send + Sync {
    fn show_ball(&self, ball: &BallView, viewer: ParticipantId);
    fn hide_ball(&self, entity_id: u64, viewer: ParticipantId);
    fn move_ball(&self, ball: &BallView, viewers: &[ParticipantId]);
    fn teleport(&self, player: ParticipantId, location: Vec3);
    fn broadcast(&self, arena: &str, recipients: &[ParticipantId], message: &str);
    fn action_bar(&self, arena: &str, recipients: &[ParticipantId], message: &str);
    fn message(&self, player: ParticipantId, text: &str);
    fn play_effect(&self, location: Vec3, effect: Effect);
}

/// One presentation call, as queued by [`ChannelPresentation`]
#[derive(Debug, Clone, PartialEq)]
pub enum PresentationEvent {
    ShowBall {
        ball: BallView,
        viewer: ParticipantId,
    },
    HideBall {
        entity_id: u64,
        viewer: ParticipantId,
    },
    MoveBall {
        ball: BallView,
        viewers: Vec<ParticipantId>,
    },
    Teleport {
        player: ParticipantId,
        location: Vec3,
    },
    Broadcast {
        arena: String,
        recipients: Vec<ParticipantId>,
        message: String,
    },
    ActionBar {
        arena: String,
        recipients: Vec<ParticipantId>,
        message: String,
    },
    Message {
        player: ParticipantId,
        text: String,
    },
    Effect {
        location: Vec3,
        effect: Effect,
    },
}

/// Presentation that queues events onto a bounded channel
///
/// When the queue is full or the consumer is gone, the event is dropped
/// and counted. The tick never blocks on a slow consumer.
pub struct ChannelPresentation {
    sender: Sender<PresentationEvent>,
    dropped: AtomicU64,
}

impl ChannelPresentation {
    /// Create a presentation and the receiver that drains it
    pub fn new(capacity: usize) -> (Self, Receiver<PresentationEvent>) {
        let (sender, receiver) = bounded(capacity);
        (
            Self {
                sender,
                dropped: AtomicU64::new(0),
            },
            receiver,
        )
    }

    /// Events dropped because the queue was full or disconnected
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[inline]
    fn push(&self, event: PresentationEvent) {
        if let Err(e) = self.sender.try_send(event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            if let TrySendError::Disconnected(_) = e {
                tracing::trace!("Presentation consumer disconnected, event dropped");
            }
        }
    }
}

impl Presentation for ChannelPresentation {
    fn show_ball(&self, ball: &BallView, viewer: ParticipantId) {
        self.push(PresentationEvent::ShowBall { ball: *ball, viewer });
    }

    fn hide_ball(&self, entity_id: u64, viewer: ParticipantId) {
        self.push(PresentationEvent::HideBall { entity_id, viewer });
    }

    fn move_ball(&self, ball: &BallView, viewers: &[ParticipantId]) {
        self.push(PresentationEvent::MoveBall {
            ball: *ball,
            viewers: viewers.to_vec(),
        });
    }

    fn teleport(&self, player: ParticipantId, location: Vec3) {
        self.push(PresentationEvent::Teleport { player, location });
    }

    fn broadcast(&self, arena: &str, recipients: &[ParticipantId], message: &str) {
        self.push(PresentationEvent::Broadcast {
            arena: arena.to_string(),
            recipients: recipients.to_vec(),
            message: message.to_string(),
        });
    }

    fn action_bar(&self, arena: &str, recipients: &[ParticipantId], message: &str) {
        self.push(PresentationEvent::ActionBar {
            arena: arena.to_string(),
            recipients: recipients.to_vec(),
            message: message.to_string(),
        });
    }

    fn message(&self, player: ParticipantId, text: &str) {
        self.push(PresentationEvent::Message {
            player,
            text: text.to_string(),
        });
    }

    fn play_effect(&self, location: Vec3, effect: Effect) {
        self.push(PresentationEvent::Effect { location, effect });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_events_are_queued_in_order() {
        let (presentation, rx) = ChannelPresentation::new(8);
        let player = Uuid::new_v4();

        presentation.message(player, "hello");
        presentation.play_effect(Vec3::ZERO, Effect::Bounce);

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], PresentationEvent::Message { text, .. } if text == "hello"));
        assert!(matches!(events[1], PresentationEvent::Effect { effect: Effect::Bounce, .. }));
    }

    #[test]
    fn test_full_queue_drops() {
        let (presentation, rx) = ChannelPresentation::new(1);
        presentation.message(Uuid::new_v4(), "a");
        presentation.message(Uuid::new_v4(), "b");

        assert_eq!(rx.len(), 1);
        assert_eq!(presentation.dropped_count(), 1);
    }

    #[test]
    fn test_disconnected_consumer_is_tolerated() {
        let (presentation, rx) = ChannelPresentation::new(4);
        drop(rx);
        presentation.broadcast("arena", &[], "nobody listening");
        assert_eq!(presentation.dropped_count(), 1);
    }
}
