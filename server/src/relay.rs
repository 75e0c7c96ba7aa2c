//! Event subscription relay
//!
//! Server code subscribes to input events raised on one client. Each
//! subscription gets a fresh tag from a per-connection counter; the client
//! reports occurrences by tag and the relay calls the stored handler with the
//! preset arguments followed by whatever the client sent along.

use crate::error::GameError;
use crate::world::World;
use log::debug;
use shared::messages::EventListen;
use shared::EventArg;
use std::collections::HashMap;
use std::time::Instant;

/// Handler for a relayed event, run against the subscribing player's entity
pub type EventHandler = fn(&mut World, &str, &[EventArg], Instant) -> Result<(), GameError>;

struct Subscription {
    event: String,
    handler: EventHandler,
    preset: Vec<EventArg>,
}

#[derive(Default)]
pub struct EventRelay {
    subscriptions: HashMap<u32, Subscription>,
    last_tag: u32,
}

impl EventRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a subscription and returns the request to send to the client
    pub fn accept(&mut self, event: &str, handler: EventHandler, preset: Vec<EventArg>) -> EventListen {
        self.last_tag += 1;
        let tag = self.last_tag;

        self.subscriptions.insert(
            tag,
            Subscription {
                event: event.to_string(),
                handler,
                preset,
            },
        );

        EventListen {
            event: event.to_string(),
            tag,
        }
    }

    /// Runs the handler subscribed under `tag`
    ///
    /// Returns `Ok(false)` when nothing is subscribed under the tag.
    pub fn fire(
        &self,
        tag: u32,
        args: &[EventArg],
        world: &mut World,
        entity: &str,
        now: Instant,
    ) -> Result<bool, GameError> {
        let Some(subscription) = self.subscriptions.get(&tag) else {
            debug!("Ignoring event for unknown tag {}", tag);
            return Ok(false);
        };

        let mut full_args = subscription.preset.clone();
        full_args.extend_from_slice(args);

        debug!("Relaying {} (tag {}) to {}", subscription.event, tag, entity);
        (subscription.handler)(world, entity, &full_args, now)?;
        Ok(true)
    }

    /// Drops every subscription; tags keep counting up
    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}
