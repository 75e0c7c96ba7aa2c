//! Per-client visibility sync
//!
//! Every tick each logged in session diffs the world against the set of
//! entities it has already announced. Removals and additions always go out
//! before any state update so a client never hears about an entity it has
//! not been told exists.

use crate::world::World;
use log::debug;
use shared::messages::RemoveObject;
use shared::Message;
use std::collections::BTreeSet;

/// Names of the entities one client has been told exist
pub type KnownEntities = BTreeSet<String>;

/// Computes the messages that bring one client up to date
///
/// `due` is the tick's global broadcast set. Newly visible entities always
/// get a full state push, known ones only when they are due.
pub fn visibility_diff(
    known: &mut KnownEntities,
    world: &World,
    due: &BTreeSet<String>,
) -> Vec<Message> {
    let candidates = world.list_all();
    let mut messages = Vec::new();

    let to_remove: Vec<String> = known.difference(&candidates).cloned().collect();
    for name in to_remove {
        known.remove(&name);
        messages.push(RemoveObject { tag: name }.into());
    }

    let to_add: Vec<String> = candidates.difference(known).cloned().collect();
    for name in &to_add {
        match world.add_object(name) {
            Ok(add) => {
                known.insert(name.clone());
                messages.push(add.into());
            }
            Err(e) => debug!("Skipping add for {}: {}", name, e),
        }
    }

    let refresh: BTreeSet<&String> = to_add.iter().chain(due.iter()).collect();
    for name in refresh {
        if !known.contains(name) {
            continue;
        }
        match world.thing_state(name) {
            Ok(state) => messages.push(state.into()),
            Err(e) => debug!("Skipping state for {}: {}", name, e),
        }
    }

    messages
}
