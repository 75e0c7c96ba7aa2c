//! Update scheduler
//!
//! Decides when each entity's state is next pushed to clients. Entries live
//! in a min-heap keyed by due time and are never removed eagerly: when an
//! entity is rescheduled its old entries simply go stale. A popped entry only
//! counts if the entity itself is still due, which is what keeps stale
//! duplicates from producing a second broadcast.

use crate::registry::{Entity, Registry};
use log::debug;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};
use std::time::{Duration, Instant};

/// Cadence for entities that are moving or turning
pub const MOVING_INTERVAL: Duration = Duration::from_millis(500);
/// Cadence for entities at rest
pub const STATIONARY_INTERVAL: Duration = Duration::from_secs(5);

/// Heap entry; ties on `due` fall back to insertion order
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Scheduled {
    due: Instant,
    seq: u64,
    name: String,
}

#[derive(Debug)]
pub struct UpdateScheduler {
    queue: BinaryHeap<Reverse<Scheduled>>,
    next_seq: u64,
    moving_interval: Duration,
    stationary_interval: Duration,
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self::new(MOVING_INTERVAL, STATIONARY_INTERVAL)
    }
}

impl UpdateScheduler {
    pub fn new(moving_interval: Duration, stationary_interval: Duration) -> Self {
        Self {
            queue: BinaryHeap::new(),
            next_seq: 0,
            moving_interval,
            stationary_interval,
        }
    }

    /// Queues the entity at its current due time; duplicates are fine
    pub fn schedule_for_update(&mut self, entity: &Entity) {
        self.next_seq += 1;
        self.queue.push(Reverse(Scheduled {
            due: entity.update_due,
            seq: self.next_seq,
            name: entity.name.clone(),
        }));
    }

    /// Makes the entity due right away
    pub fn force_update(&mut self, entity: &mut Entity, now: Instant) {
        entity.update_due = now;
        self.schedule_for_update(entity);
    }

    /// Schedules the next routine update after a broadcast
    pub fn reschedule_update(&mut self, entity: &mut Entity, now: Instant) {
        entity.update_due = now + self.interval_for(entity);
        self.schedule_for_update(entity);
    }

    pub fn interval_for(&self, entity: &Entity) -> Duration {
        if entity.is_moving() {
            self.moving_interval
        } else {
            self.stationary_interval
        }
    }

    /// Pops every due entry and returns the entities to broadcast this tick
    ///
    /// Each returned entity has already been rescheduled. Entries for
    /// entities that were removed, or whose due time moved past `now`, are
    /// dropped without effect.
    pub fn collect_due(&mut self, registry: &mut Registry, now: Instant) -> BTreeSet<String> {
        let mut due = BTreeSet::new();

        while let Some(Reverse(top)) = self.queue.peek() {
            if top.due > now {
                break;
            }
            let Some(Reverse(entry)) = self.queue.pop() else {
                break;
            };

            match registry.get_mut(&entry.name) {
                Ok(entity) if entity.update_due <= now => {
                    self.reschedule_update(entity, now);
                    due.insert(entry.name);
                }
                _ => debug!("Discarding stale update entry for {}", entry.name),
            }
        }

        due
    }

    /// Queued entries, stale ones included
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::EntityKind;
    use shared::Vec3;

    fn setup() -> (Registry, UpdateScheduler, Instant) {
        (Registry::new(), UpdateScheduler::default(), Instant::now())
    }

    fn spawn(registry: &mut Registry, scheduler: &mut UpdateScheduler, now: Instant) -> String {
        let name = registry.register("NPC", EntityKind::Thing, now);
        scheduler.force_update(registry.get_mut(&name).unwrap(), now);
        name
    }

    #[test]
    fn test_force_update_is_broadcast_next_tick() {
        let (mut registry, mut scheduler, now) = setup();
        let name = spawn(&mut registry, &mut scheduler, now);

        let due = scheduler.collect_due(&mut registry, now);
        assert!(due.contains(&name));

        let later = now + Duration::from_secs(1);
        assert!(scheduler.collect_due(&mut registry, later).is_empty());

        scheduler.force_update(registry.get_mut(&name).unwrap(), later);
        assert!(scheduler.collect_due(&mut registry, later).contains(&name));
    }

    #[test]
    fn test_adaptive_cadence() {
        let (mut registry, mut scheduler, now) = setup();
        let resting = spawn(&mut registry, &mut scheduler, now);
        let moving = spawn(&mut registry, &mut scheduler, now);
        registry.get_mut(&moving).unwrap().velocity = Vec3::new(1.0, 0.0, 0.0);

        scheduler.collect_due(&mut registry, now);

        assert_eq!(
            registry.get(&resting).unwrap().update_due,
            now + STATIONARY_INTERVAL
        );
        assert_eq!(
            registry.get(&moving).unwrap().update_due,
            now + MOVING_INTERVAL
        );
    }

    #[test]
    fn test_turning_counts_as_moving() {
        let (mut registry, mut scheduler, now) = setup();
        let name = spawn(&mut registry, &mut scheduler, now);
        registry.get_mut(&name).unwrap().angular_velocity = -90.0;

        scheduler.collect_due(&mut registry, now);

        assert_eq!(
            registry.get(&name).unwrap().update_due,
            now + MOVING_INTERVAL
        );
    }

    #[test]
    fn test_stale_duplicates_broadcast_once() {
        let (mut registry, mut scheduler, now) = setup();
        let name = spawn(&mut registry, &mut scheduler, now);

        // Three more entries for the same entity, all due by `now`
        for _ in 0..3 {
            scheduler.force_update(registry.get_mut(&name).unwrap(), now);
        }
        assert_eq!(scheduler.len(), 4);

        let due = scheduler.collect_due(&mut registry, now);
        assert_eq!(due.len(), 1);

        // Only the reschedule entry remains
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_entries_for_removed_entities_are_discarded() {
        let (mut registry, mut scheduler, now) = setup();
        let name = spawn(&mut registry, &mut scheduler, now);
        registry.unregister(&name).unwrap();

        assert!(scheduler.collect_due(&mut registry, now).is_empty());
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_not_yet_due_stays_queued() {
        let (mut registry, mut scheduler, now) = setup();
        let name = spawn(&mut registry, &mut scheduler, now);
        scheduler.collect_due(&mut registry, now);

        let almost = now + STATIONARY_INTERVAL - Duration::from_millis(1);
        assert!(scheduler.collect_due(&mut registry, almost).is_empty());
        assert_eq!(scheduler.len(), 1);

        let due = scheduler.collect_due(&mut registry, now + STATIONARY_INTERVAL);
        assert!(due.contains(&name));
    }

    #[test]
    fn test_ties_pop_in_insertion_order() {
        let (mut registry, mut scheduler, now) = setup();
        let first = spawn(&mut registry, &mut scheduler, now);
        let second = spawn(&mut registry, &mut scheduler, now);

        let Reverse(top) = scheduler.queue.peek().unwrap();
        assert_eq!(top.name, first);
        assert_ne!(top.name, second);
    }
}
