//! Movement controls subscribed for every player on login

use crate::error::GameError;
use crate::relay::EventHandler;
use crate::session::Session;
use crate::world::World;
use shared::{EventArg, Vec3};
use std::time::Instant;

/// Forward speed for `w` / `s`
pub const WALK_SPEED: f64 = 75.0;
/// Sideways speed for `a` / `d`
pub const STRAFE_SPEED: f64 = 37.5;
/// Degrees per second for the arrow keys
pub const TURN_RATE: f64 = 90.0;

/// Event name, handler and preset argument for each binding
pub const BINDINGS: &[(&str, EventHandler, f64)] = &[
    ("w", forward, WALK_SPEED),
    ("w-up", forward, 0.0),
    ("s", forward, -WALK_SPEED),
    ("s-up", forward, 0.0),
    ("a", strafe, -STRAFE_SPEED),
    ("a-up", strafe, 0.0),
    ("d", strafe, STRAFE_SPEED),
    ("d-up", strafe, 0.0),
    ("arrow_left", turn, TURN_RATE),
    ("arrow_left-up", turn, 0.0),
    ("arrow_right", turn, -TURN_RATE),
    ("arrow_right-up", turn, 0.0),
];

/// Subscribes every movement binding on the session's client
pub fn bind_movement(session: &mut Session) -> Result<(), GameError> {
    for (event, handler, speed) in BINDINGS {
        session.accept(event, *handler, vec![EventArg::Float(*speed)])?;
    }
    Ok(())
}

fn speed_arg(args: &[EventArg]) -> Result<f32, GameError> {
    args.first()
        .and_then(EventArg::as_f32)
        .ok_or_else(|| GameError::BadArguments(format!("expected a speed, got {:?}", args)))
}

/// Sets forward speed, keeping any sideways component
pub fn forward(world: &mut World, entity: &str, args: &[EventArg], now: Instant) -> Result<(), GameError> {
    let speed = speed_arg(args)?;
    let current = world.entity(entity)?.velocity;
    world.set_velocity(entity, Vec3::new(current.x, speed, current.z), now)
}

/// Sets sideways speed, keeping any forward component
pub fn strafe(world: &mut World, entity: &str, args: &[EventArg], now: Instant) -> Result<(), GameError> {
    let speed = speed_arg(args)?;
    let current = world.entity(entity)?.velocity;
    world.set_velocity(entity, Vec3::new(speed, current.y, current.z), now)
}

pub fn turn(world: &mut World, entity: &str, args: &[EventArg], now: Instant) -> Result<(), GameError> {
    let rate = speed_arg(args)?;
    world.set_angular_velocity(entity, rate, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionId;

    fn setup() -> (World, String, Instant) {
        let mut world = World::default();
        let now = Instant::now();
        let player = world.spawn_player(SessionId(1), now);
        (world, player, now)
    }

    #[test]
    fn test_walk_and_strafe_combine() {
        let (mut world, player, now) = setup();

        forward(&mut world, &player, &[EventArg::Float(WALK_SPEED)], now).unwrap();
        strafe(&mut world, &player, &[EventArg::Float(-STRAFE_SPEED)], now).unwrap();
        assert_eq!(
            world.entity(&player).unwrap().velocity,
            Vec3::new(-37.5, 75.0, 0.0)
        );

        forward(&mut world, &player, &[EventArg::Float(0.0)], now).unwrap();
        assert_eq!(
            world.entity(&player).unwrap().velocity,
            Vec3::new(-37.5, 0.0, 0.0)
        );
    }

    #[test]
    fn test_turn() {
        let (mut world, player, now) = setup();

        turn(&mut world, &player, &[EventArg::Float(TURN_RATE)], now).unwrap();
        assert_eq!(world.entity(&player).unwrap().angular_velocity, 90.0);

        turn(&mut world, &player, &[EventArg::Float(0.0)], now).unwrap();
        assert!(!world.entity(&player).unwrap().is_moving());
    }

    #[test]
    fn test_missing_speed_is_rejected() {
        let (mut world, player, now) = setup();

        let result = forward(&mut world, &player, &[EventArg::Text("fast".to_string())], now);
        assert!(matches!(result, Err(GameError::BadArguments(_))));
    }

    #[test]
    fn test_every_key_has_a_release() {
        for (event, _, _) in BINDINGS.iter().filter(|(event, _, _)| !event.ends_with("-up")) {
            let release = format!("{}-up", event);
            assert!(
                BINDINGS.iter().any(|(name, _, _)| *name == release),
                "No release binding for {}",
                event
            );
        }
    }
}
