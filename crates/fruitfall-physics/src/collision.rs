//! Pairwise circle contact resolution and merge eligibility.

use std::f32::consts::TAU;

use glam::Vec2;
use rand::Rng;

use crate::catalog::FruitCatalog;
use crate::fruit::{Fruit, FruitId};
use crate::params::PhysicsParams;

/// Resolve overlap between `a` and `b`. Returns `false` when they do not touch.
///
/// Each fruit is pushed out along the contact normal by
/// `separation_factor * overlap`. Coincident centers have no normal, so a
/// random direction stands in for it and the push uses the combined radius.
pub fn resolve_pair<R: Rng + ?Sized>(
    a: &mut Fruit,
    b: &mut Fruit,
    params: &PhysicsParams,
    rng: &mut R,
) -> bool {
    let delta = b.position - a.position;
    let distance = delta.length();
    let min_distance = a.radius + b.radius;
    if distance >= min_distance {
        return false;
    }

    let (normal, push) = if distance > 0.0 {
        let normal = delta / distance;
        (normal, (min_distance - distance) * params.separation_factor)
    } else {
        let normal = Vec2::from_angle(rng.random_range(0.0..TAU));
        (normal, min_distance * params.separation_factor)
    };
    a.position -= normal * push;
    b.position += normal * push;

    let closing = (b.velocity - a.velocity).dot(normal);
    if closing <= 0.0 {
        if closing.abs() >= params.resting_contact_speed {
            let impulse = -(1.0 + params.contact_restitution) * closing / 2.0;
            a.velocity = (a.velocity - normal * impulse) * params.contact_damping;
            b.velocity = (b.velocity + normal * impulse) * params.contact_damping;
        } else {
            a.velocity *= params.resting_damping;
            b.velocity *= params.resting_damping;
        }
    }

    true
}

/// Same tier, below the top tier, and neither already merged this tick.
pub fn can_merge(a: &Fruit, b: &Fruit) -> bool {
    a.tier == b.tier
        && !a.merged
        && !b.merged
        && FruitCatalog::merge_target(a.tier).is_some()
}

/// Build the fruit that replaces `a` and `b`. Returns `None` if they cannot merge.
pub fn merged_fruit(id: FruitId, a: &Fruit, b: &Fruit, params: &PhysicsParams) -> Option<Fruit> {
    if a.tier != b.tier {
        return None;
    }
    let tier = FruitCatalog::merge_target(a.tier)?;
    let mut fruit = Fruit::new(id, tier, (a.position + b.position) * 0.5)?;
    fruit.velocity = (a.velocity + b.velocity) * params.merge_velocity_factor;
    Some(fruit)
}
