//! Demo component schemas, systems and entities.
//!
//! Four entities sit on a grid; `adjacent_entities` reports pairs whose
//! Manhattan distance is at most 1, `collisions` dispatches the
//! `colliderCircle` capability between every pair of circle colliders, and
//! `all_entities` reports every live entity each tick.

use lattice_component::{ComponentData, ComponentDefinition, Id};
use lattice_world::{Entity, SystemContext, World, WorldError};
use serde_json::{Value, json};
use tracing::info;

/// Grid positions of the demo entities.
pub const POSITIONS: [(i64, i64); 4] = [(32, 22), (33, 22), (34, 22), (35, 23)];

/// The demo's component schemas.
#[must_use]
pub fn components() -> Vec<ComponentDefinition> {
    vec![
        ComponentDefinition::new(
            "transform",
            json!({"position": {"x": 0, "y": 0}, "scale": 1, "rotation": 0}),
        ),
        ComponentDefinition::new("health", json!({"value": 100})),
        ComponentDefinition::new("collision", json!({"entities": []})),
        ComponentDefinition::new(
            "colliderCircle",
            json!({"radius": 1, "offset": {"x": 0, "y": 0}}),
        )
        .with_method("isColliding", circle_is_colliding),
    ]
}

/// `colliderCircle.isColliding(selfTransform, otherCollider, otherTransform)`.
///
/// Circles are offset and scaled by their transforms. Colliders of any other
/// type never collide with a circle.
fn circle_is_colliding(this: &ComponentData, args: &[&ComponentData]) -> Value {
    let [own_transform, other, other_transform] = args else {
        return Value::Bool(false);
    };
    if other.type_name() != "colliderCircle" {
        return Value::Bool(false);
    }
    let (x, y, r) = circle(this, own_transform);
    let (ox, oy, or) = circle(other, other_transform);
    Value::Bool((x - ox).powi(2) + (y - oy).powi(2) <= (r + or).powi(2))
}

fn circle(collider: &ComponentData, transform: &ComponentData) -> (f64, f64, f64) {
    let num = |data: &ComponentData, pointer: &str, fallback: f64| {
        data.pointer(pointer)
            .and_then(Value::as_f64)
            .unwrap_or(fallback)
    };
    let scale = num(transform, "/scale", 1.0);
    (
        num(transform, "/position/x", 0.0) + num(collider, "/offset/x", 0.0) * scale,
        num(transform, "/position/y", 0.0) + num(collider, "/offset/y", 0.0) * scale,
        num(collider, "/radius", 1.0) * scale,
    )
}

fn position(ctx: &SystemContext<'_>, entity: Entity) -> Option<(Id, f64, f64)> {
    let view = ctx.entity(entity)?;
    let transform = view.get("transform")?;
    Some((
        view.id().clone(),
        transform.pointer("/position/x")?.as_f64()?,
        transform.pointer("/position/y")?.as_f64()?,
    ))
}

/// Log every pair of entities whose Manhattan distance is at most 1.
pub fn adjacent_entities(ctx: &mut SystemContext<'_>) {
    let ctx: &SystemContext<'_> = ctx;
    let placed: Vec<_> = ctx
        .entities()
        .iter()
        .filter_map(|&e| position(ctx, e))
        .collect();
    for (i, (id, x, y)) in placed.iter().enumerate() {
        for (other, ox, oy) in &placed[i + 1..] {
            if (x - ox).abs() + (y - oy).abs() <= 1.0 {
                info!(
                    a = %id,
                    b = %other,
                    a_pos = ?(x, y),
                    b_pos = ?(ox, oy),
                    "entities are neighbors"
                );
            }
        }
    }
}

/// Log every pair of entities whose circle colliders overlap.
pub fn collisions(ctx: &mut SystemContext<'_>) {
    let world = ctx.world();
    let bodies: Vec<_> = ctx
        .iter()
        .filter_map(|view| {
            Some((
                view.id().clone(),
                view.get("transform")?.data(),
                view.get("colliderCircle")?.data(),
            ))
        })
        .collect();
    for (i, (id, transform, collider)) in bodies.iter().enumerate() {
        for (other, other_transform, other_collider) in &bodies[i + 1..] {
            let hit = world.invoke(
                collider,
                "isColliding",
                &[*transform, *other_collider, *other_transform],
            );
            if matches!(hit, Ok(Value::Bool(true))) {
                info!(a = %id, b = %other, "colliders overlap");
            }
        }
    }
}

/// Log every live entity.
pub fn all_entities(ctx: &mut SystemContext<'_>) {
    for view in ctx.iter() {
        info!(entity = %view.id(), time = ctx.time, "entity exists");
    }
}

/// Register the demo queries and systems, then create the demo entities.
///
/// # Errors
///
/// Fails if the demo schemas are missing or a name is already taken.
pub fn populate(world: &mut World) -> Result<Vec<Entity>, WorldError> {
    let placed = world.register_query("transform", ["transform"])?;
    let bodies = world.register_query("bodies", ["transform", "colliderCircle"])?;
    let global = world.queries().global();

    world.register_system("adjacent_entities", placed, adjacent_entities)?;
    world.register_system("collisions", bodies, collisions)?;
    world.register_system("all_entities", global, all_entities)?;

    let mut entities = Vec::with_capacity(POSITIONS.len());
    for (i, (x, y)) in POSITIONS.into_iter().enumerate() {
        let mut components = vec![world.instantiate(
            "transform",
            Some(json!({"position": {"x": x, "y": y}})),
        )?];
        // The first two entities carry colliders.
        if i < 2 {
            components.push(world.instantiate("colliderCircle", Some(json!({"radius": 0.5})))?);
        }
        entities.push(world.create_entity(components)?.entity());
    }
    info!(entities = entities.len(), "demo populated");
    Ok(entities)
}
