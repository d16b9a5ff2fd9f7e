//! Weapon fire and projectile flight.
//!
//! Phase four of a tick. Projectiles already in the air advance first,
//! then every ready weapon in range fires. A projectile resolves at most
//! once: it is removed from flight in the same step that applies its
//! direct hit, and splash is layered on top as a separate, weaker call.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::combat::{calculate_damage, ArmorClass, DamageType, Delivery};
use crate::components::TeamId;
use crate::entity::{Entity, EntityId};
use crate::math::{fixed_serde, ratio, segment_hits_circle, segment_hits_rect, Fixed, Vec2Fixed};
use crate::simulation::SimulationContext;
use crate::targeting::{order_aim, target_info, TargetShape};

/// Flight model of a projectile in the air.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flight {
    /// Straight line at a fixed velocity.
    Missile {
        /// Displacement per tick.
        velocity: Vec2Fixed,
        /// Ticks before expiry.
        max_ticks: u32,
    },
    /// Interpolated from launch to a tracked impact point.
    Shell {
        /// Launch point.
        origin: Vec2Fixed,
        /// Ticks from launch to impact.
        flight_ticks: u32,
    },
}

/// A missile or shell in the air.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Projectile {
    /// Per-simulation projectile number.
    pub id: u32,
    /// Shooter. May be dead by the time it lands.
    pub source: EntityId,
    /// Shooter's team, for splash filtering.
    pub team: TeamId,
    /// Intended target; `None` for ground shots.
    pub target: Option<EntityId>,
    /// Current position.
    pub position: Vec2Fixed,
    /// Last known target position, or the ground point.
    pub aim: Vec2Fixed,
    /// Flight model.
    pub flight: Flight,
    /// Base damage.
    pub damage: u32,
    /// Damage type.
    pub damage_type: DamageType,
    /// Splash radius.
    #[serde(with = "fixed_serde")]
    pub splash_radius: Fixed,
    /// Ticks in flight.
    pub age: u32,
}

/// Direct or secondary damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HitKind {
    /// The projectile or beam struck this entity.
    Direct,
    /// Caught in the blast.
    Splash,
}

/// Combat events emitted during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombatEvent {
    /// A weapon fired (tracer, muzzle flash, launch).
    ShotFired {
        /// Shooter.
        shooter: EntityId,
        /// Target entity, if any.
        target: Option<EntityId>,
        /// Muzzle position.
        from: Vec2Fixed,
        /// Aim position.
        to: Vec2Fixed,
        /// Delivery model.
        delivery: Delivery,
        /// Spawned projectile for missiles and shells.
        projectile: Option<u32>,
    },
    /// Damage was applied.
    DamageDealt {
        /// Entity that fired.
        source: EntityId,
        /// Entity damaged.
        target: EntityId,
        /// Hit points removed.
        amount: u32,
        /// Direct or splash.
        kind: HitKind,
        /// Projectile responsible; `None` for hitscan.
        projectile: Option<u32>,
    },
    /// A projectile left flight without striking anything.
    ProjectileExpired {
        /// Projectile number.
        projectile: u32,
        /// Whether it burst near its aim point.
        detonated: bool,
    },
}

/// Something a projectile or beam can strike.
#[derive(Debug, Clone, Copy)]
struct Body {
    id: EntityId,
    team: TeamId,
    shape: TargetShape,
}

/// Live, damageable entities in processing order.
fn bodies(ctx: &SimulationContext) -> Vec<Body> {
    ctx.entities
        .iter()
        .filter_map(|(id, entity)| match entity {
            Entity::Agent(a) if !a.health.is_dead() => Some(Body {
                id,
                team: a.team,
                shape: TargetShape::Circle {
                    center: a.position,
                    radius: a.radius,
                },
            }),
            Entity::Structure(s) if s.attackable && !s.health.is_dead() => Some(Body {
                id,
                team: s.team,
                shape: TargetShape::Rect(s.rect(&ctx.nav)),
            }),
            _ => None,
        })
        .collect()
}

fn swept_hit(shape: TargetShape, from: Vec2Fixed, to: Vec2Fixed) -> bool {
    match shape {
        TargetShape::Circle { center, radius } => segment_hits_circle(from, to, center, radius),
        TargetShape::Rect(rect) => segment_hits_rect(from, to, rect),
        TargetShape::Point(_) => false,
    }
}

/// Phase four: advance projectiles, then fire ready weapons.
pub fn weapons_phase(ctx: &mut SimulationContext, events: &mut Vec<CombatEvent>) {
    advance_projectiles(ctx, events);
    fire_weapons(ctx, events);
}

// ============================================================================
// Firing
// ============================================================================

fn fire_weapons(ctx: &mut SimulationContext, events: &mut Vec<CombatEvent>) {
    for id in ctx.entities.agent_ids() {
        let Some(agent) = ctx.entities.agent_mut(id) else {
            continue;
        };
        if agent.health.is_dead() {
            continue;
        }
        agent.cooldown = agent.cooldown.saturating_sub(1);
        if agent.cooldown > 0 || !agent.order.is_combat() {
            continue;
        }
        let Some(weapon) = agent.weapon().copied() else {
            continue;
        };
        let (from, team, order) = (agent.position, agent.team, agent.order);

        let Some((info, shape)) = order_aim(ctx, &order) else {
            continue;
        };
        if shape.edge_distance(from) > weapon.range {
            continue;
        }
        let to = shape.center();
        let target = info.map(|i| i.id);

        if let Some(agent) = ctx.entities.agent_mut(id) {
            agent.cooldown = weapon.cooldown_ticks;
            agent.just_fired = true;
            let dir = (to - from).normalize();
            if !dir.is_zero() {
                agent.facing = dir;
            }
        }

        let projectile = match weapon.delivery {
            Delivery::Hitscan => None,
            Delivery::Missile { speed, max_ticks } => Some(Flight::Missile {
                velocity: (to - from).normalize().scale(speed),
                max_ticks,
            }),
            Delivery::Shell { flight_ticks } => Some(Flight::Shell {
                origin: from,
                flight_ticks: flight_ticks.max(1),
            }),
        }
        .map(|flight| {
            let number = ctx.next_projectile_id;
            ctx.next_projectile_id = ctx.next_projectile_id.wrapping_add(1);
            ctx.projectiles.push(Projectile {
                id: number,
                source: id,
                team,
                target,
                position: from,
                aim: to,
                flight,
                damage: weapon.damage,
                damage_type: weapon.damage_type,
                splash_radius: weapon.splash_radius,
                age: 0,
            });
            number
        });

        trace!(shooter = %id, target = ?target, delivery = ?weapon.delivery, "Fired");
        events.push(CombatEvent::ShotFired {
            shooter: id,
            target,
            from,
            to,
            delivery: weapon.delivery,
            projectile,
        });

        if projectile.is_none() {
            let hit = Impact {
                source: id,
                team,
                damage: weapon.damage,
                damage_type: weapon.damage_type,
                splash_radius: weapon.splash_radius,
                projectile: None,
            };
            if let Some(target) = target {
                hit.direct(ctx, target, events);
            }
            hit.splash(ctx, to, target, events);
        }
    }
}

// ============================================================================
// Flight
// ============================================================================

fn advance_projectiles(ctx: &mut SimulationContext, events: &mut Vec<CombatEvent>) {
    let in_flight = std::mem::take(&mut ctx.projectiles);
    let mut still_flying = Vec::with_capacity(in_flight.len());

    for mut projectile in in_flight {
        let tracked = projectile
            .target
            .and_then(|t| target_info(ctx, t));
        if let Some(info) = tracked {
            projectile.aim = info.shape.center();
        }
        projectile.age += 1;

        let resolved = match projectile.flight {
            Flight::Missile {
                velocity,
                max_ticks,
            } => step_missile(ctx, &mut projectile, velocity, max_ticks, events),
            Flight::Shell {
                origin,
                flight_ticks,
            } => step_shell(ctx, &mut projectile, origin, flight_ticks, tracked.is_some(), events),
        };
        if !resolved {
            still_flying.push(projectile);
        }
    }

    // Shots fired this tick are appended after the survivors.
    still_flying.append(&mut ctx.projectiles);
    ctx.projectiles = still_flying;
}

/// Returns whether the missile left flight.
fn step_missile(
    ctx: &mut SimulationContext,
    projectile: &mut Projectile,
    velocity: Vec2Fixed,
    max_ticks: u32,
    events: &mut Vec<CombatEvent>,
) -> bool {
    let from = projectile.position;
    let to = from + velocity;
    projectile.position = to;
    let hit = Impact::of(projectile);

    let candidates = bodies(ctx);
    let struck = projectile
        .target
        .and_then(|t| candidates.iter().find(|b| b.id == t))
        .filter(|b| swept_hit(b.shape, from, to))
        .or_else(|| {
            candidates.iter().find(|b| {
                b.team != projectile.team
                    && Some(b.id) != projectile.target
                    && swept_hit(b.shape, from, to)
            })
        })
        .copied();

    if let Some(body) = struck {
        debug!(projectile = projectile.id, target = %body.id, "Missile hit");
        let at = match body.shape {
            TargetShape::Rect(rect) => rect.closest_point(to),
            shape => shape.center(),
        };
        hit.direct(ctx, body.id, events);
        hit.splash(ctx, at, Some(body.id), events);
        return true;
    }

    if projectile.age >= max_ticks {
        let detonated = to.distance(projectile.aim) <= ctx.config.missile_expiry_radius;
        if detonated {
            hit.splash(ctx, to, None, events);
        }
        trace!(projectile = projectile.id, detonated, "Missile expired");
        events.push(CombatEvent::ProjectileExpired {
            projectile: projectile.id,
            detonated,
        });
        return true;
    }
    false
}

/// Returns whether the shell landed.
fn step_shell(
    ctx: &mut SimulationContext,
    projectile: &mut Projectile,
    origin: Vec2Fixed,
    flight_ticks: u32,
    target_alive: bool,
    events: &mut Vec<CombatEvent>,
) -> bool {
    let t = ratio(projectile.age.min(flight_ticks) as i32, flight_ticks as i32);
    projectile.position = origin.lerp(projectile.aim, t);
    if projectile.age < flight_ticks {
        return false;
    }

    let hit = Impact::of(projectile);
    let at = projectile.aim;
    match projectile.target.filter(|_| target_alive) {
        Some(target) => {
            debug!(projectile = projectile.id, target = %target, "Shell landed on target");
            hit.direct(ctx, target, events);
            hit.splash(ctx, at, Some(target), events);
        }
        None => {
            hit.splash(ctx, at, None, events);
            events.push(CombatEvent::ProjectileExpired {
                projectile: projectile.id,
                detonated: true,
            });
        }
    }
    true
}

// ============================================================================
// Damage
// ============================================================================

/// Everything needed to apply one shot's damage.
#[derive(Debug, Clone, Copy)]
struct Impact {
    source: EntityId,
    team: TeamId,
    damage: u32,
    damage_type: DamageType,
    splash_radius: Fixed,
    projectile: Option<u32>,
}

impl Impact {
    const fn of(projectile: &Projectile) -> Self {
        Self {
            source: projectile.source,
            team: projectile.team,
            damage: projectile.damage,
            damage_type: projectile.damage_type,
            splash_radius: projectile.splash_radius,
            projectile: Some(projectile.id),
        }
    }

    fn direct(&self, ctx: &mut SimulationContext, target: EntityId, events: &mut Vec<CombatEvent>) {
        self.apply(ctx, target, Fixed::ONE, HitKind::Direct, events);
    }

    /// Splash around `at`. Spares the shooter's team and the direct target.
    fn splash(
        &self,
        ctx: &mut SimulationContext,
        at: Vec2Fixed,
        direct: Option<EntityId>,
        events: &mut Vec<CombatEvent>,
    ) {
        if self.splash_radius <= Fixed::ZERO {
            return;
        }
        let caught: Vec<EntityId> = bodies(ctx)
            .into_iter()
            .filter(|b| {
                Some(b.id) != direct
                    && b.team != self.team
                    && b.shape.edge_distance(at) <= self.splash_radius
            })
            .map(|b| b.id)
            .collect();
        let factor = ctx.config.splash_factor;
        for id in caught {
            self.apply(ctx, id, factor, HitKind::Splash, events);
        }
    }

    fn apply(
        &self,
        ctx: &mut SimulationContext,
        target: EntityId,
        scale: Fixed,
        kind: HitKind,
        events: &mut Vec<CombatEvent>,
    ) {
        let amount = match ctx.entities.get_mut(target) {
            Some(Entity::Agent(agent)) if !agent.health.is_dead() => {
                let amount =
                    calculate_damage(self.damage, self.damage_type, agent.class.armor(), scale);
                agent.last_attacker = Some(self.source);
                agent.health.apply_damage(amount)
            }
            Some(Entity::Structure(structure)) if !structure.health.is_dead() => {
                let amount =
                    calculate_damage(self.damage, self.damage_type, ArmorClass::Building, scale);
                structure.health.apply_damage(amount)
            }
            _ => return,
        };
        events.push(CombatEvent::DamageDealt {
            source: self.source,
            target,
            amount,
            kind,
            projectile: self.projectile,
        });
    }
}
