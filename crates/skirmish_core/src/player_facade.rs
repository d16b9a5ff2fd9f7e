//! Team-scoped view of the simulation for players and AI.
//!
//! Both human input and AI opponents drive the simulation through
//! [`PlayerFacade`]. Queries about other teams are filtered by vision, and
//! commands may only name the facade's own agents.

use crate::commands::Command;
use crate::components::{Health, TargetKind, TeamId};
use crate::entity::{Entity, EntityId};
use crate::error::{GameError, Result};
use crate::math::Vec2Fixed;
use crate::simulation::Simulation;
use crate::targeting::target_info;

/// What a player may learn about an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitInfo {
    /// Handle.
    pub id: EntityId,
    /// Owning team.
    pub team: TeamId,
    /// Infantry, vehicle or structure.
    pub kind: TargetKind,
    /// Centre position.
    pub position: Vec2Fixed,
    /// Current and maximum health.
    pub health: Health,
}

/// A hostile entity inside friendly vision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleEnemy {
    /// Handle.
    pub id: EntityId,
    /// Owning team.
    pub team: TeamId,
    /// Infantry, vehicle or structure.
    pub kind: TargetKind,
    /// Centre position.
    pub position: Vec2Fixed,
}

/// Everything a player (human or AI) can do.
///
/// All unit control flows through [`PlayerFacade::issue_command`], so every
/// action is validated and recorded the same way.
pub trait PlayerFacade {
    /// Issue one command.
    ///
    /// # Errors
    ///
    /// Returns an error if any named agent is unknown or not on this team,
    /// or if the simulation rejects the command.
    fn issue_command(&mut self, command: Command) -> Result<()>;

    /// Issue several commands, stopping at the first rejection.
    ///
    /// # Errors
    ///
    /// See [`PlayerFacade::issue_command`].
    fn issue_commands(&mut self, commands: &[Command]) -> Result<()> {
        for command in commands {
            self.issue_command(command.clone())?;
        }
        Ok(())
    }

    /// Live agents on this team, in handle order.
    fn own_agents(&self) -> Vec<EntityId>;

    /// Enemies currently inside friendly vision.
    fn visible_enemies(&self) -> Vec<VisibleEnemy>;

    /// Information about an entity, if it exists and is visible.
    fn query_entity(&self, id: EntityId) -> Option<UnitInfo>;

    /// Team this facade acts for.
    fn team(&self) -> TeamId;
}

impl Simulation {
    /// Whether `team` can see entity `id`.
    ///
    /// Own entities are always visible. Others must be within vision range
    /// of a friendly agent; idle cloaked agents only within the reveal
    /// radius.
    #[must_use]
    pub fn is_visible_to(&self, team: TeamId, id: EntityId) -> bool {
        let ctx = self.context();
        let Some(entity) = ctx.entities().get(id) else {
            return false;
        };
        let owner = match entity {
            Entity::Agent(a) => a.team,
            Entity::Structure(s) => s.team,
        };
        if owner == team {
            return true;
        }
        let Some(info) = target_info(ctx, id) else {
            return false;
        };
        ctx.entities()
            .agents()
            .filter(|(_, viewer)| viewer.team == team && !viewer.health.is_dead())
            .any(|(_, viewer)| {
                let distance = info.distance_from(viewer.position);
                distance <= viewer.caps.vision
                    && (!info.cloaked || distance <= ctx.config().cloak_reveal_radius)
            })
    }

    /// Hostile entities `team` can currently see, in handle order.
    #[must_use]
    pub fn visible_enemies_for(&self, team: TeamId) -> Vec<VisibleEnemy> {
        let ctx = self.context();
        ctx.entities()
            .ids()
            .into_iter()
            .filter_map(|id| target_info(ctx, id))
            .filter(|info| crate::components::are_hostile(team, info.team))
            .filter(|info| self.is_visible_to(team, info.id))
            .map(|info| VisibleEnemy {
                id: info.id,
                team: info.team,
                kind: info.kind,
                position: info.shape.center(),
            })
            .collect()
    }

    /// Agents on `team`, in handle order.
    #[must_use]
    pub fn team_agents(&self, team: TeamId) -> Vec<EntityId> {
        self.entities()
            .agents()
            .filter(|(_, a)| a.team == team)
            .map(|(id, _)| id)
            .collect()
    }
}

/// [`PlayerFacade`] backed directly by a [`Simulation`].
pub struct SimulationPlayerFacade<'a> {
    sim: &'a mut Simulation,
    team: TeamId,
}

impl<'a> SimulationPlayerFacade<'a> {
    /// Act for `team` on `sim`.
    pub fn new(sim: &'a mut Simulation, team: TeamId) -> Self {
        Self { sim, team }
    }

    /// Read-only simulation access.
    #[must_use]
    pub fn simulation(&self) -> &Simulation {
        self.sim
    }
}

impl PlayerFacade for SimulationPlayerFacade<'_> {
    fn issue_command(&mut self, command: Command) -> Result<()> {
        for &id in command.agents() {
            let agent = self.sim.agent(id).ok_or(GameError::EntityNotFound(id))?;
            if agent.team != self.team {
                return Err(GameError::InvalidCommand(format!(
                    "agent {id} belongs to team {}, not {}",
                    agent.team, self.team
                )));
            }
        }
        self.sim.apply_command(command)
    }

    fn own_agents(&self) -> Vec<EntityId> {
        self.sim.team_agents(self.team)
    }

    fn visible_enemies(&self) -> Vec<VisibleEnemy> {
        self.sim.visible_enemies_for(self.team)
    }

    fn query_entity(&self, id: EntityId) -> Option<UnitInfo> {
        if !self.sim.is_visible_to(self.team, id) {
            return None;
        }
        let info = match self.sim.entities().get(id)? {
            Entity::Agent(a) => UnitInfo {
                id,
                team: a.team,
                kind: a.class.target_kind(),
                position: a.position,
                health: a.health,
            },
            Entity::Structure(s) => UnitInfo {
                id,
                team: s.team,
                kind: TargetKind::Structure,
                position: s.rect(self.sim.context().nav()).center(),
                health: s.health,
            },
        };
        Some(info)
    }

    fn team(&self) -> TeamId {
        self.team
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Agent, AgentClass, Structure};
    use crate::grid::Tile;
    use crate::math::Fixed;

    fn spawn(sim: &mut Simulation, team: TeamId, x: i32, y: i32) -> EntityId {
        sim.spawn_agent(Agent::new(
            AgentClass::Infantry,
            team,
            Vec2Fixed::from_num(x, y),
        ))
        .unwrap()
    }

    #[test]
    fn test_visibility_within_range() {
        let mut sim = Simulation::new(32, 32);
        spawn(&mut sim, 1, 2, 2);
        let enemy = spawn(&mut sim, 2, 6, 2);
        assert!(sim.is_visible_to(1, enemy));
    }

    #[test]
    fn test_visibility_outside_range() {
        let mut sim = Simulation::new(32, 32);
        spawn(&mut sim, 1, 2, 2);
        let enemy = spawn(&mut sim, 2, 20, 20);
        assert!(!sim.is_visible_to(1, enemy));
        assert!(sim.is_visible_to(2, enemy));
    }

    #[test]
    fn test_cloaked_agent_only_seen_up_close() {
        let mut sim = Simulation::new(32, 32);
        spawn(&mut sim, 1, 2, 2);
        let mut sneaky = Agent::new(AgentClass::Infantry, 2, Vec2Fixed::from_num(6, 2));
        sneaky.caps.cloak_when_idle = true;
        let sneaky = sim.spawn_agent(sneaky).unwrap();
        assert!(!sim.is_visible_to(1, sneaky));

        sim.agent_mut(sneaky).unwrap().position = Vec2Fixed::from_num(3, 2);
        assert!(sim.is_visible_to(1, sneaky));
    }

    #[test]
    fn test_facade_only_sees_visible_enemies() {
        let mut sim = Simulation::new(32, 32);
        spawn(&mut sim, 1, 2, 2);
        let near = spawn(&mut sim, 2, 5, 2);
        let far = spawn(&mut sim, 2, 28, 28);
        let base = sim
            .spawn_structure(Structure::new(2, Tile::new(2, 5), 2, 2, 500))
            .unwrap();

        let facade = SimulationPlayerFacade::new(&mut sim, 1);
        let seen: Vec<EntityId> = facade.visible_enemies().iter().map(|e| e.id).collect();
        assert_eq!(seen, vec![near, base]);
        assert!(facade.query_entity(far).is_none());
        assert_eq!(
            facade.query_entity(base).map(|u| u.kind),
            Some(TargetKind::Structure)
        );
    }

    #[test]
    fn test_facade_cannot_command_enemy_units() {
        let mut sim = Simulation::new(32, 32);
        let ours = spawn(&mut sim, 1, 2, 2);
        let theirs = spawn(&mut sim, 2, 10, 10);

        let mut facade = SimulationPlayerFacade::new(&mut sim, 1);
        let result = facade.issue_command(Command::Move {
            agents: vec![ours, theirs],
            point: Vec2Fixed::from_num(5, 5),
        });
        assert!(matches!(result, Err(GameError::InvalidCommand(_))));
        assert_eq!(
            facade.simulation().agent(ours).unwrap().order,
            crate::orders::Order::Idle
        );
    }

    #[test]
    fn test_facade_can_command_own_units() {
        let mut sim = Simulation::new(32, 32);
        let a = spawn(&mut sim, 1, 2, 2);
        let b = spawn(&mut sim, 1, 3, 2);
        spawn(&mut sim, 2, 20, 20);

        let mut facade = SimulationPlayerFacade::new(&mut sim, 1);
        assert_eq!(facade.own_agents(), vec![a, b]);
        facade
            .issue_commands(&[
                Command::Guard { agents: vec![a] },
                Command::Move {
                    agents: vec![b],
                    point: Vec2Fixed::new(Fixed::from_num(8), Fixed::from_num(8)),
                },
            ])
            .unwrap();
        assert_eq!(facade.team(), 1);
        assert!(facade.simulation().agent(b).unwrap().order.name() == "move");
    }
}
