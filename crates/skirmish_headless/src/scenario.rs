//! Scenario loading and configuration.
//!
//! Scenarios define the map, starting structures and agents, and a script
//! of timed commands. Entities are named by label in the file and resolved
//! to handles when the scenario is built.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use skirmish_core::combat::{DamageType, Weapon};
use skirmish_core::commands::Command;
use skirmish_core::components::{Agent, AgentClass, Doctrine, Structure, TeamId};
use skirmish_core::config::SimConfig;
use skirmish_core::entity::EntityId;
use skirmish_core::error::GameError;
use skirmish_core::grid::{NavGrid, Tile};
use skirmish_core::math::{decimal_serde, Fixed};
use skirmish_core::simulation::Simulation;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// A label is used twice.
    #[error("Duplicate label: {0}")]
    DuplicateLabel(String),
    /// A command names a label that was never placed.
    #[error("Unknown label: {0}")]
    UnknownLabel(String),
    /// The simulation refused a placement.
    #[error("Failed to place {label}: {source}")]
    Placement {
        /// Label of the rejected entity.
        label: String,
        /// Underlying error.
        source: GameError,
    },
}

/// How a scenario weapon delivers damage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum DeliverySpec {
    /// Instant.
    #[default]
    Hitscan,
    /// Straight-line missile.
    Missile {
        /// Tiles per tick.
        #[serde(with = "decimal_serde")]
        speed: Fixed,
        /// Lifetime in ticks.
        max_ticks: u32,
    },
    /// Arced shell.
    Shell {
        /// Flight time in ticks.
        flight_ticks: u32,
    },
}

fn no_splash() -> Fixed {
    Fixed::ZERO
}

/// Weapon stats as written in a scenario file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeaponSpec {
    /// Base damage per shot.
    pub damage: u32,
    /// Range in tiles.
    #[serde(with = "decimal_serde")]
    pub range: Fixed,
    /// Ticks between shots.
    pub cooldown_ticks: u32,
    /// Delivery model.
    #[serde(default)]
    pub delivery: DeliverySpec,
    /// Damage type.
    #[serde(default)]
    pub damage_type: DamageType,
    /// Splash radius in tiles.
    #[serde(default = "no_splash", with = "decimal_serde")]
    pub splash_radius: Fixed,
}

impl WeaponSpec {
    /// Convert to a simulation weapon.
    #[must_use]
    pub fn to_weapon(self) -> Weapon {
        let weapon = Weapon::hitscan(self.damage, self.range, self.cooldown_ticks)
            .with_damage_type(self.damage_type)
            .with_splash(self.splash_radius);
        match self.delivery {
            DeliverySpec::Hitscan => weapon,
            DeliverySpec::Missile { speed, max_ticks } => weapon.with_missile(speed, max_ticks),
            DeliverySpec::Shell { flight_ticks } => weapon.with_shell(flight_ticks),
        }
    }
}

/// A starting agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPlacement {
    /// Label used by scripted commands.
    pub label: String,
    /// Owning team.
    pub team: TeamId,
    /// Infantry or vehicle.
    pub class: AgentClass,
    /// Starting tile; the agent stands at its centre.
    pub tile: (i32, i32),
    /// Mounted weapon.
    #[serde(default)]
    pub weapon: Option<WeaponSpec>,
    /// Maximum health override.
    #[serde(default)]
    pub health: Option<u32>,
    /// Vision override in tiles.
    #[serde(default)]
    pub vision: Option<u32>,
    /// Target selection doctrine.
    #[serde(default)]
    pub doctrine: Doctrine,
    /// May take harvest orders.
    #[serde(default)]
    pub can_harvest: bool,
    /// May take capture orders.
    #[serde(default)]
    pub can_capture: bool,
    /// May take repair orders.
    #[serde(default)]
    pub can_repair: bool,
    /// Hidden from distant enemies while idle.
    #[serde(default)]
    pub cloak_when_idle: bool,
}

fn attackable() -> bool {
    true
}

/// A starting structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructurePlacement {
    /// Label used by scripted commands.
    pub label: String,
    /// Owning team (0 for neutral).
    pub team: TeamId,
    /// Top-left footprint tile.
    pub origin: (i32, i32),
    /// Footprint width and height in tiles.
    pub size: (u32, u32),
    /// Maximum health.
    pub health: u32,
    /// Whether weapons may target it.
    #[serde(default = "attackable")]
    pub attackable: bool,
}

/// A command as written in a scenario script. Points are tiles; the
/// command targets the tile centre.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptCommand {
    /// Formation move.
    Move {
        /// Agent labels.
        agents: Vec<String>,
        /// Destination tile.
        to: (i32, i32),
    },
    /// March and engage.
    AttackMove {
        /// Agent labels.
        agents: Vec<String>,
        /// Destination tile.
        to: (i32, i32),
    },
    /// Lock onto an enemy.
    Attack {
        /// Agent labels.
        agents: Vec<String>,
        /// Target label.
        target: String,
    },
    /// Lock onto any entity.
    ForceAttack {
        /// Agent labels.
        agents: Vec<String>,
        /// Target label.
        target: String,
    },
    /// Fire at the ground.
    ForceFire {
        /// Agent labels.
        agents: Vec<String>,
        /// Aim tile.
        at: (i32, i32),
    },
    /// Hold position.
    Guard {
        /// Agent labels.
        agents: Vec<String>,
    },
    /// Walk to a resource node.
    Harvest {
        /// Agent labels.
        agents: Vec<String>,
        /// Node tile.
        node: (i32, i32),
    },
    /// Walk to a structure and capture it.
    Capture {
        /// Agent labels.
        agents: Vec<String>,
        /// Structure label.
        structure: String,
    },
    /// Walk into a structure for repair.
    RepairEnter {
        /// Agent labels.
        agents: Vec<String>,
        /// Structure label.
        structure: String,
    },
    /// Drop all orders.
    Stop {
        /// Agent labels.
        agents: Vec<String>,
    },
}

/// A command and the tick it is issued before.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedCommand {
    /// Tick.
    pub tick: u64,
    /// Command.
    pub command: ScriptCommand,
}

/// A complete scenario configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// ASCII rows: `.` open, `#` blocked, `~` slow.
    pub map: Vec<String>,
    /// Tunables.
    #[serde(default)]
    pub config: SimConfig,
    /// Starting structures.
    #[serde(default)]
    pub structures: Vec<StructurePlacement>,
    /// Starting agents.
    #[serde(default)]
    pub agents: Vec<AgentPlacement>,
    /// Timed commands.
    #[serde(default)]
    pub script: Vec<ScriptedCommand>,
    /// Default run length.
    pub ticks: u64,
}

/// A built scenario: the simulation plus label lookup.
#[derive(Debug)]
pub struct ScenarioSetup {
    /// Simulation at tick zero.
    pub simulation: Simulation,
    /// Label to handle.
    pub labels: BTreeMap<String, EntityId>,
}

impl Scenario {
    /// Load a scenario from a RON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable or malformed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string (useful for embedded scenarios).
    ///
    /// # Errors
    ///
    /// Returns an error if the text is malformed.
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        Ok(ron::from_str(ron)?)
    }

    /// Build the starting simulation.
    ///
    /// # Errors
    ///
    /// Returns an error for duplicate labels or rejected placements.
    pub fn build(&self) -> Result<ScenarioSetup, ScenarioError> {
        let rows: Vec<&str> = self.map.iter().map(String::as_str).collect();
        let nav = NavGrid::from_ascii(&rows, self.config.tile_size);
        let mut simulation = Simulation::from_grid(nav, self.config.clone());
        let mut labels = BTreeMap::new();

        for placement in &self.structures {
            let structure = Structure::new(
                placement.team,
                Tile::new(placement.origin.0, placement.origin.1),
                placement.size.0,
                placement.size.1,
                placement.health,
            )
            .with_attackable(placement.attackable);
            let id = simulation
                .spawn_structure(structure)
                .map_err(|source| ScenarioError::Placement {
                    label: placement.label.clone(),
                    source,
                })?;
            insert_label(&mut labels, &placement.label, id)?;
        }

        for placement in &self.agents {
            let position = simulation
                .context()
                .nav()
                .tile_center(Tile::new(placement.tile.0, placement.tile.1));
            let mut agent = Agent::new(placement.class, placement.team, position)
                .with_doctrine(placement.doctrine);
            if let Some(weapon) = placement.weapon {
                agent = agent.with_weapon(weapon.to_weapon());
            }
            if let Some(health) = placement.health {
                agent = agent.with_health(health);
            }
            if let Some(vision) = placement.vision {
                agent = agent.with_vision(Fixed::from_num(vision));
            }
            agent.caps.can_harvest = placement.can_harvest;
            agent.caps.can_capture = placement.can_capture;
            agent.caps.can_repair = placement.can_repair;
            agent.caps.cloak_when_idle = placement.cloak_when_idle;

            let id = simulation
                .spawn_agent(agent)
                .map_err(|source| ScenarioError::Placement {
                    label: placement.label.clone(),
                    source,
                })?;
            insert_label(&mut labels, &placement.label, id)?;
        }

        Ok(ScenarioSetup { simulation, labels })
    }
}

fn insert_label(
    labels: &mut BTreeMap<String, EntityId>,
    label: &str,
    id: EntityId,
) -> Result<(), ScenarioError> {
    if labels.insert(label.to_string(), id).is_some() {
        return Err(ScenarioError::DuplicateLabel(label.to_string()));
    }
    Ok(())
}

impl ScenarioSetup {
    fn resolve(&self, label: &str) -> Result<EntityId, ScenarioError> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| ScenarioError::UnknownLabel(label.to_string()))
    }

    fn resolve_all(&self, labels: &[String]) -> Result<Vec<EntityId>, ScenarioError> {
        labels.iter().map(|l| self.resolve(l)).collect()
    }

    /// Translate a scripted command into a simulation command.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError::UnknownLabel`] for labels never placed.
    pub fn to_command(&self, script: &ScriptCommand) -> Result<Command, ScenarioError> {
        let nav = self.simulation.context().nav();
        let point = |(x, y): (i32, i32)| nav.tile_center(Tile::new(x, y));
        let command = match script {
            ScriptCommand::Move { agents, to } => Command::Move {
                agents: self.resolve_all(agents)?,
                point: point(*to),
            },
            ScriptCommand::AttackMove { agents, to } => Command::AttackMove {
                agents: self.resolve_all(agents)?,
                point: point(*to),
            },
            ScriptCommand::Attack { agents, target } => Command::Attack {
                agents: self.resolve_all(agents)?,
                target: self.resolve(target)?,
            },
            ScriptCommand::ForceAttack { agents, target } => Command::ForceAttack {
                agents: self.resolve_all(agents)?,
                target: self.resolve(target)?,
            },
            ScriptCommand::ForceFire { agents, at } => Command::ForceFire {
                agents: self.resolve_all(agents)?,
                point: point(*at),
            },
            ScriptCommand::Guard { agents } => Command::Guard {
                agents: self.resolve_all(agents)?,
            },
            ScriptCommand::Harvest { agents, node } => Command::Harvest {
                agents: self.resolve_all(agents)?,
                node: Tile::new(node.0, node.1),
            },
            ScriptCommand::Capture { agents, structure } => Command::Capture {
                agents: self.resolve_all(agents)?,
                structure: self.resolve(structure)?,
            },
            ScriptCommand::RepairEnter { agents, structure } => Command::RepairEnter {
                agents: self.resolve_all(agents)?,
                structure: self.resolve(structure)?,
            },
            ScriptCommand::Stop { agents } => Command::Stop {
                agents: self.resolve_all(agents)?,
            },
        };
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUEL: &str = r#"(
        name: "duel",
        map: [
            "..........",
            "....#.....",
            "..........",
        ],
        config: (arrival_epsilon: 0.1),
        structures: [
            (label: "depot", team: 2, origin: (7, 0), size: (2, 2), health: 500),
        ],
        agents: [
            (label: "tank", team: 1, class: Vehicle, tile: (0, 1),
             weapon: Some((damage: 30, range: 4.0, cooldown_ticks: 20,
                           delivery: Missile(speed: 0.5, max_ticks: 16)))),
            (label: "scout", team: 1, class: Infantry, tile: (1, 2), cloak_when_idle: true),
        ],
        script: [
            (tick: 0, command: Attack(agents: ["tank"], target: "depot")),
            (tick: 5, command: Move(agents: ["scout"], to: (9, 2))),
        ],
        ticks: 100,
    )"#;

    #[test]
    fn test_parse_and_build() {
        let scenario = Scenario::from_ron_str(DUEL).unwrap();
        assert_eq!(scenario.name, "duel");
        assert_eq!(scenario.config.arrival_epsilon, Fixed::from_num(0.1));
        assert_eq!(scenario.config.tick_rate, SimConfig::default().tick_rate);

        let setup = scenario.build().unwrap();
        let tank = setup.labels["tank"];
        let agent = setup.simulation.agent(tank).unwrap();
        assert_eq!(agent.weapon().unwrap().range, Fixed::from_num(4));
        assert!(setup.simulation.agent(setup.labels["scout"]).unwrap().caps.cloak_when_idle);
        assert!(setup.simulation.context().nav().is_structure(Tile::new(8, 1)));
    }

    #[test]
    fn test_script_resolves_labels() {
        let scenario = Scenario::from_ron_str(DUEL).unwrap();
        let setup = scenario.build().unwrap();
        let command = setup.to_command(&scenario.script[0].command).unwrap();
        assert_eq!(
            command,
            Command::Attack {
                agents: vec![setup.labels["tank"]],
                target: setup.labels["depot"],
            }
        );

        let bad = ScriptCommand::Guard {
            agents: vec!["ghost".to_string()],
        };
        assert!(matches!(
            setup.to_command(&bad),
            Err(ScenarioError::UnknownLabel(l)) if l == "ghost"
        ));
    }

    #[test]
    fn test_rejects_agent_on_wall_and_duplicate_labels() {
        let mut scenario = Scenario::from_ron_str(DUEL).unwrap();
        scenario.agents[1].tile = (4, 1);
        assert!(matches!(
            scenario.build(),
            Err(ScenarioError::Placement { label, .. }) if label == "scout"
        ));

        let mut scenario = Scenario::from_ron_str(DUEL).unwrap();
        scenario.agents[1].label = "tank".to_string();
        assert!(matches!(
            scenario.build(),
            Err(ScenarioError::DuplicateLabel(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Scenario::load("does/not/exist.ron"),
            Err(ScenarioError::FileNotFound(_))
        ));
    }
}
