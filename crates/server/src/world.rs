//! World state management.
//!
//! [`World`] owns every player, food pellet and virus and implements the
//! per-tick rules. [`WorldStore`] wraps it in the single read/write lock
//! shared by the control loop and the connection handlers.

use crate::collision::can_eat;
use crate::config::{Config, FoodConfig, PlayerConfig, VirusConfig};
use crate::entity::{Cell, EntityId, Food, IdGenerator, Player, Virus, random_player_color};
use crate::physics;
use glam::DVec2;
use protocol::{PlayerUpdate, WorldState};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The game world containing all entities.
#[derive(Debug)]
pub struct World {
    ids: IdGenerator,

    pub(crate) players: HashMap<EntityId, Player>,
    pub(crate) foods: HashMap<EntityId, Food>,
    pub(crate) viruses: HashMap<EntityId, Virus>,

    /// Edge length of the square world.
    pub size: f64,

    player_config: PlayerConfig,
    food_config: FoodConfig,
    virus_config: VirusConfig,
}

/// Entity counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellCounts {
    pub players: usize,
    pub food: usize,
    pub viruses: usize,
}

/// What happened during one [`World::step`].
#[derive(Debug, Default)]
pub struct TickReport {
    pub food_spawned: usize,
    pub viruses_spawned: usize,
    pub food_eaten: usize,
    /// Players absorbed by other players, in the order they were eaten.
    pub eaten_players: Vec<EntityId>,
}

impl World {
    /// Create an empty world.
    pub fn new(config: &Config) -> Self {
        Self {
            ids: IdGenerator::new(),
            players: HashMap::new(),
            foods: HashMap::new(),
            viruses: HashMap::new(),
            size: config.border.size,
            player_config: config.player.clone(),
            food_config: config.food.clone(),
            virus_config: config.virus.clone(),
        }
    }

    /// Create a world and bulk-spawn the initial food and viruses.
    pub fn populated(config: &Config) -> Self {
        let mut world = Self::new(config);
        world.spawn_food(config.food.initial_amount);
        world.spawn_viruses(config.virus.amount);
        world
    }

    pub fn cell_counts(&self) -> CellCounts {
        CellCounts {
            players: self.players.len(),
            food: self.foods.len(),
            viruses: self.viruses.len(),
        }
    }

    pub fn player(&self, id: EntityId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn food(&self, id: EntityId) -> Option<&Food> {
        self.foods.get(&id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn foods(&self) -> impl Iterator<Item = &Food> {
        self.foods.values()
    }

    pub fn viruses(&self) -> impl Iterator<Item = &Virus> {
        self.viruses.values()
    }

    /// Random position keeping a body of `radius` inside the world.
    fn random_position(&self, radius: f64) -> DVec2 {
        let mut rng = rand::rng();
        if 2.0 * radius >= self.size {
            return DVec2::splat(self.size / 2.0);
        }
        DVec2::new(
            rng.random_range(radius..=self.size - radius),
            rng.random_range(radius..=self.size - radius),
        )
    }

    /// Spawn `count` food pellets at random positions.
    pub fn spawn_food(&mut self, count: usize) -> usize {
        let mass = self.food_config.mass;
        let radius = crate::collision::mass_to_radius(mass);
        for _ in 0..count {
            let position = self.random_position(radius);
            self.add_food_at(position);
        }
        count
    }

    /// Spawn `count` viruses at random positions.
    pub fn spawn_viruses(&mut self, count: usize) -> usize {
        let mass = self.virus_config.mass;
        let radius = crate::collision::mass_to_radius(mass);
        for _ in 0..count {
            let position = self.random_position(radius);
            let id = self.ids.next_id();
            self.viruses.insert(id, Virus::new(id, position, mass));
        }
        count
    }

    /// Place a single food pellet.
    pub fn add_food_at(&mut self, position: DVec2) -> EntityId {
        let id = self.ids.next_id();
        self.foods
            .insert(id, Food::new(id, position, self.food_config.mass));
        id
    }

    /// Create a player with the starting mass at a random in-bounds position.
    pub fn add_player(&mut self, name: String) -> EntityId {
        let mass = self.player_config.start_mass;
        let position = self.random_position(crate::collision::mass_to_radius(mass));
        self.add_player_at(name, position, mass)
    }

    /// Create a player at an explicit position and mass.
    pub fn add_player_at(&mut self, name: String, position: DVec2, mass: f64) -> EntityId {
        let id = self.ids.next_id();
        self.players.insert(
            id,
            Player::new(id, name, position, mass, random_player_color()),
        );
        id
    }

    pub fn remove_player(&mut self, id: EntityId) -> Option<Player> {
        self.players.remove(&id)
    }

    /// Apply a client's partial update. Last writer wins.
    ///
    /// Returns false when the player does not exist (never joined, left, or
    /// was eaten).
    pub fn apply_input(&mut self, id: EntityId, update: &PlayerUpdate, now: Instant) -> bool {
        let (min_mass, max_mass) = (self.player_config.min_mass, self.player_config.max_mass);
        let Some(player) = self.players.get_mut(&id) else {
            return false;
        };

        let data = player.data_mut();
        if let Some(x) = update.x.filter(|v| v.is_finite()) {
            data.position.x = x;
        }
        if let Some(y) = update.y.filter(|v| v.is_finite()) {
            data.position.y = y;
        }
        if let Some(mass) = update.mass.filter(|v| v.is_finite()) {
            data.set_mass(mass.max(min_mass).min(max_mass));
        }
        if let Some(direction) = update.direction {
            if let Some(dx) = direction.x.filter(|v| v.is_finite()) {
                player.direction.x = dx;
            }
            if let Some(dy) = direction.y.filter(|v| v.is_finite()) {
                player.direction.y = dy;
            }
        }
        player.last_input = now;
        true
    }

    /// Top food up toward its floor and viruses up to their target.
    pub fn maintain_population(&mut self) -> (usize, usize) {
        let food_spawned = if self.foods.len() < self.food_config.min_amount {
            self.spawn_food(self.food_config.spawn_amount)
        } else {
            0
        };
        let deficit = self.virus_config.amount.saturating_sub(self.viruses.len());
        let viruses_spawned = self.spawn_viruses(deficit);
        (food_spawned, viruses_spawned)
    }

    /// Move every player by its direction for the time since its last input.
    pub fn integrate_players(&mut self, now: Instant) {
        let size = self.size;
        for player in self.players.values_mut() {
            let elapsed = now.saturating_duration_since(player.last_input);
            let direction = player.direction;
            physics::integrate(player.data_mut(), direction, elapsed, size);
        }
    }

    /// Resolve eating for every player.
    ///
    /// An eater may eat any number of food pellets, but at most one other
    /// player per pass. Returns (food eaten, players eaten).
    pub fn resolve_consumption(&mut self) -> (usize, Vec<EntityId>) {
        let mut food_eaten = 0;
        let mut eaten_players = Vec::new();

        let eater_ids: Vec<EntityId> = self.players.keys().copied().collect();
        for eater_id in eater_ids {
            // Eaten earlier in this pass.
            let Some(eater) = self.players.get_mut(&eater_id) else {
                continue;
            };

            let data = eater.data_mut();
            self.foods.retain(|_, food| {
                if can_eat(data, food.data()) {
                    data.set_mass(data.mass() + food.mass());
                    food_eaten += 1;
                    false
                } else {
                    true
                }
            });
            let eater_data = *data;

            let victim_id = self
                .players
                .iter()
                .find(|(id, other)| **id != eater_id && can_eat(&eater_data, other.data()))
                .map(|(id, _)| *id);

            if let Some(victim) = victim_id.and_then(|id| self.players.remove(&id)) {
                if let Some(eater) = self.players.get_mut(&eater_id) {
                    let data = eater.data_mut();
                    data.set_mass(data.mass() + victim.mass());
                }
                eaten_players.push(victim.id());
            }
        }

        (food_eaten, eaten_players)
    }

    /// Run one tick: population maintenance, integration, consumption.
    pub fn step(&mut self, now: Instant) -> TickReport {
        let (food_spawned, viruses_spawned) = self.maintain_population();
        self.integrate_players(now);
        let (food_eaten, eaten_players) = self.resolve_consumption();
        TickReport {
            food_spawned,
            viruses_spawned,
            food_eaten,
            eaten_players,
        }
    }

    /// Copy every entity into an owned, serializable snapshot.
    pub fn snapshot(&self) -> WorldState {
        WorldState {
            players: self.players.values().map(Player::to_state).collect(),
            foods: self.foods.values().map(Food::to_state).collect(),
            viruses: self.viruses.values().map(Virus::to_state).collect(),
        }
    }
}

/// Shared handle to the world behind one read/write lock.
///
/// Snapshots take the shared side; the tick, registration and input updates
/// take the exclusive side.
#[derive(Debug, Clone)]
pub struct WorldStore {
    inner: Arc<RwLock<World>>,
}

impl WorldStore {
    pub fn new(world: World) -> Self {
        Self {
            inner: Arc::new(RwLock::new(world)),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, World> {
        self.inner.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, World> {
        self.inner.write().await
    }

    pub async fn snapshot(&self) -> WorldState {
        self.inner.read().await.snapshot()
    }

    /// Apply an input update for `player_id` under the write lock.
    pub async fn apply_input(&self, player_id: EntityId, update: &PlayerUpdate) -> bool {
        self.inner
            .write()
            .await
            .apply_input(player_id, update, Instant::now())
    }
}
