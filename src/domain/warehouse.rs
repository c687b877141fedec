//! Registry of everything placed on the warehouse floor, the overlap queries between its entity
//! categories and the rules turning overlaps into score and load changes.

use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    Angle, Arena, Container, DropZone, Forklift, HasCollision, KinematicsConfig, Position, Sensor,
    Sensors, Shape, Shelf, FORKLIFT_RADIUS,
};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct EntityId(u64);

impl EntityId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Category {
    Shelf,
    DropZone,
    Container,
    Forklift,
    Sensor,
    LongSensor,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub drop_zones: usize,
    /// Size of every container batch, including the replenishment of an empty floor.
    pub containers: usize,
    pub placement_attempts: usize,
    /// Seed for reproducible placement, random if absent.
    pub seed: Option<u64>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            drop_zones: 3,
            containers: 50,
            placement_attempts: 10_000,
            seed: None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlacementError {
    #[error("no free spot found after {0} attempts")]
    Exhausted(usize),
    #[error("footprint {footprint:?} does not fit into a {width}x{height} arena")]
    ArenaTooSmall {
        footprint: (f64, f64),
        width: f64,
        height: f64,
    },
}

/// Outcome of one round of collision handling.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CollisionReport {
    pub deliveries: Vec<EntityId>,
    pub crashes: Vec<EntityId>,
    pub pickups: Vec<(EntityId, EntityId)>,
    pub replenished: usize,
    pub replenish_error: Option<PlacementError>,
}

#[derive(Clone, Debug)]
pub struct Warehouse {
    arena: Arena,
    layout: LayoutConfig,
    kinematics: Arc<KinematicsConfig>,
    shelves: IndexMap<EntityId, Shelf>,
    drop_zones: IndexMap<EntityId, DropZone>,
    containers: IndexMap<EntityId, Container>,
    forklifts: IndexMap<EntityId, Forklift>,
    next_id: u64,
    rng: ChaCha8Rng,
}

impl Warehouse {
    pub fn new(arena: Arena, layout: LayoutConfig, kinematics: Arc<KinematicsConfig>) -> Self {
        let rng = match layout.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        };
        Self {
            arena,
            layout,
            kinematics,
            shelves: IndexMap::new(),
            drop_zones: IndexMap::new(),
            containers: IndexMap::new(),
            forklifts: IndexMap::new(),
            next_id: 0,
            rng,
        }
    }

    /// Creates the default floor: the shelf blocks, drop zones placed clear of shelves and each
    /// other, and the first batch of containers.
    pub fn furnished(
        arena: Arena,
        layout: LayoutConfig,
        kinematics: Arc<KinematicsConfig>,
    ) -> Result<Self, PlacementError> {
        let mut warehouse = Self::new(arena, layout, kinematics);
        for position in Shelf::layout(&arena) {
            warehouse.add_shelf(position);
        }
        for _ in 0..warehouse.layout.drop_zones {
            let (position, _) = warehouse.place_without_overlap(
                DropZone::footprint(),
                &[Category::Shelf, Category::DropZone],
                None,
            )?;
            warehouse.add_drop_zone(position);
        }
        warehouse.replenish_containers()?;
        Ok(warehouse)
    }

    pub fn arena(&self) -> Arena {
        self.arena
    }

    fn next_id(&mut self) -> EntityId {
        self.next_id += 1;
        EntityId(self.next_id)
    }

    pub fn add_shelf(&mut self, position: Position) -> EntityId {
        let id = self.next_id();
        self.shelves.insert(id, Shelf::new(position));
        id
    }

    pub fn add_drop_zone(&mut self, position: Position) -> EntityId {
        let id = self.next_id();
        self.drop_zones.insert(id, DropZone::new(position));
        id
    }

    pub fn add_container(&mut self, position: Position) -> EntityId {
        let id = self.next_id();
        self.containers.insert(id, Container::new(position));
        id
    }

    pub fn remove_container(&mut self, id: EntityId) -> Option<Container> {
        self.containers.shift_remove(&id)
    }

    pub fn add_forklift(&mut self, forklift: Forklift) -> EntityId {
        let id = self.next_id();
        self.forklifts.insert(id, forklift);
        id
    }

    pub fn remove_forklift(&mut self, id: EntityId) -> Option<Forklift> {
        self.forklifts.shift_remove(&id)
    }

    /// Creates a forklift at a random spot clear of shelves, containers and other forklifts.
    pub fn spawn_forklift(
        &mut self,
        name: &str,
        session_token: Option<&str>,
        sensor_radii: Option<(f64, f64)>,
    ) -> Result<EntityId, PlacementError> {
        let (position, heading) = self.place_without_overlap(
            Shape::Circle {
                position: Position::default(),
                radius: FORKLIFT_RADIUS,
            },
            &[Category::Shelf, Category::Container, Category::Forklift],
            None,
        )?;
        let mut forklift = Forklift::new(name, position, heading, Arc::clone(&self.kinematics));
        if let Some(token) = session_token {
            forklift = forklift.with_session_token(token);
        }
        if let Some((short, long)) = sensor_radii {
            let sensors = Sensors {
                short: Sensor::new(self.next_id(), short),
                long: Sensor::new(self.next_id(), long),
            };
            forklift = forklift.with_sensors(sensors);
        }
        Ok(self.add_forklift(forklift))
    }

    /// Places a new batch of containers clear of shelves, drop zones and forklifts.
    pub fn replenish_containers(&mut self) -> Result<usize, PlacementError> {
        for _ in 0..self.layout.containers {
            let (position, _) = self.place_without_overlap(
                Container::footprint(),
                &[Category::Shelf, Category::DropZone, Category::Forklift],
                None,
            )?;
            self.add_container(position);
        }
        Ok(self.layout.containers)
    }

    pub fn shelves(&self) -> impl Iterator<Item = (EntityId, &Shelf)> {
        self.shelves.iter().map(|(id, shelf)| (*id, shelf))
    }

    pub fn drop_zones(&self) -> impl Iterator<Item = (EntityId, &DropZone)> {
        self.drop_zones.iter().map(|(id, zone)| (*id, zone))
    }

    pub fn containers(&self) -> impl Iterator<Item = (EntityId, &Container)> {
        self.containers.iter().map(|(id, container)| (*id, container))
    }

    pub fn forklifts(&self) -> impl Iterator<Item = (EntityId, &Forklift)> {
        self.forklifts.iter().map(|(id, forklift)| (*id, forklift))
    }

    pub fn forklifts_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut Forklift)> {
        self.forklifts
            .iter_mut()
            .map(|(id, forklift)| (*id, forklift))
    }

    pub fn forklift_count(&self) -> usize {
        self.forklifts.len()
    }

    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    pub fn forklift(&self, id: EntityId) -> Option<&Forklift> {
        self.forklifts.get(&id)
    }

    pub fn forklift_mut(&mut self, id: EntityId) -> Option<&mut Forklift> {
        self.forklifts.get_mut(&id)
    }

    pub fn container(&self, id: EntityId) -> Option<&Container> {
        self.containers.get(&id)
    }

    pub fn find_forklift_by_name(&self, name: &str) -> Option<EntityId> {
        self.forklifts()
            .find(|(_, forklift)| forklift.name() == name)
            .map(|(id, _)| id)
    }

    pub fn find_forklift_by_token(&self, token: &str) -> Option<EntityId> {
        self.forklifts()
            .find(|(_, forklift)| forklift.session_token() == Some(token))
            .map(|(id, _)| id)
    }

    /// Footprints of all entities of a category in insertion order.
    pub fn shapes(&self, category: Category) -> Vec<(EntityId, Shape)> {
        match category {
            Category::Shelf => self.shelves().map(|(id, s)| (id, s.shape())).collect(),
            Category::DropZone => self.drop_zones().map(|(id, z)| (id, z.shape())).collect(),
            Category::Container => self.containers().map(|(id, c)| (id, c.shape())).collect(),
            Category::Forklift => self.forklifts().map(|(id, f)| (id, f.shape())).collect(),
            Category::Sensor => self
                .forklifts()
                .filter_map(|(_, f)| f.sensors())
                .map(|s| (s.short.id(), s.short.shape()))
                .collect(),
            Category::LongSensor => self
                .forklifts()
                .filter_map(|(_, f)| f.sensors())
                .map(|s| (s.long.id(), s.long.shape()))
                .collect(),
        }
    }

    /// All overlapping pairs between two categories, sorted by id. Within one category every
    /// unordered pair is reported once, smaller id first.
    pub fn collisions(&self, a: Category, b: Category) -> Vec<(EntityId, EntityId)> {
        let shapes_a = self.shapes(a);
        let shapes_b = if a == b {
            shapes_a.clone()
        } else {
            self.shapes(b)
        };

        let mut pairs = vec![];
        for (id_a, shape_a) in &shapes_a {
            for (id_b, shape_b) in &shapes_b {
                if a == b && id_a >= id_b {
                    continue;
                }
                if shape_a.has_intersection(shape_b) {
                    pairs.push((*id_a, *id_b));
                }
            }
        }
        pairs.sort();
        pairs
    }

    pub fn each_collision(
        &self,
        a: Category,
        b: Category,
        mut visitor: impl FnMut(EntityId, EntityId),
    ) {
        for (id_a, id_b) in self.collisions(a, b) {
            visitor(id_a, id_b);
        }
    }

    /// Whether `shape` overlaps anything in the given categories apart from `exclude`.
    pub fn is_occupied(
        &self,
        shape: &Shape,
        blocking: &[Category],
        exclude: Option<EntityId>,
    ) -> bool {
        blocking.iter().any(|category| {
            self.shapes(*category)
                .iter()
                .any(|(id, other)| Some(*id) != exclude && other.has_intersection(shape))
        })
    }

    /// Draws random spots (and headings) inside the arena until `footprint` overlaps nothing in
    /// the blocking categories.
    pub fn place_without_overlap(
        &mut self,
        footprint: Shape,
        blocking: &[Category],
        exclude: Option<EntityId>,
    ) -> Result<(Position, Angle), PlacementError> {
        let (width, height) = footprint.extent();
        if width > self.arena.width || height > self.arena.height {
            return Err(PlacementError::ArenaTooSmall {
                footprint: (width, height),
                width: self.arena.width,
                height: self.arena.height,
            });
        }

        for _ in 0..self.layout.placement_attempts {
            let position = Position::new(
                self.rng
                    .random_range(width / 2.0..=self.arena.width - width / 2.0),
                self.rng
                    .random_range(height / 2.0..=self.arena.height - height / 2.0),
            );
            let heading = Angle::from_deg(self.rng.random_range(0.0..360.0));
            if !self.is_occupied(&footprint.with_position(position), blocking, exclude) {
                return Ok((position, heading));
            }
        }
        Err(PlacementError::Exhausted(self.layout.placement_attempts))
    }

    /// Moves every forklift by one tick. Forklifts leaving the arena are re-centred, or removed
    /// and returned if they are remote controlled.
    pub fn integrate(&mut self) -> Vec<(EntityId, Forklift)> {
        let arena = self.arena;
        let mut lost = vec![];
        for (id, forklift) in self.forklifts.iter_mut() {
            forklift.update();
            if !arena.contains(forklift.position()) {
                if forklift.is_remote() {
                    lost.push(*id);
                } else {
                    forklift.set_position(arena.centre());
                }
            }
        }
        lost.into_iter()
            .filter_map(|id| self.forklifts.shift_remove(&id).map(|f| (id, f)))
            .collect()
    }

    /// Applies the collision rules in fixed order. Every rule is evaluated independently, so a
    /// forklift may be penalised by several rules within one tick.
    pub fn resolve_collisions(&mut self) -> CollisionReport {
        let mut report = CollisionReport::default();

        for (id, _) in self.collisions(Category::Forklift, Category::DropZone) {
            if let Some(forklift) = self.forklifts.get_mut(&id) {
                if forklift.is_loaded() {
                    forklift.unload();
                    forklift.add_delivery();
                    report.deliveries.push(id);
                }
            }
        }

        for (id, _) in self.collisions(Category::Forklift, Category::Shelf) {
            if let Some(forklift) = self.forklifts.get_mut(&id) {
                crash(forklift);
                report.crashes.push(id);
            }
        }

        for (id_a, id_b) in self.collisions(Category::Forklift, Category::Forklift) {
            for id in [id_a, id_b] {
                if let Some(forklift) = self.forklifts.get_mut(&id) {
                    crash(forklift);
                    report.crashes.push(id);
                }
            }
        }

        for (id, container_id) in self.collisions(Category::Forklift, Category::Container) {
            let Some(loaded) = self.forklifts.get(&id).map(Forklift::is_loaded) else {
                continue;
            };
            if loaded {
                if let Some(forklift) = self.forklifts.get_mut(&id) {
                    forklift.crash();
                }
                report.crashes.push(id);
            } else if self.remove_container(container_id).is_some() {
                if let Some(forklift) = self.forklifts.get_mut(&id) {
                    forklift.load();
                }
                report.pickups.push((id, container_id));
            }
        }

        if self.containers.is_empty() {
            match self.replenish_containers() {
                Ok(count) => report.replenished = count,
                Err(error) => report.replenish_error = Some(error),
            }
        }

        report
    }
}

fn crash(forklift: &mut Forklift) {
    forklift.crash();
    if forklift.is_loaded() {
        forklift.unload();
    }
}
