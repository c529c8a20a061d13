//! # Physics Simulator
//!
//! A 2-D rigid-body world for one-shot "what-if" layout experiments
//! (drop everything and see where it settles). Not used for real-time
//! rendering.
//!
//! Bodies are positioned by their centre of mass. The simulator does not
//! keep element dimensions, so callers convert transforms back to top-left
//! coordinates with the width/height they already hold.

use std::collections::HashMap;

use rapier2d::prelude::*;
use serde::{Deserialize, Serialize};

use crate::geometry::ElementId;

/// Definition of a body to simulate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsBody {
    /// Element the body mirrors.
    pub id: ElementId,
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width.
    pub width: f32,
    /// Height.
    pub height: f32,
    /// Fixed bodies never move.
    #[serde(default)]
    pub is_static: bool,
    /// Bounciness; the configured default when absent.
    #[serde(default)]
    pub restitution: Option<f32>,
}

/// Centre-of-mass position and rotation of a body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyTransform {
    /// Centre x.
    pub x: f32,
    /// Centre y.
    pub y: f32,
    /// Rotation in radians.
    pub rotation: f32,
}

struct World {
    gravity: Vector<Real>,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,
}

impl World {
    fn new(gravity: [f32; 2]) -> Self {
        Self {
            gravity: vector![gravity[0], gravity[1]],
            params: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
        }
    }

    fn step(&mut self) {
        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            None,
            &(),
            &(),
        );
    }

    fn remove(&mut self, handle: RigidBodyHandle) {
        self.bodies.remove(
            handle,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }
}

/// Owned rigid-body world keyed by element id.
pub struct PhysicsSimulator {
    world: Option<World>,
    handles: HashMap<ElementId, RigidBodyHandle>,
    gravity: [f32; 2],
    default_restitution: f32,
}

impl std::fmt::Debug for PhysicsSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsSimulator")
            .field("initialized", &self.world.is_some())
            .field("bodies", &self.handles.len())
            .field("gravity", &self.gravity)
            .finish()
    }
}

impl PhysicsSimulator {
    /// Create an uninitialized simulator.
    #[must_use]
    pub fn new(gravity: [f32; 2], default_restitution: f32) -> Self {
        Self {
            world: None,
            handles: HashMap::new(),
            gravity,
            default_restitution,
        }
    }

    /// Create the physics world. Idempotent.
    pub fn init(&mut self) -> bool {
        if self.world.is_none() {
            self.world = Some(World::new(self.gravity));
            tracing::debug!("Physics world initialized with gravity {:?}", self.gravity);
        }
        true
    }

    /// Whether the world exists.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.world.is_some()
    }

    /// Add a body, replacing any previous body with the same id.
    ///
    /// No-op before [`init`](Self::init).
    pub fn add_body(&mut self, body: &PhysicsBody) {
        self.remove_body(body.id.as_str());
        let Some(world) = self.world.as_mut() else {
            return;
        };

        let half_w = body.width / 2.0;
        let half_h = body.height / 2.0;
        let builder = if body.is_static {
            RigidBodyBuilder::fixed()
        } else {
            RigidBodyBuilder::dynamic()
        };
        let rigid_body = builder
            .translation(vector![body.x + half_w, body.y + half_h])
            .build();
        let handle = world.bodies.insert(rigid_body);

        let collider = ColliderBuilder::cuboid(half_w, half_h)
            .restitution(body.restitution.unwrap_or(self.default_restitution))
            .build();
        world
            .colliders
            .insert_with_parent(collider, handle, &mut world.bodies);

        self.handles.insert(body.id.clone(), handle);
    }

    /// Remove a body. Returns whether it existed.
    pub fn remove_body(&mut self, id: &str) -> bool {
        let Some(handle) = self.handles.remove(id) else {
            return false;
        };
        if let Some(world) = self.world.as_mut() {
            world.remove(handle);
        }
        true
    }

    /// Advance by one internal fixed timestep.
    ///
    /// `_dt` is accepted for call-site symmetry with the frame loop but does
    /// not scale the step.
    pub fn step(&mut self, _dt: f32) {
        if let Some(world) = self.world.as_mut() {
            world.step();
        }
    }

    /// Run `iterations` fixed steps synchronously.
    pub fn simulate_drop(&mut self, iterations: usize) {
        for _ in 0..iterations {
            self.step(1.0 / 60.0);
        }
    }

    /// Centre-of-mass transform of a body.
    #[must_use]
    pub fn transform(&self, id: &str) -> Option<BodyTransform> {
        let handle = self.handles.get(id)?;
        let body = self.world.as_ref()?.bodies.get(*handle)?;
        let position = body.translation();
        Some(BodyTransform {
            x: position.x,
            y: position.y,
            rotation: body.rotation().angle(),
        })
    }

    /// Transforms of every body, keyed by element id.
    #[must_use]
    pub fn transforms(&self) -> Vec<(ElementId, BodyTransform)> {
        let mut all: Vec<_> = self
            .handles
            .keys()
            .filter_map(|id| self.transform(id.as_str()).map(|t| (id.clone(), t)))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Number of simulated bodies.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.handles.len()
    }

    /// Destroy every body and start over with an empty world.
    pub fn reset(&mut self) {
        self.handles.clear();
        if self.world.is_some() {
            self.world = Some(World::new(self.gravity));
        }
    }
}
