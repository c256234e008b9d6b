//! Dirty tracking for objects, meshes and the scene-wide managers.
//!
//! Flags are set by scene mutations and cleared only by a synchronization
//! pass. Manager flags are plain state owned by the [`Scene`](crate::Scene),
//! so every cascade is visible at the call site that triggers it.

use crate::object::Object;
use crate::object_manager::ObjectManager;
use crate::scene::{Mesh, SceneSettings};

/// A single `need_update` bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirtyFlag(bool);

impl DirtyFlag {
    pub const fn dirty() -> Self {
        Self(true)
    }

    pub const fn clean() -> Self {
        Self(false)
    }

    pub fn is_set(&self) -> bool {
        self.0
    }

    pub fn tag(&mut self) {
        self.0 = true;
    }

    pub fn clear(&mut self) {
        self.0 = false;
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&mut self) -> bool {
        std::mem::replace(&mut self.0, false)
    }
}

/// Aggregate mesh state owned by the scene.
#[derive(Debug, Clone)]
pub struct MeshManager {
    pub need_update: DirtyFlag,
    /// Set when a globally merged mesh lost a member and must be rebuilt.
    pub need_global_update: DirtyFlag,
}

impl MeshManager {
    pub fn new() -> Self {
        Self {
            need_update: DirtyFlag::dirty(),
            need_global_update: DirtyFlag::clean(),
        }
    }

    pub fn tag_update(&mut self) {
        self.need_update.tag();
    }

    pub fn tag_global_update(&mut self) {
        self.need_global_update.tag();
        self.need_update.tag();
    }
}

impl Default for MeshManager {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct LightManager {
    pub need_update: DirtyFlag,
}

impl LightManager {
    pub fn new() -> Self {
        Self {
            need_update: DirtyFlag::dirty(),
        }
    }

    pub fn tag_update(&mut self) {
        self.need_update.tag();
    }
}

impl Default for LightManager {
    fn default() -> Self {
        Self::new()
    }
}

/// The three scene-wide managers whose flags gate synchronization.
#[derive(Debug, Clone, Default)]
pub struct Managers {
    pub objects: ObjectManager,
    pub meshes: MeshManager,
    pub lights: LightManager,
}

impl Managers {
    pub fn new(objects: ObjectManager) -> Self {
        Self {
            objects,
            meshes: MeshManager::new(),
            lights: LightManager::new(),
        }
    }

    /// Coarse invalidation after a structural change to the object set.
    pub fn tag_objects(&mut self) {
        self.objects.tag_update(&mut self.meshes, &mut self.lights);
    }
}

/// Mark an object dirty and cascade the change.
///
/// A globally merged mesh is baked on the server as a whole, so moving one
/// of its members dirties the mesh and the mesh manager as well. The object
/// manager is always tagged.
pub fn cascade_object_update(
    settings: &SceneSettings,
    object: &mut Object,
    mesh: Option<&mut Mesh>,
    managers: &mut Managers,
) {
    if let Some(mesh) = mesh {
        if settings.is_globally_merged(mesh.mesh_type) {
            mesh.need_update.tag();
            managers.meshes.tag_update();
        }
    }
    object.need_update.tag();
    managers.objects.tag();
}
