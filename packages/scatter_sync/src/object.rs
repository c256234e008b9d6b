//! Scene objects: one placed instance of a mesh or a light.

use crate::dirty::DirtyFlag;
use crate::scatter;
use crate::scene::{LightId, Mesh, MeshId, MeshType};
use crate::transform::Transform;

/// What an object instances. Both variants are non-owning keys resolved
/// through the owning [`Scene`](crate::Scene).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    Mesh(MeshId),
    Light(LightId),
}

/// A placed instance in the scene graph.
#[derive(Debug, Clone)]
pub struct Object {
    pub name: String,
    pub binding: Binding,
    pub random_id: u32,
    pub pass_id: u32,
    /// Non-zero for members of a particle-driven instance group.
    pub particle_id: u32,
    pub use_holdout: bool,
    /// Indices into the scene's shader table.
    pub used_shaders: Vec<usize>,
    pub(crate) transform: Transform,
    pub(crate) visible: bool,
    pub(crate) need_update: DirtyFlag,
}

/// Server-side cleanup required when an object leaves the scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Teardown {
    /// Nothing was placed on the server for this object.
    None,
    /// The object lived inside a globally merged mesh that must be rebuilt.
    GlobalMesh,
    /// Delete the named scatter entry.
    DeleteScatter(String),
}

impl Object {
    fn new(name: impl Into<String>, binding: Binding) -> Self {
        Self {
            name: name.into(),
            binding,
            random_id: 0,
            pass_id: 0,
            particle_id: 0,
            use_holdout: false,
            used_shaders: Vec::new(),
            transform: Transform::IDENTITY,
            visible: true,
            need_update: DirtyFlag::dirty(),
        }
    }

    pub fn mesh_instance(name: impl Into<String>, mesh: MeshId) -> Self {
        Self::new(name, Binding::Mesh(mesh))
    }

    pub fn light_instance(name: impl Into<String>, light: LightId) -> Self {
        Self::new(name, Binding::Light(light))
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_particle(mut self, particle_id: u32) -> Self {
        self.particle_id = particle_id;
        self
    }

    pub fn with_shaders(mut self, used_shaders: Vec<usize>) -> Self {
        self.used_shaders = used_shaders;
        self
    }

    pub fn with_visibility(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn mesh_id(&self) -> Option<MeshId> {
        match self.binding {
            Binding::Mesh(id) => Some(id),
            Binding::Light(_) => None,
        }
    }

    pub fn light_id(&self) -> Option<LightId> {
        match self.binding {
            Binding::Light(id) => Some(id),
            Binding::Mesh(_) => None,
        }
    }

    pub fn is_particle(&self) -> bool {
        self.particle_id != 0
    }

    pub fn needs_update(&self) -> bool {
        self.need_update.is_set()
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Decide what the server must forget when this object is destroyed.
    ///
    /// `mesh` is the resolved mesh binding, `None` for light instances or
    /// objects whose mesh is already gone.
    pub fn teardown(&self, mesh: Option<&Mesh>, interactive: bool) -> Teardown {
        let Some(mesh) = mesh else {
            return Teardown::None;
        };
        if !interactive {
            return Teardown::None;
        }
        if mesh.mesh_type == MeshType::Global {
            Teardown::GlobalMesh
        } else if self.is_particle() {
            Teardown::DeleteScatter(scatter::particle_teardown_name(&mesh.name))
        } else {
            Teardown::DeleteScatter(scatter::object_teardown_name(&self.name, &mesh.name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    fn mesh_key() -> MeshId {
        MeshId::from(KeyData::from_ffi(7))
    }

    #[test]
    fn test_new_object_is_dirty() {
        let object = Object::mesh_instance("cube", mesh_key());
        assert!(object.needs_update());
        assert!(object.is_visible());
        assert_eq!(*object.transform(), Transform::IDENTITY);
        assert_eq!(object.mesh_id(), Some(mesh_key()));
        assert_eq!(object.light_id(), None);
    }

    #[test]
    fn test_teardown_direct_instance() {
        let mesh = Mesh::new("Rock", MeshType::Scatter);
        let object = Object::mesh_instance("Rock.001", mesh_key());
        assert_eq!(
            object.teardown(Some(&mesh), true),
            Teardown::DeleteScatter("Rock.001__Rock_s__".to_string())
        );
    }

    #[test]
    fn test_teardown_particle_instance() {
        let mesh = Mesh::new("Leaf", MeshType::Scatter);
        let object = Object::mesh_instance("Leaf.p12", mesh_key()).with_particle(12);
        assert_eq!(
            object.teardown(Some(&mesh), true),
            Teardown::DeleteScatter("Leaf__part___s__".to_string())
        );
    }

    #[test]
    fn test_teardown_global_mesh() {
        let mesh = Mesh::new("Terrain", MeshType::Global);
        let object = Object::mesh_instance("Terrain", mesh_key());
        assert_eq!(object.teardown(Some(&mesh), true), Teardown::GlobalMesh);
    }

    #[test]
    fn test_teardown_outside_interactive_session() {
        let mesh = Mesh::new("Rock", MeshType::Scatter);
        let object = Object::mesh_instance("Rock.001", mesh_key());
        assert_eq!(object.teardown(Some(&mesh), false), Teardown::None);
        assert_eq!(object.teardown(None, true), Teardown::None);
    }
}
