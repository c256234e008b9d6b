//! Scene graph state consumed by the synchronization pass.
//!
//! The scene owns every mesh, light, shader and object. Objects refer to
//! meshes and lights through slotmap keys, and are grouped by what they
//! instance so the batching engine can walk one mesh or light at a time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

use crate::dirty::{cascade_object_update, DirtyFlag, Managers};
use crate::error::SyncError;
use crate::object::{Binding, Object, Teardown};
use crate::object_manager::{self, ObjectManager, SyncOutcome};
use crate::progress::ProgressReporter;
use crate::server::RenderServer;
use crate::transform::Transform;

new_key_type! {
    pub struct MeshId;
    pub struct LightId;
    pub struct ObjectId;
}

/// How a mesh is represented on the render server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeshType {
    /// All instances are merged into one server-side mesh.
    Global,
    /// Placed per object through scatter uploads.
    Scatter,
    MovableProxy,
    ReshapableProxy,
    /// Scene-wide only: defer to each mesh's own classification.
    #[default]
    AsIs,
}

impl MeshType {
    pub fn is_proxy(self) -> bool {
        matches!(self, MeshType::MovableProxy | MeshType::ReshapableProxy)
    }
}

/// Which motion is re-exported on frames after the first one of an animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimMode {
    #[default]
    Full,
    /// Only proxy meshes may move.
    MovableProxies,
    /// Only the camera moves.
    CamOnly,
}

fn default_true() -> bool {
    true
}

/// Scene-wide export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneSettings {
    /// Scene-wide mesh classification override.
    #[serde(default)]
    pub meshes_type: MeshType,
    #[serde(default)]
    pub anim_mode: AnimMode,
    /// True while exporting the first frame of an animation (or a still).
    #[serde(default = "default_true")]
    pub first_frame: bool,
    /// Interactive viewport session, as opposed to a final render.
    #[serde(default = "default_true")]
    pub interactive: bool,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            meshes_type: MeshType::default(),
            anim_mode: AnimMode::default(),
            first_frame: true,
            interactive: true,
        }
    }
}

impl SceneSettings {
    /// Whether a mesh of this classification is merged globally under the
    /// current scene override.
    pub fn is_globally_merged(&self, mesh_type: MeshType) -> bool {
        self.meshes_type == MeshType::Global
            || (self.meshes_type == MeshType::AsIs && mesh_type == MeshType::Global)
    }

    /// Whether a mesh of this classification is treated as a movable proxy.
    pub fn is_proxy(&self, mesh_type: MeshType) -> bool {
        self.meshes_type.is_proxy() || (self.meshes_type == MeshType::AsIs && mesh_type.is_proxy())
    }
}

#[derive(Debug, Clone)]
pub struct Mesh {
    pub name: String,
    pub mesh_type: MeshType,
    pub used_shaders: Vec<usize>,
    pub need_update: DirtyFlag,
}

impl Mesh {
    pub fn new(name: impl Into<String>, mesh_type: MeshType) -> Self {
        Self {
            name: name.into(),
            mesh_type,
            used_shaders: Vec::new(),
            need_update: DirtyFlag::dirty(),
        }
    }

    pub fn with_shaders(mut self, used_shaders: Vec<usize>) -> Self {
        self.used_shaders = used_shaders;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Light {
    pub name: String,
    /// Classification of the mesh that represents this light.
    pub mesh_type: MeshType,
}

impl Light {
    pub fn new(name: impl Into<String>, mesh_type: MeshType) -> Self {
        Self {
            name: name.into(),
            mesh_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shader {
    pub name: String,
}

/// All objects instancing one mesh or light, in insertion order.
#[derive(Debug, Clone)]
pub struct Group<K> {
    pub key: K,
    pub members: Vec<ObjectId>,
}

/// The scene graph root.
#[derive(Debug)]
pub struct Scene {
    pub settings: SceneSettings,
    pub(crate) shaders: Vec<Shader>,
    pub(crate) meshes: SlotMap<MeshId, Mesh>,
    pub(crate) lights: SlotMap<LightId, Light>,
    pub(crate) objects: SlotMap<ObjectId, Object>,
    /// Object name index. Names are unique and fixed once inserted.
    object_names: HashMap<String, ObjectId>,
    pub(crate) mesh_groups: Vec<Group<MeshId>>,
    pub(crate) light_groups: Vec<Group<LightId>>,
    pub(crate) managers: Managers,
}

impl Scene {
    pub fn new(settings: SceneSettings) -> Self {
        Self::with_object_manager(settings, ObjectManager::default())
    }

    pub fn with_object_manager(settings: SceneSettings, objects: ObjectManager) -> Self {
        Self {
            settings,
            shaders: Vec::new(),
            meshes: SlotMap::with_key(),
            lights: SlotMap::with_key(),
            objects: SlotMap::with_key(),
            object_names: HashMap::new(),
            mesh_groups: Vec::new(),
            light_groups: Vec::new(),
            managers: Managers::new(objects),
        }
    }

    /// Register a shader and return its index.
    pub fn add_shader(&mut self, name: impl Into<String>) -> usize {
        self.shaders.push(Shader { name: name.into() });
        self.shaders.len() - 1
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        self.managers.meshes.tag_update();
        self.meshes.insert(mesh)
    }

    pub fn add_light(&mut self, light: Light) -> LightId {
        self.managers.lights.tag_update();
        self.lights.insert(light)
    }

    /// Insert an object into its mesh or light group.
    ///
    /// Adding changes the object set, so all managers are invalidated.
    pub fn add_object(&mut self, object: Object) -> Result<ObjectId, SyncError> {
        if self.object_names.contains_key(&object.name) {
            return Err(SyncError::DuplicateObject(object.name));
        }
        let binding = object.binding;
        match binding {
            Binding::Mesh(mesh) if !self.meshes.contains_key(mesh) => {
                return Err(SyncError::DanglingMesh(mesh));
            }
            Binding::Light(light) if !self.lights.contains_key(light) => {
                return Err(SyncError::DanglingLight(light));
            }
            _ => {}
        }

        let name = object.name.clone();
        let id = self.objects.insert(object);
        self.object_names.insert(name, id);
        match binding {
            Binding::Mesh(mesh) => push_member(&mut self.mesh_groups, mesh, id),
            Binding::Light(light) => push_member(&mut self.light_groups, light, id),
        }
        self.managers.tag_objects();
        Ok(id)
    }

    pub fn object(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(id)
    }

    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(id)
    }

    pub fn light(&self, id: LightId) -> Option<&Light> {
        self.lights.get(id)
    }

    pub fn shader(&self, index: usize) -> Option<&Shader> {
        self.shaders.get(index)
    }

    pub fn find_object(&self, name: &str) -> Option<ObjectId> {
        self.object_names.get(name).copied()
    }

    pub fn find_mesh(&self, name: &str) -> Option<MeshId> {
        self.meshes
            .iter()
            .find(|(_, m)| m.name == name)
            .map(|(id, _)| id)
    }

    pub fn find_light(&self, name: &str) -> Option<LightId> {
        self.lights
            .iter()
            .find(|(_, l)| l.name == name)
            .map(|(id, _)| id)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn mesh_groups(&self) -> &[Group<MeshId>] {
        &self.mesh_groups
    }

    pub fn light_groups(&self) -> &[Group<LightId>] {
        &self.light_groups
    }

    pub fn managers(&self) -> &Managers {
        &self.managers
    }

    /// Mark one object dirty, cascading to its mesh and the managers.
    pub fn tag_object_update(&mut self, id: ObjectId) -> Result<(), SyncError> {
        let Scene {
            settings,
            meshes,
            objects,
            managers,
            ..
        } = self;
        let object = objects.get_mut(id).ok_or(SyncError::UnknownObject(id))?;
        let mesh = object.mesh_id().and_then(|mesh| meshes.get_mut(mesh));
        cascade_object_update(settings, object, mesh, managers);
        Ok(())
    }

    /// Invalidate the whole object set.
    pub fn tag_objects_update(&mut self) {
        self.managers.tag_objects();
    }

    pub fn set_transform(&mut self, id: ObjectId, transform: Transform) -> Result<(), SyncError> {
        let object = self.objects.get_mut(id).ok_or(SyncError::UnknownObject(id))?;
        object.transform = transform;
        self.tag_object_update(id)
    }

    pub fn set_visibility(&mut self, id: ObjectId, visible: bool) -> Result<(), SyncError> {
        let object = self.objects.get_mut(id).ok_or(SyncError::UnknownObject(id))?;
        object.visible = visible;
        self.tag_object_update(id)
    }

    /// Resolve shader indices to names.
    pub fn shader_names(&self, owner: &str, indices: &[usize]) -> Result<Vec<String>, SyncError> {
        resolve_shader_names(&self.shaders, owner, indices)
    }

    /// Push dirty transforms to the render server. See
    /// [`object_manager::synchronize`].
    pub fn synchronize_objects<S, P>(
        &mut self,
        server: &mut S,
        progress: &P,
    ) -> Result<SyncOutcome, SyncError>
    where
        S: RenderServer + ?Sized,
        P: ProgressReporter + ?Sized,
    {
        object_manager::synchronize(self, server, progress)
    }

    /// Destroy an object, cleaning up its scatter entry on the server.
    ///
    /// If the server refuses the delete the object stays in the scene so
    /// the removal can be retried.
    pub fn remove_object<S>(&mut self, id: ObjectId, server: &mut S) -> Result<Object, SyncError>
    where
        S: RenderServer + ?Sized,
    {
        let object = self.objects.get(id).ok_or(SyncError::UnknownObject(id))?;
        let mesh = object.mesh_id().and_then(|mesh| self.meshes.get(mesh));
        let batch_dropped = object.is_particle();
        match object.teardown(mesh, self.settings.interactive) {
            Teardown::None => {}
            Teardown::GlobalMesh => self.managers.meshes.tag_global_update(),
            Teardown::DeleteScatter(name) => {
                log::debug!("delete_scatter {}", name);
                if let Err(e) = server.delete_scatter(&name) {
                    log::warn!("Delete of '{}' failed, object kept: {}", name, e);
                    return Err(e.into());
                }
                // The particle delete drops the whole batch on the server,
                // so the surviving particles must be sent again.
                if batch_dropped {
                    self.tag_sibling_particles(id)?;
                }
            }
        }

        let object = self.objects.remove(id).ok_or(SyncError::UnknownObject(id))?;
        self.object_names.remove(&object.name);
        match object.binding {
            Binding::Mesh(mesh) => remove_member(&mut self.mesh_groups, mesh, id),
            Binding::Light(light) => remove_member(&mut self.light_groups, light, id),
        }
        self.managers.tag_objects();
        Ok(object)
    }

    /// Tag every other particle instance sharing the mesh of `id`.
    fn tag_sibling_particles(&mut self, id: ObjectId) -> Result<(), SyncError> {
        let Some(mesh) = self.objects.get(id).and_then(Object::mesh_id) else {
            return Ok(());
        };
        let siblings: Vec<ObjectId> = self
            .mesh_groups
            .iter()
            .filter(|g| g.key == mesh)
            .flat_map(|g| g.members.iter().copied())
            .filter(|&m| m != id && self.objects.get(m).map_or(false, Object::is_particle))
            .collect();
        for sibling in siblings {
            self.tag_object_update(sibling)?;
        }
        Ok(())
    }

    /// Tear down every object, mesh groups first.
    pub fn clear<S>(&mut self, server: &mut S) -> Result<(), SyncError>
    where
        S: RenderServer + ?Sized,
    {
        let ids: Vec<ObjectId> = self
            .mesh_groups
            .iter()
            .flat_map(|g| g.members.iter().copied())
            .chain(self.light_groups.iter().flat_map(|g| g.members.iter().copied()))
            .collect();
        for id in ids {
            self.remove_object(id, server)?;
        }
        Ok(())
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(SceneSettings::default())
    }
}

pub(crate) fn resolve_shader_names(
    shaders: &[Shader],
    owner: &str,
    indices: &[usize],
) -> Result<Vec<String>, SyncError> {
    indices
        .iter()
        .map(|&index| {
            shaders
                .get(index)
                .map(|s| s.name.clone())
                .ok_or_else(|| SyncError::UnknownShader {
                    owner: owner.to_string(),
                    index,
                })
        })
        .collect()
}

fn push_member<K: PartialEq + Copy>(groups: &mut Vec<Group<K>>, key: K, id: ObjectId) {
    match groups.iter_mut().find(|g| g.key == key) {
        Some(group) => group.members.push(id),
        None => groups.push(Group {
            key,
            members: vec![id],
        }),
    }
}

fn remove_member<K: PartialEq + Copy>(groups: &mut Vec<Group<K>>, key: K, id: ObjectId) {
    if let Some(pos) = groups.iter().position(|g| g.key == key) {
        groups[pos].members.retain(|&m| m != id);
        if groups[pos].members.is_empty() {
            groups.remove(pos);
        }
    }
}
