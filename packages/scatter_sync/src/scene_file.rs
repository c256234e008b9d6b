//! Scene description files.
//!
//! A scene file is a JSON document listing shaders, meshes, lights and
//! objects, plus optional per-frame edits. It is what the command-line
//! driver loads to replay a session against a render server.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::object::Object;
use crate::object_manager::{ClearPolicy, ObjectManager};
use crate::scene::{Light, Mesh, MeshType, Scene, SceneSettings};
use crate::server::RenderServer;
use crate::transform::Transform;

fn default_mesh_type() -> MeshType {
    MeshType::Scatter
}

fn default_rows() -> [[f32; 4]; 3] {
    Transform::IDENTITY.to_rows()
}

fn default_visible() -> bool {
    true
}

/// Synchronization options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSection {
    #[serde(default)]
    pub clear_policy: ClearPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshSpec {
    pub name: String,
    #[serde(default = "default_mesh_type")]
    pub mesh_type: MeshType,
    /// Indices into the file's shader list.
    #[serde(default)]
    pub shaders: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightSpec {
    pub name: String,
    #[serde(default = "default_mesh_type")]
    pub mesh_type: MeshType,
}

/// An object bound to exactly one of `mesh` or `light`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSpec {
    pub name: String,
    #[serde(default)]
    pub mesh: Option<String>,
    #[serde(default)]
    pub light: Option<String>,
    /// Three rows of a 3×4 affine matrix.
    #[serde(default = "default_rows")]
    pub transform: [[f32; 4]; 3],
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub random_id: u32,
    #[serde(default)]
    pub pass_id: u32,
    #[serde(default)]
    pub particle_id: u32,
    #[serde(default)]
    pub holdout: bool,
    #[serde(default)]
    pub shaders: Vec<usize>,
}

/// A change applied to one object before a frame is synchronized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectUpdate {
    pub name: String,
    #[serde(default)]
    pub transform: Option<[[f32; 4]; 3]>,
    #[serde(default)]
    pub visible: Option<bool>,
}

/// Edits for one frame after the first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSpec {
    #[serde(default)]
    pub updates: Vec<ObjectUpdate>,
    /// Objects destroyed before the frame is synchronized.
    #[serde(default)]
    pub remove: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneFile {
    #[serde(default)]
    pub settings: SceneSettings,
    #[serde(default)]
    pub sync: SyncSection,
    #[serde(default)]
    pub shaders: Vec<String>,
    #[serde(default)]
    pub meshes: Vec<MeshSpec>,
    #[serde(default)]
    pub lights: Vec<LightSpec>,
    pub objects: Vec<ObjectSpec>,
    #[serde(default)]
    pub frames: Vec<FrameSpec>,
}

impl SceneFile {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scene file {:?}", path))?;
        Self::from_json(&content).with_context(|| format!("Failed to parse scene file {:?}", path))
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Check cross references before building a scene.
    pub fn validate(&self) -> Result<(), String> {
        let shader_ok = |index: &usize| *index < self.shaders.len();

        let mut mesh_names = HashSet::new();
        for mesh in &self.meshes {
            if !mesh_names.insert(mesh.name.as_str()) {
                return Err(format!("Duplicate mesh '{}'", mesh.name));
            }
            if !mesh.shaders.iter().all(shader_ok) {
                return Err(format!("Mesh '{}' uses an unknown shader index", mesh.name));
            }
        }

        let mut light_names = HashSet::new();
        for light in &self.lights {
            if !light_names.insert(light.name.as_str()) {
                return Err(format!("Duplicate light '{}'", light.name));
            }
        }

        let mut object_names = HashSet::new();
        for object in &self.objects {
            if !object_names.insert(object.name.as_str()) {
                return Err(format!("Duplicate object '{}'", object.name));
            }
            match (&object.mesh, &object.light) {
                (Some(mesh), None) if !mesh_names.contains(mesh.as_str()) => {
                    return Err(format!("Object '{}' uses unknown mesh '{}'", object.name, mesh));
                }
                (None, Some(light)) if !light_names.contains(light.as_str()) => {
                    return Err(format!("Object '{}' uses unknown light '{}'", object.name, light));
                }
                (Some(_), Some(_)) | (None, None) => {
                    return Err(format!(
                        "Object '{}' must reference exactly one of mesh or light",
                        object.name
                    ));
                }
                _ => {}
            }
            if !object.shaders.iter().all(shader_ok) {
                return Err(format!("Object '{}' uses an unknown shader index", object.name));
            }
        }

        for (i, frame) in self.frames.iter().enumerate() {
            for name in frame.updates.iter().map(|u| &u.name).chain(&frame.remove) {
                if !object_names.contains(name.as_str()) {
                    return Err(format!("Frame {}: unknown object '{}'", i + 1, name));
                }
            }
        }
        Ok(())
    }

    /// Build the scene described by this file. Every object starts dirty.
    pub fn build_scene(&self) -> Result<Scene, SyncError> {
        let manager = ObjectManager::new(self.sync.clear_policy);
        let mut scene = Scene::with_object_manager(self.settings.clone(), manager);

        for shader in &self.shaders {
            scene.add_shader(shader.clone());
        }
        for mesh in &self.meshes {
            scene.add_mesh(Mesh::new(&mesh.name, mesh.mesh_type).with_shaders(mesh.shaders.clone()));
        }
        for light in &self.lights {
            scene.add_light(Light::new(&light.name, light.mesh_type));
        }
        for spec in &self.objects {
            let object = match (&spec.mesh, &spec.light) {
                (Some(mesh), _) => {
                    Object::mesh_instance(&spec.name, lookup_mesh(&scene, mesh)?)
                }
                (None, Some(light)) => {
                    Object::light_instance(&spec.name, lookup_light(&scene, light)?)
                }
                (None, None) => {
                    return Err(SyncError::UnknownName {
                        kind: "binding",
                        name: spec.name.clone(),
                    });
                }
            };
            let mut object = object
                .with_transform(Transform::from_rows(spec.transform))
                .with_visibility(spec.visible)
                .with_particle(spec.particle_id)
                .with_shaders(spec.shaders.clone());
            object.random_id = spec.random_id;
            object.pass_id = spec.pass_id;
            object.use_holdout = spec.holdout;
            scene.add_object(object)?;
        }
        Ok(scene)
    }

    /// Apply the edits of `frame` to a scene built from this file.
    pub fn apply_frame<S>(
        &self,
        scene: &mut Scene,
        frame: &FrameSpec,
        server: &mut S,
    ) -> Result<(), SyncError>
    where
        S: RenderServer + ?Sized,
    {
        for update in &frame.updates {
            let id = lookup_object(scene, &update.name)?;
            if let Some(rows) = update.transform {
                scene.set_transform(id, Transform::from_rows(rows))?;
            }
            if let Some(visible) = update.visible {
                scene.set_visibility(id, visible)?;
            }
        }
        for name in &frame.remove {
            let id = lookup_object(scene, name)?;
            scene.remove_object(id, server)?;
        }
        Ok(())
    }
}

fn lookup_mesh(scene: &Scene, name: &str) -> Result<crate::scene::MeshId, SyncError> {
    scene.find_mesh(name).ok_or_else(|| SyncError::UnknownName {
        kind: "mesh",
        name: name.to_string(),
    })
}

fn lookup_light(scene: &Scene, name: &str) -> Result<crate::scene::LightId, SyncError> {
    scene.find_light(name).ok_or_else(|| SyncError::UnknownName {
        kind: "light",
        name: name.to_string(),
    })
}

fn lookup_object(scene: &Scene, name: &str) -> Result<crate::scene::ObjectId, SyncError> {
    scene.find_object(name).ok_or_else(|| SyncError::UnknownName {
        kind: "object",
        name: name.to_string(),
    })
}
