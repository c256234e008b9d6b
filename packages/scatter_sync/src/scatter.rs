//! Scatter batching: turns dirty mesh and light groups into render-server
//! uploads.
//!
//! Direct mesh instances are uploaded one by one. Particle instances of a
//! mesh are sent together as a single multi-instance scatter once any of
//! them changed. Light instances are always uploaded individually.
//!
//! ## Naming
//!
//! Scatter names are part of the server protocol and must match exactly:
//!
//! | Entry | Name |
//! |---|---|
//! | direct mesh instance | `<object>__<mesh>` |
//! | particle batch | `<mesh>__part__` |
//! | light instance | `<object>__<light>` |
//! | light shader | `__<light>` |
//! | teardown, direct | `<object>__<mesh>_s__` |
//! | teardown, particles | `<mesh>__part___s__` |

use slotmap::SlotMap;

use crate::error::SyncError;
use crate::object::Object;
use crate::object_manager::SyncReport;
use crate::scene::{
    resolve_shader_names, AnimMode, Light, Mesh, MeshType, ObjectId, Scene, SceneSettings, Shader,
};
use crate::server::RenderServer;
use crate::transform::FLOATS_PER_INSTANCE;

pub fn object_scatter_name(object: &str, mesh: &str) -> String {
    format!("{}__{}", object, mesh)
}

pub fn particle_scatter_name(mesh: &str) -> String {
    format!("{}__part__", mesh)
}

pub fn light_scatter_name(object: &str, light: &str) -> String {
    format!("{}__{}", object, light)
}

pub fn light_shader_name(light: &str) -> String {
    format!("__{}", light)
}

pub fn object_teardown_name(object: &str, mesh: &str) -> String {
    format!("{}_s__", object_scatter_name(object, mesh))
}

pub fn particle_teardown_name(mesh: &str) -> String {
    format!("{}_s__", particle_scatter_name(mesh))
}

/// Why a whole group was left out of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Merged into a global mesh, no per-instance placement exists.
    GlobalMesh,
    /// Animation frame where only the camera is re-exported.
    CameraOnly,
    /// Animation frame where only proxies move and this is not one.
    NotProxy,
}

/// Group-level skip policy, evaluated before any member is visited.
pub fn skip_reason(settings: &SceneSettings, mesh_type: MeshType) -> Option<SkipReason> {
    if settings.is_globally_merged(mesh_type) {
        return Some(SkipReason::GlobalMesh);
    }
    if settings.first_frame {
        return None;
    }
    match settings.anim_mode {
        AnimMode::CamOnly => Some(SkipReason::CameraOnly),
        AnimMode::MovableProxies if !settings.is_proxy(mesh_type) => Some(SkipReason::NotProxy),
        _ => None,
    }
}

/// Run the mesh pass over every mesh group in order.
pub(crate) fn sync_mesh_groups<S>(
    scene: &mut Scene,
    server: &mut S,
    report: &mut SyncReport,
) -> Result<(), SyncError>
where
    S: RenderServer + ?Sized,
{
    let Scene {
        settings,
        shaders,
        meshes,
        objects,
        mesh_groups,
        ..
    } = scene;

    for group in mesh_groups.iter() {
        let mesh = meshes
            .get(group.key)
            .ok_or(SyncError::DanglingMesh(group.key))?;
        if let Some(reason) = skip_reason(settings, mesh.mesh_type) {
            log::debug!("Skipping mesh group '{}': {:?}", mesh.name, reason);
            report.skipped_groups += 1;
            continue;
        }
        sync_mesh_group(mesh, &group.members, shaders, objects, server, report)?;
    }
    Ok(())
}

fn sync_mesh_group<S>(
    mesh: &Mesh,
    members: &[ObjectId],
    shaders: &[Shader],
    objects: &mut SlotMap<ObjectId, Object>,
    server: &mut S,
    report: &mut SyncReport,
) -> Result<(), SyncError>
where
    S: RenderServer + ?Sized,
{
    let mut particle_count = 0usize;
    let mut particles_dirty = false;

    for &id in members {
        let object = objects.get_mut(id).ok_or(SyncError::UnknownObject(id))?;
        if object.is_particle() {
            particles_dirty |= object.needs_update();
            particle_count += 1;
            continue;
        }
        if !object.needs_update() {
            continue;
        }

        let shader_names = resolve_shader_names(shaders, &object.name, &object.used_shaders)?;
        let name = object_scatter_name(&object.name, &mesh.name);
        let matrices = object.transform.to_array();
        log::debug!("load_scatter {} ({} shaders)", name, shader_names.len());
        match server.load_scatter(&name, &mesh.name, &matrices, 1, &shader_names) {
            Ok(()) => {
                object.need_update.clear();
                report.single_uploads += 1;
            }
            Err(e) => {
                log::warn!("Upload of '{}' failed, retrying next pass: {}", name, e);
                report.failed_uploads += 1;
            }
        }
    }

    if !particles_dirty || particle_count == 0 {
        return Ok(());
    }

    let shader_names = resolve_shader_names(shaders, &mesh.name, &mesh.used_shaders)?;
    let mut matrices = Vec::with_capacity(particle_count * FLOATS_PER_INSTANCE);
    let mut batch = Vec::with_capacity(particle_count);
    for &id in members {
        let object = objects.get(id).ok_or(SyncError::UnknownObject(id))?;
        if object.is_particle() {
            object.transform.write_to(&mut matrices);
            batch.push(id);
        }
    }

    let name = particle_scatter_name(&mesh.name);
    log::debug!("load_scatter {} ({} instances)", name, particle_count);
    match server.load_scatter(&name, &mesh.name, &matrices, particle_count, &shader_names) {
        Ok(()) => {
            // The batch replaced every instance, so every member is clean.
            for id in batch {
                if let Some(object) = objects.get_mut(id) {
                    object.need_update.clear();
                }
            }
            report.batched_uploads += 1;
            report.batched_instances += particle_count;
        }
        Err(e) => {
            log::warn!("Upload of '{}' failed, retrying next pass: {}", name, e);
            report.failed_uploads += 1;
        }
    }
    Ok(())
}

/// Run the light pass over every light group in order.
pub(crate) fn sync_light_groups<S>(
    scene: &mut Scene,
    server: &mut S,
    report: &mut SyncReport,
) -> Result<(), SyncError>
where
    S: RenderServer + ?Sized,
{
    let Scene {
        settings,
        lights,
        objects,
        light_groups,
        ..
    } = scene;

    for group in light_groups.iter() {
        let light = lights
            .get(group.key)
            .ok_or(SyncError::DanglingLight(group.key))?;
        if let Some(reason) = skip_reason(settings, light.mesh_type) {
            log::debug!("Skipping light group '{}': {:?}", light.name, reason);
            report.skipped_groups += 1;
            continue;
        }
        sync_light_group(light, &group.members, objects, server, report)?;
    }
    Ok(())
}

fn sync_light_group<S>(
    light: &Light,
    members: &[ObjectId],
    objects: &mut SlotMap<ObjectId, Object>,
    server: &mut S,
    report: &mut SyncReport,
) -> Result<(), SyncError>
where
    S: RenderServer + ?Sized,
{
    let mut group_dirty = false;
    for &id in members {
        let object = objects.get_mut(id).ok_or(SyncError::UnknownObject(id))?;
        group_dirty |= object.need_update.take();
    }
    if !group_dirty {
        return Ok(());
    }

    let shader_names = vec![light_shader_name(&light.name)];
    for &id in members {
        let object = objects.get_mut(id).ok_or(SyncError::UnknownObject(id))?;
        let name = light_scatter_name(&object.name, &light.name);
        let matrices = object.transform.to_array();
        log::debug!("load_scatter {}", name);
        match server.load_scatter(&name, &light.name, &matrices, 1, &shader_names) {
            Ok(()) => report.light_uploads += 1,
            Err(e) => {
                log::warn!("Upload of '{}' failed, retrying next pass: {}", name, e);
                object.need_update.tag();
                report.failed_uploads += 1;
            }
        }
    }
    Ok(())
}
