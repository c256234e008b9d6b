//! The object manager: drives one synchronization pass per frame.
//!
//! A pass is gated by the manager's own dirty flag. When it runs, mesh
//! groups are synchronized first, then light groups, with a cancellation
//! poll before each of the two. Cancellation is not rolled back: objects
//! already uploaded stay clean.

use serde::{Deserialize, Serialize};

use crate::dirty::{DirtyFlag, LightManager, MeshManager};
use crate::error::SyncError;
use crate::progress::ProgressReporter;
use crate::scatter;
use crate::scene::Scene;
use crate::server::RenderServer;

/// When the manager's dirty flag is cleared relative to the pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClearPolicy {
    /// Clear only once a pass completed without failed uploads. A cancelled
    /// or failed pass leaves the manager dirty so the next frame retries.
    #[default]
    OnCompletion,
    /// Clear before the pass starts and never re-set it on cancellation.
    /// Matches hosts that rely on the legacy behavior.
    BeforePass,
}

#[derive(Debug, Clone)]
pub struct ObjectManager {
    pub(crate) need_update: DirtyFlag,
    pub clear_policy: ClearPolicy,
}

impl ObjectManager {
    pub fn new(clear_policy: ClearPolicy) -> Self {
        Self {
            need_update: DirtyFlag::dirty(),
            clear_policy,
        }
    }

    pub fn need_update(&self) -> bool {
        self.need_update.is_set()
    }

    /// Invalidate after a change to the object set. Mesh and light
    /// aggregates may depend on the set, so they are tagged too.
    pub fn tag_update(&mut self, meshes: &mut MeshManager, lights: &mut LightManager) {
        self.need_update.tag();
        meshes.tag_update();
        lights.tag_update();
    }

    pub(crate) fn tag(&mut self) {
        self.need_update.tag();
    }
}

impl Default for ObjectManager {
    fn default() -> Self {
        Self::new(ClearPolicy::default())
    }
}

/// Counters collected during one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub single_uploads: usize,
    pub batched_uploads: usize,
    pub batched_instances: usize,
    pub light_uploads: usize,
    pub skipped_groups: usize,
    pub failed_uploads: usize,
}

impl SyncReport {
    pub fn total_uploads(&self) -> usize {
        self.single_uploads + self.batched_uploads + self.light_uploads
    }
}

/// Result of [`synchronize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum SyncOutcome {
    /// The manager was clean; nothing was scanned.
    Skipped,
    Completed(SyncReport),
    /// Stopped at a cancellation poll. `partial` is true when the mesh pass
    /// had already run, so some objects may be clean and others not.
    Cancelled { partial: bool, report: SyncReport },
}

enum PassEnd {
    Finished,
    Cancelled { partial: bool },
}

const MESH_STATUS: (&str, &str) = ("Updating Objects", "Copying Transformations to server");
const LIGHT_STATUS: (&str, &str) = ("Updating Lamp Objects", "Copying Transformations to server");

/// Copy dirty object transforms to the render server.
///
/// Returns [`SyncOutcome::Skipped`] without touching anything when the
/// object manager is clean. Scene inconsistencies abort the pass with an
/// error; the manager stays dirty in that case under
/// [`ClearPolicy::OnCompletion`].
pub fn synchronize<S, P>(
    scene: &mut Scene,
    server: &mut S,
    progress: &P,
) -> Result<SyncOutcome, SyncError>
where
    S: RenderServer + ?Sized,
    P: ProgressReporter + ?Sized,
{
    if !scene.managers.objects.need_update() {
        return Ok(SyncOutcome::Skipped);
    }
    if scene.managers.objects.clear_policy == ClearPolicy::BeforePass {
        scene.managers.objects.need_update.clear();
    }

    let mut report = SyncReport::default();
    let end = run_passes(scene, server, progress, &mut report)?;

    match end {
        PassEnd::Cancelled { partial } => {
            log::info!("Object synchronization cancelled (partial: {})", partial);
            Ok(SyncOutcome::Cancelled { partial, report })
        }
        PassEnd::Finished => {
            if report.failed_uploads > 0 {
                scene.managers.objects.tag();
            } else {
                scene.managers.objects.need_update.clear();
            }
            log::info!(
                "Synchronized objects: {} single, {} batched ({} instances), {} light, {} groups skipped, {} failed",
                report.single_uploads,
                report.batched_uploads,
                report.batched_instances,
                report.light_uploads,
                report.skipped_groups,
                report.failed_uploads
            );
            Ok(SyncOutcome::Completed(report))
        }
    }
}

fn run_passes<S, P>(
    scene: &mut Scene,
    server: &mut S,
    progress: &P,
    report: &mut SyncReport,
) -> Result<PassEnd, SyncError>
where
    S: RenderServer + ?Sized,
    P: ProgressReporter + ?Sized,
{
    let mut mesh_pass_ran = false;

    if !scene.mesh_groups.is_empty() {
        progress.set_status(MESH_STATUS.0, MESH_STATUS.1);
        if progress.is_cancelled() {
            return Ok(PassEnd::Cancelled { partial: false });
        }
        mesh_pass_ran = true;
        scatter::sync_mesh_groups(scene, server, report)?;
    }

    if !scene.light_groups.is_empty() {
        progress.set_status(LIGHT_STATUS.0, LIGHT_STATUS.1);
        if progress.is_cancelled() {
            return Ok(PassEnd::Cancelled {
                partial: mesh_pass_ran,
            });
        }
        scatter::sync_light_groups(scene, server, report)?;
    }

    Ok(PassEnd::Finished)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Object;
    use crate::progress::Progress;
    use crate::scene::{Light, Mesh, MeshType, ObjectId, SceneSettings};
    use crate::server::RecordingServer;
    use crate::transform::Transform;
    use std::cell::Cell;

    /// Cancels as soon as a status with the given title is reported.
    struct CancelOnStatus {
        title: &'static str,
        cancelled: Cell<bool>,
    }

    impl CancelOnStatus {
        fn new(title: &'static str) -> Self {
            Self {
                title,
                cancelled: Cell::new(false),
            }
        }
    }

    impl ProgressReporter for CancelOnStatus {
        fn set_status(&self, title: &str, _detail: &str) {
            if title == self.title {
                self.cancelled.set(true);
            }
        }

        fn is_cancelled(&self) -> bool {
            self.cancelled.get()
        }
    }

    struct Fixture {
        scene: Scene,
        rock_objects: Vec<ObjectId>,
        lamps: Vec<ObjectId>,
    }

    fn fixture(policy: ClearPolicy) -> Fixture {
        let mut scene = Scene::with_object_manager(SceneSettings::default(), ObjectManager::new(policy));
        let stone = scene.add_shader("Stone");
        let rock = scene.add_mesh(Mesh::new("Rock", MeshType::Scatter));
        let sun = scene.add_light(Light::new("Sun", MeshType::Scatter));
        let rock_objects = (0..2)
            .map(|i| {
                let object = Object::mesh_instance(format!("rock{}", i), rock)
                    .with_shaders(vec![stone])
                    .with_transform(Transform::from_translation(i as f32, 0.0, 0.0));
                scene.add_object(object).unwrap()
            })
            .collect();
        let lamps = (0..3)
            .map(|i| scene.add_object(Object::light_instance(format!("lamp{}", i), sun)).unwrap())
            .collect();
        Fixture {
            scene,
            rock_objects,
            lamps,
        }
    }

    #[test]
    fn test_clean_manager_skips_everything() {
        let mut f = fixture(ClearPolicy::OnCompletion);
        f.scene.managers.objects.need_update.clear();
        let mut server = RecordingServer::new();
        let progress = CancelOnStatus::new("never");

        let outcome = f.scene.synchronize_objects(&mut server, &progress).unwrap();
        assert_eq!(outcome, SyncOutcome::Skipped);
        assert!(server.calls().is_empty());
        assert!(f.scene.object(f.rock_objects[0]).unwrap().needs_update());
    }

    #[test]
    fn test_full_pass_clears_everything() {
        let mut f = fixture(ClearPolicy::OnCompletion);
        let mut server = RecordingServer::new();
        let progress = Progress::new();

        let outcome = f.scene.synchronize_objects(&mut server, &progress).unwrap();
        let report = match outcome {
            SyncOutcome::Completed(report) => report,
            other => panic!("expected a completed pass, got {:?}", other),
        };
        assert_eq!(report.single_uploads, 2);
        assert_eq!(report.light_uploads, 3);
        assert_eq!(
            server.uploaded_names(),
            vec!["rock0__Rock", "rock1__Rock", "lamp0__Sun", "lamp1__Sun", "lamp2__Sun"]
        );
        assert!(!f.scene.managers().objects.need_update());
        assert_eq!(progress.status().title, "Updating Lamp Objects");

        // Nothing changed, so the next frame is a no-op.
        let outcome = f.scene.synchronize_objects(&mut server, &progress).unwrap();
        assert_eq!(outcome, SyncOutcome::Skipped);
    }

    #[test]
    fn test_only_moved_object_is_resent() {
        let mut f = fixture(ClearPolicy::OnCompletion);
        let mut server = RecordingServer::new();
        let progress = Progress::new();
        f.scene.synchronize_objects(&mut server, &progress).unwrap();
        server.take_calls();

        f.scene
            .set_transform(f.rock_objects[1], Transform::from_translation(0.0, 9.0, 0.0))
            .unwrap();
        f.scene.synchronize_objects(&mut server, &progress).unwrap();
        assert_eq!(server.uploaded_names(), vec!["rock1__Rock"]);
    }

    #[test]
    fn test_cancel_before_light_pass() {
        let mut f = fixture(ClearPolicy::OnCompletion);
        let mut server = RecordingServer::new();
        let progress = CancelOnStatus::new(LIGHT_STATUS.0);

        let outcome = f.scene.synchronize_objects(&mut server, &progress).unwrap();
        assert!(matches!(outcome, SyncOutcome::Cancelled { partial: true, .. }));
        assert_eq!(server.uploaded_names(), vec!["rock0__Rock", "rock1__Rock"]);
        for &id in &f.rock_objects {
            assert!(!f.scene.object(id).unwrap().needs_update());
        }
        for &id in &f.lamps {
            assert!(f.scene.object(id).unwrap().needs_update());
        }
        // The manager stays dirty so the lights go out next frame.
        assert!(f.scene.managers().objects.need_update());
    }

    #[test]
    fn test_cancel_before_mesh_pass() {
        let mut f = fixture(ClearPolicy::OnCompletion);
        let mut server = RecordingServer::new();
        let progress = Progress::new();
        progress.cancel();

        let outcome = f.scene.synchronize_objects(&mut server, &progress).unwrap();
        assert!(matches!(outcome, SyncOutcome::Cancelled { partial: false, .. }));
        assert!(server.calls().is_empty());
    }

    #[test]
    fn test_before_pass_policy_loses_cancelled_work() {
        let mut f = fixture(ClearPolicy::BeforePass);
        let mut server = RecordingServer::new();
        let progress = CancelOnStatus::new(LIGHT_STATUS.0);

        f.scene.synchronize_objects(&mut server, &progress).unwrap();
        assert!(!f.scene.managers().objects.need_update());

        let outcome = f.scene.synchronize_objects(&mut server, &Progress::new()).unwrap();
        assert_eq!(outcome, SyncOutcome::Skipped);
        assert!(f.scene.object(f.lamps[0]).unwrap().needs_update());
    }

    #[test]
    fn test_failed_upload_is_retried() {
        let mut f = fixture(ClearPolicy::OnCompletion);
        let mut server = RecordingServer::new();
        server.reject("rock1__Rock");
        let progress = Progress::new();

        let outcome = f.scene.synchronize_objects(&mut server, &progress).unwrap();
        let SyncOutcome::Completed(report) = outcome else {
            panic!("expected a completed pass");
        };
        assert_eq!(report.failed_uploads, 1);
        assert!(f.scene.object(f.rock_objects[1]).unwrap().needs_update());
        assert!(f.scene.managers().objects.need_update());

        server.accept("rock1__Rock");
        server.take_calls();
        f.scene.synchronize_objects(&mut server, &progress).unwrap();
        assert_eq!(server.uploaded_names(), vec!["rock1__Rock"]);
        assert!(!f.scene.managers().objects.need_update());
    }

    #[test]
    fn test_scene_error_keeps_manager_dirty() {
        let mut f = fixture(ClearPolicy::OnCompletion);
        f.scene.objects[f.rock_objects[0]].used_shaders = vec![99];
        let mut server = RecordingServer::new();

        let result = f.scene.synchronize_objects(&mut server, &Progress::new());
        assert!(matches!(result, Err(SyncError::UnknownShader { index: 99, .. })));
        assert!(f.scene.managers().objects.need_update());
    }

    #[test]
    fn test_light_only_scene_reports_lamp_status() {
        let mut scene = Scene::default();
        let sun = scene.add_light(Light::new("Sun", MeshType::Scatter));
        scene.add_object(Object::light_instance("lamp", sun)).unwrap();
        let mut server = RecordingServer::new();
        let progress = Progress::new();

        scene.synchronize_objects(&mut server, &progress).unwrap();
        assert_eq!(progress.status().title, "Updating Lamp Objects");
        assert_eq!(server.uploaded_names(), vec!["lamp__Sun"]);
    }
}
