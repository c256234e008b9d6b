//! Incremental synchronization of scene objects to a render server.
//!
//! Objects carry dirty flags that cascade to their mesh and to the scene's
//! managers. A synchronization pass walks the mesh and light groups and
//! uploads only what changed, batching particle instances of one mesh into
//! a single scatter upload.

pub mod dirty;
pub mod error;
pub mod object;
pub mod object_manager;
pub mod progress;
pub mod scatter;
pub mod scene;
pub mod scene_file;
pub mod server;
pub mod transform;

pub mod cli;

pub use error::{RenderServerError, SyncError};
pub use object::{Binding, Object, Teardown};
pub use object_manager::{ClearPolicy, ObjectManager, SyncOutcome, SyncReport};
pub use progress::{Progress, ProgressReporter};
pub use scene::{
    AnimMode, Light, LightId, Mesh, MeshId, MeshType, ObjectId, Scene, SceneSettings,
};
pub use server::{RecordingServer, RenderServer, ServerCall};
pub use transform::Transform;
