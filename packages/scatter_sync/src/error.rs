//! Error types for scene synchronization.

use crate::scene::{LightId, MeshId, ObjectId};

/// Scene inconsistencies detected while synchronizing or mutating a scene.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// A mesh or object references a shader slot that does not exist
    #[error("{owner} references unknown shader index {index}")]
    UnknownShader { owner: String, index: usize },

    /// A grouping or object points at a mesh that is no longer in the scene
    #[error("dangling mesh reference {0:?}")]
    DanglingMesh(MeshId),

    /// A grouping or object points at a light that is no longer in the scene
    #[error("dangling light reference {0:?}")]
    DanglingLight(LightId),

    /// The object id is not (or no longer) part of the scene
    #[error("unknown object {0:?}")]
    UnknownObject(ObjectId),

    /// Object names must be unique for scatter naming to stay unambiguous
    #[error("duplicate object name '{0}'")]
    DuplicateObject(String),

    /// The render server refused a teardown request
    #[error(transparent)]
    Server(#[from] RenderServerError),

    #[error("unknown {kind} '{name}'")]
    UnknownName { kind: &'static str, name: String },
}

/// Failures reported by a render-server transport.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderServerError {
    /// The server refused the request
    #[error("render server rejected '{name}': {reason}")]
    Rejected { name: String, reason: String },

    /// The connection to the server failed
    #[error("render server transport error: {0}")]
    Transport(String),
}
