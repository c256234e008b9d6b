//! Render-server contract and an in-memory recording implementation.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::RenderServerError;

/// Remote scatter management on the render server.
///
/// Calls are synchronous. A failed upload is reported back so the caller
/// can keep the affected objects dirty and retry on the next pass.
pub trait RenderServer {
    /// Place `count` instances of a mesh (or light) on the server.
    ///
    /// `matrices` holds `12 * count` floats, one 3×4 row-major transform
    /// per instance.
    fn load_scatter(
        &mut self,
        name: &str,
        mesh_name: &str,
        matrices: &[f32],
        count: usize,
        shader_names: &[String],
    ) -> Result<(), RenderServerError>;

    /// Remove a scatter entry from the server.
    fn delete_scatter(&mut self, name: &str) -> Result<(), RenderServerError>;
}

/// One call as seen by a [`RecordingServer`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "camelCase")]
pub enum ServerCall {
    #[serde(rename_all = "camelCase")]
    LoadScatter {
        name: String,
        mesh_name: String,
        matrices: Vec<f32>,
        count: usize,
        shader_names: Vec<String>,
    },
    DeleteScatter { name: String },
}

impl ServerCall {
    pub fn name(&self) -> &str {
        match self {
            ServerCall::LoadScatter { name, .. } | ServerCall::DeleteScatter { name } => name,
        }
    }
}

/// Server stand-in that records every successful call.
///
/// Names registered with [`reject`](Self::reject) fail instead, which is how
/// transport failures are simulated.
#[derive(Debug, Default)]
pub struct RecordingServer {
    calls: Vec<ServerCall>,
    rejected: HashSet<String>,
}

impl RecordingServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every future call targeting `name`.
    pub fn reject(&mut self, name: impl Into<String>) {
        self.rejected.insert(name.into());
    }

    /// Accept calls targeting `name` again.
    pub fn accept(&mut self, name: &str) {
        self.rejected.remove(name);
    }

    pub fn calls(&self) -> &[ServerCall] {
        &self.calls
    }

    /// Take all recorded calls, leaving the log empty.
    pub fn take_calls(&mut self) -> Vec<ServerCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn uploaded_names(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter(|c| matches!(c, ServerCall::LoadScatter { .. }))
            .map(ServerCall::name)
            .collect()
    }

    pub fn deleted_names(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter(|c| matches!(c, ServerCall::DeleteScatter { .. }))
            .map(ServerCall::name)
            .collect()
    }

    fn check(&self, name: &str) -> Result<(), RenderServerError> {
        if self.rejected.contains(name) {
            return Err(RenderServerError::Rejected {
                name: name.to_string(),
                reason: "rejected by recording server".to_string(),
            });
        }
        Ok(())
    }
}

impl RenderServer for RecordingServer {
    fn load_scatter(
        &mut self,
        name: &str,
        mesh_name: &str,
        matrices: &[f32],
        count: usize,
        shader_names: &[String],
    ) -> Result<(), RenderServerError> {
        self.check(name)?;
        self.calls.push(ServerCall::LoadScatter {
            name: name.to_string(),
            mesh_name: mesh_name.to_string(),
            matrices: matrices.to_vec(),
            count,
            shader_names: shader_names.to_vec(),
        });
        Ok(())
    }

    fn delete_scatter(&mut self, name: &str) -> Result<(), RenderServerError> {
        self.check(name)?;
        self.calls.push(ServerCall::DeleteScatter {
            name: name.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_in_order() {
        let mut server = RecordingServer::new();
        server
            .load_scatter("a__Rock", "Rock", &[0.0; 12], 1, &["Stone".to_string()])
            .unwrap();
        server.delete_scatter("a__Rock_s__").unwrap();

        assert_eq!(server.uploaded_names(), vec!["a__Rock"]);
        assert_eq!(server.deleted_names(), vec!["a__Rock_s__"]);
        assert_eq!(server.take_calls().len(), 2);
        assert!(server.calls().is_empty());
    }

    #[test]
    fn test_reject_and_accept() {
        let mut server = RecordingServer::new();
        server.reject("a__Rock");
        assert!(server.load_scatter("a__Rock", "Rock", &[], 0, &[]).is_err());
        assert!(server.calls().is_empty());

        server.accept("a__Rock");
        assert!(server.load_scatter("a__Rock", "Rock", &[], 0, &[]).is_ok());
    }

    #[test]
    fn test_serialized_shape() {
        let call = ServerCall::LoadScatter {
            name: "Leaf__part__".to_string(),
            mesh_name: "Leaf".to_string(),
            matrices: vec![],
            count: 0,
            shader_names: vec![],
        };
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["call"], "loadScatter");
        assert_eq!(json["meshName"], "Leaf");
        assert_eq!(json["shaderNames"], serde_json::json!([]));
    }
}
