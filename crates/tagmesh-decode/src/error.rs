//! Fatal decode errors.

use thiserror::Error;

/// A data-corruption condition that aborts decoding of the current unit
/// (one mesh, one skeleton or one instance table).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("malformed index buffer in mesh {mesh}: {reason}")]
    MalformedIndexBuffer { mesh: usize, reason: String },

    #[error("unsupported index buffer topology {0}")]
    UnsupportedTopology(i32),

    #[error("mesh {mesh} has geometry but the model has no compression info")]
    MissingCompressionInfo { mesh: usize },

    #[error("compression bounds are not finite")]
    NonFiniteCompressionBounds,

    #[error("malformed vertex stream in mesh {mesh}: {reason}")]
    MalformedVertexStream { mesh: usize, reason: String },

    #[error("part {part} of mesh {mesh} references missing material {material}")]
    UnresolvedMaterial {
        mesh: usize,
        part: usize,
        material: i32,
    },

    #[error("mesh {mesh} references node {node} but the skeleton has {node_count} nodes")]
    UnresolvedMeshNode {
        mesh: usize,
        node: usize,
        node_count: usize,
    },

    #[error("node '{node}' references parent {parent} which is not declared before it")]
    UnresolvedSkeletonParent { node: String, parent: i32 },

    #[error("instance placement '{name}' has non-orthonormal axes")]
    NonOrthonormalPlacement { name: String },
}

impl DecodeError {
    pub(crate) fn index_buffer(mesh: usize, reason: impl Into<String>) -> Self {
        Self::MalformedIndexBuffer {
            mesh,
            reason: reason.into(),
        }
    }

    pub(crate) fn vertex_stream(mesh: usize, reason: impl Into<String>) -> Self {
        Self::MalformedVertexStream {
            mesh,
            reason: reason.into(),
        }
    }
}

/// Result type for decode operations.
pub type DecodeResult<T> = Result<T, DecodeError>;
