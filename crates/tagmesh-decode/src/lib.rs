//! Decode compressed render geometry from tag records.
//!
//! This crate provides pure synchronous functions that turn the flat numeric
//! arrays of a render model tag into structured meshes, a bone hierarchy,
//! placed instances and reconciled markers. Nothing here touches files or
//! tag access; callers resolve field paths into [`tagmesh_records`] types
//! first and control any parallelism themselves.
//!
//! # Design principles
//!
//! - **Synchronous**: No async, no threading primitives
//! - **Deterministic**: Identical input always produces identical output
//! - **Typed failures**: Fatal corruption is a [`DecodeError`]; anything the
//!   decoder can skip is a [`Diagnostic`] returned next to the value
//!
//! # Key functions
//!
//! - [`CompressionBounds::dequantize`]: Map normalized positions into world units
//! - [`decode_triangles`]: Lazily decode triangle lists and strips per subpart
//! - [`reconstruct`]: Build a self-contained sub-mesh from a tag mesh
//! - [`build_skeleton`]: Two-pass bone hierarchy reconstruction
//! - [`resolve_instances`]: Compose world matrices for instance placements
//! - [`reconcile`]: Fold per-permutation duplicate markers

mod diagnostics;
mod error;

pub mod bounds;
pub mod faces;
pub mod indices;
pub mod instances;
pub mod markers;
pub mod mesh;
pub mod partition;
pub mod regions;
pub mod skeleton;

pub use bounds::CompressionBounds;
pub use diagnostics::{Decoded, Diagnostic, Diagnostics};
pub use error::{DecodeError, DecodeResult};
pub use faces::{TwoSided, find_twin_faces};
pub use indices::{IndexBufferType, Triangle, Triangles, decode_triangles, strip_to_triangles};
pub use instances::{InstancePlacement, ResolvedInstance, resolve_instance, resolve_instances};
pub use markers::{MarkerGroup, MarkerKind, PlacedMarker, ReconciledMarker, build_marker_group, reconcile};
pub use mesh::{Binding, Mesh, Placement, ReconstructOptions, Selection, SkinWeight, SubMesh, reconstruct};
pub use partition::{MeshPart, MeshSubpart, PartProperties};
pub use regions::{CloneRemap, MaterialRemap, Permutation, PermutationFilter, Region, clone_remaps};
pub use skeleton::{Bone, Node, Skeleton, build_skeleton, skeleton_from_records};

/// Scale from tag units to world units, applied to every stored position.
pub const WORLD_UNITS_PER_TAG_UNIT: f32 = 100.0;

/// Maximum node influences per skinned vertex.
pub const MAX_NODE_INFLUENCES: usize = 4;

/// Largest node index a vertex influence may reference.
pub const MAX_NODE_INDEX: i32 = 254;
