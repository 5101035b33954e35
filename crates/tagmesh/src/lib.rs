//! Import render model tags into engine-neutral scene data.
//!
//! This crate ties tag access to the pure decode stages in
//! [`tagmesh_decode`]. A [`TagBackend`] opens tags, [`resolve`] turns tag
//! fields into [`tagmesh_records`] and [`import_render_model`] runs the
//! decode pipeline over them.
//!
//! # Design principles
//!
//! - **Explicit tag access**: Backends are passed in and have an
//!   initialize/shutdown lifecycle
//! - **Records at the seam**: Decode stages never see field paths
//! - **Opt-in parallelism**: Mesh reconstruction fans out over rayon when
//!   the `parallel` feature is enabled
//!
//! # Key functions
//!
//! - [`import_tag`]: Open, resolve and import a render model tag
//! - [`import_render_model`]: Import an already resolved record
//! - [`resolve_render_model`]: Read a render model tag into records

mod error;

pub mod import;
pub mod json;
pub mod resolve;
pub mod source;

pub use error::{Error, Result};
pub use import::{
    ImportOptions, PermutationSelection, PlacedInstance, RenderModelImport, RenderObject,
    import_render_model, import_tag,
};
pub use json::JsonTagBackend;
pub use resolve::resolve_render_model;
pub use source::{TagBackend, TagFields};

pub use tagmesh_decode;
pub use tagmesh_records;
