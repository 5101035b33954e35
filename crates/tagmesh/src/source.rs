//! Tag access capabilities.
//!
//! The importer never reaches into global state for tag access. Callers own a
//! [`TagBackend`], initialize it, open tags through it and shut it down when
//! done. Field paths are only read here and in [`crate::resolve`]; the decode
//! stages work on typed records.
//!
//! Paths are `/`-separated field names. Block elements are addressed as
//! `name[index]`, e.g. `render geometry/meshes[2]/parts[0]/index start`.

use crate::error::{Error, Result};

/// Process-wide tag access with an explicit lifecycle.
pub trait TagBackend {
    /// Start the backend. Opening tags before this fails with
    /// [`Error::BackendNotInitialized`].
    fn initialize(&mut self) -> Result<()>;

    /// Release the backend. It may be initialized again afterwards.
    fn shutdown(&mut self);

    fn is_initialized(&self) -> bool;

    /// Open the tag at `path`.
    fn open(&self, path: &str) -> Result<Box<dyn TagFields + '_>>;
}

/// Typed field access on one open tag.
pub trait TagFields {
    /// Path the tag was opened with.
    fn tag_path(&self) -> &str;

    fn has_field(&self, path: &str) -> bool;

    /// Number of elements in a block. Missing blocks are empty.
    fn element_count(&self, path: &str) -> Result<usize>;

    fn integer(&self, path: &str) -> Result<i64>;

    fn real(&self, path: &str) -> Result<f32>;

    fn reals(&self, path: &str) -> Result<Vec<f32>>;

    fn integers(&self, path: &str) -> Result<Vec<i64>>;

    fn string(&self, path: &str) -> Result<String>;

    /// Whether the named bit of a flags field is set.
    fn flag(&self, path: &str, bit: &str) -> Result<bool>;

    /// A 32-bit integer field.
    fn int32(&self, path: &str) -> Result<i32> {
        let value = self.integer(path)?;
        i32::try_from(value).map_err(|_| Error::FieldType {
            field: path.to_owned(),
            expected: "a 32-bit integer",
        })
    }
}

/// Read a fixed-size real tuple such as a vector or quaternion.
pub fn real_array<const N: usize>(fields: &dyn TagFields, path: &str) -> Result<[f32; N]> {
    let values = fields.reals(path)?;
    <[f32; N]>::try_from(values.as_slice()).map_err(|_| Error::FieldType {
        field: path.to_owned(),
        expected: "a real tuple of the expected size",
    })
}

/// Join a block path, element index and field name.
#[must_use]
pub fn element(block: &str, index: usize, field: &str) -> String {
    if field.is_empty() {
        format!("{block}[{index}]")
    } else {
        format!("{block}[{index}]/{field}")
    }
}
