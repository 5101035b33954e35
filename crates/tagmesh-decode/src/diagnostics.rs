//! Recoverable conditions reported alongside a successful decode.

use std::fmt;

/// A condition that skipped or altered one element without aborting the decode.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// The inverse bind pose of a node could not be inverted; identity was used.
    SingularSkeletonTransform { node: String },
    /// A clone permutation names a source permutation that was not built.
    UnresolvedCloneSource {
        permutation: String,
        clone_name: String,
    },
    /// A marker's region or permutation index does not resolve; the marker was dropped.
    UnresolvedMarkerRegion {
        group: String,
        marker: usize,
        region: i32,
        permutation: i32,
    },
    /// An instance placement references a missing geometry definition; it was skipped.
    UnresolvedInstanceDefinition { name: String, definition: i32 },
    /// An instance placement references a missing node; it was placed in world space.
    UnresolvedInstanceNode { name: String, node: i32 },
    /// The subparts of a mesh leave gaps or overlap in its index buffer.
    SubpartCoverage {
        mesh: usize,
        gaps: usize,
        overlaps: usize,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingularSkeletonTransform { node } => {
                write!(f, "inverse bind pose of node '{node}' is singular")
            }
            Self::UnresolvedCloneSource {
                permutation,
                clone_name,
            } => write!(
                f,
                "clone permutation '{permutation}' references unknown source '{clone_name}'"
            ),
            Self::UnresolvedMarkerRegion {
                group,
                marker,
                region,
                permutation,
            } => write!(
                f,
                "marker {marker} of group '{group}' references region {region} permutation {permutation}"
            ),
            Self::UnresolvedInstanceDefinition { name, definition } => write!(
                f,
                "instance '{name}' references missing definition {definition}"
            ),
            Self::UnresolvedInstanceNode { name, node } => {
                write!(f, "instance '{name}' references missing node {node}")
            }
            Self::SubpartCoverage {
                mesh,
                gaps,
                overlaps,
            } => write!(
                f,
                "subparts of mesh {mesh} leave {gaps} gaps and {overlaps} overlaps"
            ),
        }
    }
}

/// Accumulator for [`Diagnostic`]s. Every push is logged at `warn` level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        tracing::warn!("{diagnostic}");
        self.0.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.0
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A decoded value together with the diagnostics raised while producing it.
#[derive(Debug, Clone)]
pub struct Decoded<T> {
    pub value: T,
    pub diagnostics: Diagnostics,
}

impl<T> Decoded<T> {
    #[must_use]
    pub fn new(value: T, diagnostics: Diagnostics) -> Self {
        Self { value, diagnostics }
    }

    /// Move the diagnostics into `sink` and return the value.
    pub fn merge_into(self, sink: &mut Diagnostics) -> T {
        sink.extend(self.diagnostics);
        self.value
    }
}
