//! Skeleton reconstruction.
//!
//! Bones are built in two passes: every local matrix first, then world
//! matrices top-down in declaration order. Parents must therefore be declared
//! before their children, which [`build_skeleton`] checks.

use glam::{Mat3, Mat4, Quat, Vec3};
use tagmesh_records::NodeRecord;

use crate::WORLD_UNITS_PER_TAG_UNIT;
use crate::diagnostics::{Decoded, Diagnostic, Diagnostics};
use crate::error::{DecodeError, DecodeResult};

/// Determinants below this are treated as singular.
const SINGULAR_DETERMINANT: f32 = 1e-8;

/// A skeleton joint as declared in the tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub index: usize,
    pub name: String,
    /// Raw parent index; `-1` for roots.
    pub parent: i32,
    /// Default local translation in world units.
    pub translation: Vec3,
    pub rotation: Quat,
    pub inverse_forward: Vec3,
    pub inverse_left: Vec3,
    pub inverse_up: Vec3,
    /// Inverse bind position in world units.
    pub inverse_position: Vec3,
    pub inverse_scale: f32,
}

impl Node {
    #[must_use]
    pub fn from_record(index: usize, record: &NodeRecord) -> Self {
        let [i, j, k, w] = record.default_rotation;
        let rotation = Quat::from_xyzw(i, j, k, w);
        let rotation = if rotation.length_squared() > 0.0 {
            rotation.normalize()
        } else {
            Quat::IDENTITY
        };
        Self {
            index,
            name: record.name.clone(),
            parent: record.parent_node,
            translation: Vec3::from(record.default_translation) * WORLD_UNITS_PER_TAG_UNIT,
            rotation,
            inverse_forward: Vec3::from(record.inverse_forward),
            inverse_left: Vec3::from(record.inverse_left),
            inverse_up: Vec3::from(record.inverse_up),
            inverse_position: Vec3::from(record.inverse_position) * WORLD_UNITS_PER_TAG_UNIT,
            inverse_scale: record.inverse_scale,
        }
    }

    /// Edit-time matrix: `Translation(translation) * Rotation(rotation)`.
    #[must_use]
    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.translation)
    }

    /// Bind pose recomposed from the inverse fields, or `None` when the
    /// composed inverse matrix cannot be inverted.
    ///
    /// Kept for parity with content authored against it. World matrices never
    /// use it.
    #[must_use]
    pub fn legacy_bind_pose(&self) -> Option<Mat4> {
        let rotation = Mat3::from_cols(self.inverse_forward, self.inverse_left, self.inverse_up)
            .transpose();
        let inverse = Mat4::from_translation(self.inverse_position)
            * Mat4::from_mat3(rotation)
            * Mat4::from_scale(Vec3::splat(self.inverse_scale));
        let determinant = inverse.determinant();
        (determinant.is_finite() && determinant.abs() > SINGULAR_DETERMINANT)
            .then(|| inverse.inverse())
    }
}

/// A reconstructed bone.
#[derive(Debug, Clone, PartialEq)]
pub struct Bone {
    pub index: usize,
    pub name: String,
    pub parent: Option<usize>,
    pub local: Mat4,
    pub world: Mat4,
    /// Identity when the inverse fields were singular.
    pub legacy_bind_pose: Mat4,
}

/// A parented bone hierarchy in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Skeleton {
    bones: Vec<Bone>,
}

impl Skeleton {
    #[must_use]
    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    #[must_use]
    pub fn bone(&self, index: usize) -> Option<&Bone> {
        self.bones.get(index)
    }

    /// Look up a bone by raw tag index; negative indices never resolve.
    #[must_use]
    pub fn bone_by_raw(&self, index: i32) -> Option<&Bone> {
        usize::try_from(index).ok().and_then(|index| self.bone(index))
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Bone> {
        self.bones.iter().find(|bone| bone.name == name)
    }

    pub fn roots(&self) -> impl Iterator<Item = &Bone> {
        self.bones.iter().filter(|bone| bone.parent.is_none())
    }

    pub fn children(&self, index: usize) -> impl Iterator<Item = &Bone> {
        self.bones
            .iter()
            .filter(move |bone| bone.parent == Some(index))
    }

    /// World matrix of `index`, identity for unknown bones.
    #[must_use]
    pub fn world_matrix(&self, index: usize) -> Mat4 {
        self.bone(index).map_or(Mat4::IDENTITY, |bone| bone.world)
    }
}

/// Build a skeleton from its nodes.
///
/// Fails with [`DecodeError::UnresolvedSkeletonParent`] when a node names a
/// parent that is not declared before it. Singular legacy bind poses are
/// reported as diagnostics.
pub fn build_skeleton(nodes: &[Node]) -> DecodeResult<Decoded<Skeleton>> {
    let mut diagnostics = Diagnostics::new();

    let mut bones = Vec::with_capacity(nodes.len());
    for (position, node) in nodes.iter().enumerate() {
        let parent = match node.parent {
            -1 => None,
            raw => match usize::try_from(raw) {
                Ok(parent) if parent < position => Some(parent),
                _ => {
                    return Err(DecodeError::UnresolvedSkeletonParent {
                        node: node.name.clone(),
                        parent: raw,
                    });
                }
            },
        };
        let legacy_bind_pose = node.legacy_bind_pose().unwrap_or_else(|| {
            diagnostics.push(Diagnostic::SingularSkeletonTransform {
                node: node.name.clone(),
            });
            Mat4::IDENTITY
        });
        let local = node.local_matrix();
        bones.push(Bone {
            index: position,
            name: node.name.clone(),
            parent,
            local,
            world: local,
            legacy_bind_pose,
        });
    }

    for position in 0..bones.len() {
        if let Some(parent) = bones[position].parent {
            bones[position].world = bones[parent].world * bones[position].local;
        }
    }

    tracing::debug!("built skeleton with {} bones", bones.len());
    Ok(Decoded::new(Skeleton { bones }, diagnostics))
}

/// Convert node records and build the skeleton.
pub fn skeleton_from_records(records: &[NodeRecord]) -> DecodeResult<Decoded<Skeleton>> {
    let nodes: Vec<_> = records
        .iter()
        .enumerate()
        .map(|(index, record)| Node::from_record(index, record))
        .collect();
    build_skeleton(&nodes)
}
