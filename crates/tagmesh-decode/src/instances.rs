//! Instance placement resolution.

use glam::{Mat4, Vec3};
use tagmesh_records::InstancePlacementRecord;

use crate::WORLD_UNITS_PER_TAG_UNIT;
use crate::diagnostics::{Decoded, Diagnostic, Diagnostics};
use crate::error::{DecodeError, DecodeResult};
use crate::mesh::Placement;
use crate::skeleton::Skeleton;

/// Tolerance for unit length and mutual orthogonality of placement axes.
const ORTHONORMAL_TOLERANCE: f32 = 1e-3;

/// Strip the trailing `__suffix` the toolchain appends to placement names.
#[must_use]
pub fn instance_name(raw: &str) -> &str {
    match raw.rfind("__") {
        Some(at) if at > 0 => &raw[..at],
        _ => raw,
    }
}

/// One positioned copy of a shared geometry definition.
#[derive(Debug, Clone, PartialEq)]
pub struct InstancePlacement {
    pub index: usize,
    pub name: String,
    pub definition: i32,
    /// Raw owning node; `-1` places the instance in world space.
    pub node: i32,
    pub scale: f32,
    pub forward: Vec3,
    pub left: Vec3,
    pub up: Vec3,
    /// World units.
    pub position: Vec3,
}

impl InstancePlacement {
    #[must_use]
    pub fn from_record(index: usize, record: &InstancePlacementRecord) -> Self {
        Self {
            index,
            name: instance_name(&record.name).to_owned(),
            definition: record.definition_index,
            node: record.node_index,
            scale: record.scale,
            forward: Vec3::from(record.forward),
            left: Vec3::from(record.left),
            up: Vec3::from(record.up),
            position: Vec3::from(record.position) * WORLD_UNITS_PER_TAG_UNIT,
        }
    }

    fn is_orthonormal(&self) -> bool {
        let axes = [self.forward, self.left, self.up];
        let unit = axes
            .iter()
            .all(|axis| (axis.length() - 1.0).abs() <= ORTHONORMAL_TOLERANCE);
        let orthogonal = [(0, 1), (0, 2), (1, 2)]
            .iter()
            .all(|&(a, b)| axes[a].dot(axes[b]).abs() <= ORTHONORMAL_TOLERANCE);
        unit && orthogonal
    }

    /// Rotation from the three axes plus translation, without scale.
    ///
    /// Axes are checked but never re-orthonormalized.
    pub fn matrix(&self) -> DecodeResult<Mat4> {
        if !self.is_orthonormal() {
            return Err(DecodeError::NonOrthonormalPlacement {
                name: self.name.clone(),
            });
        }
        Ok(Mat4::from_cols(
            self.forward.extend(0.0),
            self.left.extend(0.0),
            self.up.extend(0.0),
            self.position.extend(1.0),
        ))
    }
}

/// A placement with its matrices resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedInstance {
    pub index: usize,
    pub name: String,
    pub definition: usize,
    pub node: Option<usize>,
    pub bone: Option<String>,
    /// Relative to the bone when `node` is set, otherwise equal to `world`.
    pub local: Mat4,
    pub world: Mat4,
    /// Uniform scale applied to the placed object, not part of the matrices.
    pub scale: f32,
}

impl ResolvedInstance {
    /// Rigid placement for reconstructing the definition's geometry.
    #[must_use]
    pub fn placement(&self) -> Placement {
        Placement {
            node: self.node,
            local: self.local,
        }
    }
}

/// Resolve one placement.
///
/// Returns `Ok(None)` when the definition is missing. An unknown node places
/// the instance in world space. Both are reported to `diagnostics`.
pub fn resolve_instance(
    placement: &InstancePlacement,
    definition_count: usize,
    skeleton: &Skeleton,
    diagnostics: &mut Diagnostics,
) -> DecodeResult<Option<ResolvedInstance>> {
    let local = placement.matrix()?;

    let Some(definition) = usize::try_from(placement.definition)
        .ok()
        .filter(|&definition| definition < definition_count)
    else {
        diagnostics.push(Diagnostic::UnresolvedInstanceDefinition {
            name: placement.name.clone(),
            definition: placement.definition,
        });
        return Ok(None);
    };

    let bone = match placement.node {
        -1 => None,
        node => {
            let bone = skeleton.bone_by_raw(node);
            if bone.is_none() {
                diagnostics.push(Diagnostic::UnresolvedInstanceNode {
                    name: placement.name.clone(),
                    node,
                });
            }
            bone
        }
    };

    Ok(Some(ResolvedInstance {
        index: placement.index,
        name: placement.name.clone(),
        definition,
        node: bone.map(|bone| bone.index),
        bone: bone.map(|bone| bone.name.clone()),
        local,
        world: bone.map_or(local, |bone| bone.world * local),
        scale: placement.scale,
    }))
}

/// Resolve every placement independently.
pub fn resolve_instances(
    placements: &[InstancePlacement],
    definition_count: usize,
    skeleton: &Skeleton,
) -> DecodeResult<Decoded<Vec<ResolvedInstance>>> {
    let mut diagnostics = Diagnostics::new();
    let mut resolved = Vec::with_capacity(placements.len());
    for placement in placements {
        if let Some(instance) =
            resolve_instance(placement, definition_count, skeleton, &mut diagnostics)?
        {
            resolved.push(instance);
        }
    }
    Ok(Decoded::new(resolved, diagnostics))
}
