//! Mesh parts and subparts.
//!
//! Parts map an index range to a material and carry per-face properties.
//! Subparts split parts further and are the unit triangles are tagged with.

use std::ops::Range;

use tagmesh_records::{PartRecord, SubpartRecord};

use crate::error::{DecodeError, DecodeResult};
use crate::indices::resolve_range;

/// Cull distance for faces of a part.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DrawDistance {
    #[default]
    Normal,
    DetailMid,
    DetailClose,
}

/// Tessellation density of a part.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Tessellation {
    #[default]
    None,
    Density4x,
    Density9x,
    Density36x,
}

impl Tessellation {
    fn from_raw(value: i32) -> Self {
        match value {
            1 => Self::Density4x,
            2 => Self::Density9x,
            3 => Self::Density36x,
            _ => Self::None,
        }
    }
}

/// `part type` value for parts that cast no shadow.
const PART_TYPE_NO_SHADOW: i32 = 3;
/// `part type` value for parts that only contribute to lightmaps.
const PART_TYPE_LIGHTMAP_ONLY: i32 = 5;

/// Face properties shared by every triangle of a part.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PartProperties {
    pub transparent: bool,
    pub draw_distance: DrawDistance,
    pub tessellation: Tessellation,
    pub water_surface: bool,
    pub no_shadow: bool,
    pub lightmap_only: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshPart {
    pub index: usize,
    /// Index into the model's material list, `None` for `-1`.
    pub material: Option<usize>,
    pub indices: Range<usize>,
    pub properties: PartProperties,
}

impl MeshPart {
    /// Build a part, checking its material and index range.
    pub fn from_record(
        mesh: usize,
        index: usize,
        record: &PartRecord,
        material_count: usize,
        index_count: usize,
    ) -> DecodeResult<Self> {
        let material = match usize::try_from(record.render_method_index) {
            Ok(material) if material < material_count => Some(material),
            Err(_) if record.render_method_index == -1 => None,
            _ => {
                return Err(DecodeError::UnresolvedMaterial {
                    mesh,
                    part: index,
                    material: record.render_method_index,
                });
            }
        };

        let draw_distance = if record.flags.draw_cull_distance_close {
            DrawDistance::DetailClose
        } else if record.flags.draw_cull_distance_medium {
            DrawDistance::DetailMid
        } else {
            DrawDistance::Normal
        };

        Ok(Self {
            index,
            material,
            indices: resolve_range(mesh, record.index_start, record.index_count, index_count)?,
            properties: PartProperties {
                transparent: record.transparent_sorting_index > -1,
                draw_distance,
                tessellation: Tessellation::from_raw(record.tessellation),
                water_surface: record.flags.is_water_surface,
                no_shadow: record.part_type == PART_TYPE_NO_SHADOW,
                lightmap_only: record.part_type == PART_TYPE_LIGHTMAP_ONLY,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshSubpart {
    pub index: usize,
    /// Resolved index range; a `-1` count has already been expanded.
    pub indices: Range<usize>,
    pub part: usize,
}

impl MeshSubpart {
    /// Build a subpart and resolve it against the already-built parts.
    ///
    /// The subpart must reference an existing part and lie inside its range.
    pub fn from_record(
        mesh: usize,
        index: usize,
        record: &SubpartRecord,
        parts: &[MeshPart],
        index_count: usize,
    ) -> DecodeResult<Self> {
        let part = usize::try_from(record.part_index)
            .ok()
            .filter(|&part| part < parts.len())
            .ok_or_else(|| {
                DecodeError::index_buffer(
                    mesh,
                    format!(
                        "subpart {index} references part {} of {}",
                        record.part_index,
                        parts.len()
                    ),
                )
            })?;
        let indices = resolve_range(mesh, record.index_start, record.index_count, index_count)?;
        let owner = &parts[part].indices;
        if indices.start < owner.start || indices.end > owner.end {
            return Err(DecodeError::index_buffer(
                mesh,
                format!("subpart {index} range {indices:?} escapes part {part} range {owner:?}"),
            ));
        }
        Ok(Self {
            index,
            indices,
            part,
        })
    }
}

/// Build every part of a mesh.
pub fn build_parts(
    mesh: usize,
    records: &[PartRecord],
    material_count: usize,
    index_count: usize,
) -> DecodeResult<Vec<MeshPart>> {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| MeshPart::from_record(mesh, i, record, material_count, index_count))
        .collect()
}

/// Build every subpart of a mesh against its parts.
pub fn build_subparts(
    mesh: usize,
    records: &[SubpartRecord],
    parts: &[MeshPart],
    index_count: usize,
) -> DecodeResult<Vec<MeshSubpart>> {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| MeshSubpart::from_record(mesh, i, record, parts, index_count))
        .collect()
}

/// How well a set of subparts covers an index buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Coverage {
    /// Uncovered stretches of `0..total`.
    pub gaps: usize,
    /// Places where a subpart starts before the previous one ended.
    pub overlaps: usize,
}

impl Coverage {
    #[must_use]
    pub fn is_exact(&self) -> bool {
        self.gaps == 0 && self.overlaps == 0
    }
}

/// Check that `subparts`, sorted, tile `0..total` with no gaps or overlaps.
#[must_use]
pub fn subpart_coverage(subparts: &[MeshSubpart], total: usize) -> Coverage {
    let mut ranges: Vec<_> = subparts.iter().map(|s| s.indices.clone()).collect();
    ranges.sort_by_key(|r| (r.start, r.end));

    let mut coverage = Coverage::default();
    let mut end = 0;
    for range in ranges {
        if range.start > end {
            coverage.gaps += 1;
        } else if range.start < end {
            coverage.overlaps += 1;
        }
        end = end.max(range.end);
    }
    if end < total {
        coverage.gaps += 1;
    }
    coverage
}

/// A property value for a whole mesh, or `None` when parts disagree.
#[must_use]
pub fn uniform<T: PartialEq + Copy>(
    parts: &[MeshPart],
    property: impl Fn(&PartProperties) -> T,
) -> Option<T> {
    let (first, rest) = parts.split_first()?;
    let value = property(&first.properties);
    rest.iter()
        .all(|part| property(&part.properties) == value)
        .then_some(value)
}
