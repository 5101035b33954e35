//! Mesh reconstruction.
//!
//! A [`Mesh`] owns the flat vertex streams and index buffer of one tag mesh.
//! [`reconstruct`] decodes its triangles, slices the streams down to the
//! vertices a selection actually uses, dequantizes them and attaches skin or
//! rigid binding data.

use std::ops::Range;

use glam::{Mat4, Vec2, Vec3};
use tagmesh_records::{MeshRecord, MeshStreamsRecord};

use crate::bounds::CompressionBounds;
use crate::error::{DecodeError, DecodeResult};
use crate::faces::{TwoSided, find_twin_faces};
use crate::indices::{IndexBufferType, decode_triangles};
use crate::partition::{
    Coverage, DrawDistance, MeshPart, MeshSubpart, Tessellation, build_parts, build_subparts,
    subpart_coverage, uniform,
};
use crate::{MAX_NODE_INDEX, MAX_NODE_INFLUENCES};

/// Meshes whose mean dimension is below this many world units need precise positions.
const PRECISE_POSITION_THRESHOLD: f32 = 20.0;

/// Flat per-vertex streams of a mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexStreams {
    /// Three normalized floats per vertex.
    pub positions: Vec<f32>,
    /// Two normalized floats per vertex, or empty.
    pub texcoords: Vec<f32>,
    /// Three floats per vertex, or empty.
    pub normals: Vec<f32>,
    /// Four influences per vertex, or empty.
    pub node_indices: Vec<i32>,
    /// Four weights per vertex, or empty.
    pub node_weights: Vec<f32>,
    /// Two floats per vertex, or empty.
    pub lightmap_texcoords: Vec<f32>,
    /// Three floats per vertex, or empty.
    pub vertex_colors: Vec<f32>,
}

impl VertexStreams {
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    #[must_use]
    pub fn has_skin(&self) -> bool {
        !self.node_indices.is_empty() && !self.node_weights.is_empty()
    }

    fn validate(&self, mesh: usize) -> DecodeResult<()> {
        if self.positions.len() % 3 != 0 {
            return Err(DecodeError::vertex_stream(
                mesh,
                format!("{} position floats is not a multiple of 3", self.positions.len()),
            ));
        }
        let count = self.vertex_count();
        let optional = [
            ("texcoords", self.texcoords.len(), 2),
            ("normals", self.normals.len(), 3),
            ("node indices", self.node_indices.len(), MAX_NODE_INFLUENCES),
            ("node weights", self.node_weights.len(), MAX_NODE_INFLUENCES),
            ("lightmap texcoords", self.lightmap_texcoords.len(), 2),
            ("vertex colors", self.vertex_colors.len(), 3),
        ];
        for (name, len, stride) in optional {
            if len != 0 && len != count * stride {
                return Err(DecodeError::vertex_stream(
                    mesh,
                    format!("{name} has {len} values, expected {} for {count} vertices", count * stride),
                ));
            }
        }
        Ok(())
    }
}

impl From<&MeshStreamsRecord> for VertexStreams {
    fn from(record: &MeshStreamsRecord) -> Self {
        Self {
            positions: record.positions.clone(),
            texcoords: record.texcoords.clone(),
            normals: record.normals.clone(),
            node_indices: record.node_indices.clone(),
            node_weights: record.node_weights.clone(),
            lightmap_texcoords: record.lightmap_texcoords.clone(),
            vertex_colors: record.vertex_colors.clone(),
        }
    }
}

/// One tag mesh with its partitioning and raw data.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub index: usize,
    /// Node the whole mesh is rigidly bound to, if any.
    pub rigid_node: Option<usize>,
    pub index_buffer_type: IndexBufferType,
    pub parts: Vec<MeshPart>,
    pub subparts: Vec<MeshSubpart>,
    pub indices: Vec<u32>,
    pub streams: VertexStreams,
    /// Maps influence indices to skeleton nodes. Empty means identity.
    pub node_map: Vec<i32>,
}

impl Mesh {
    /// Build a mesh from its tag element, vertex streams and node map.
    pub fn from_records(
        index: usize,
        record: &MeshRecord,
        streams: &MeshStreamsRecord,
        node_map: &[i32],
        material_count: usize,
    ) -> DecodeResult<Self> {
        let index_count = streams.indices.len();
        let parts = build_parts(index, &record.parts, material_count, index_count)?;
        let subparts = build_subparts(index, &record.subparts, &parts, index_count)?;
        let vertex_streams = VertexStreams::from(streams);
        vertex_streams.validate(index)?;

        Ok(Self {
            index,
            rigid_node: usize::try_from(record.rigid_node_index).ok(),
            index_buffer_type: IndexBufferType::try_from(record.index_buffer_type)?,
            parts,
            subparts,
            indices: streams.indices.clone(),
            streams: vertex_streams,
            node_map: node_map.to_vec(),
        })
    }

    /// A mesh without parts or subparts has no geometry to build.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.parts.is_empty() && !self.subparts.is_empty()
    }

    #[must_use]
    pub fn coverage(&self) -> Coverage {
        subpart_coverage(&self.subparts, self.indices.len())
    }

    /// Material of the part owning `subpart`.
    #[must_use]
    pub fn subpart_material(&self, subpart: usize) -> Option<usize> {
        let part = self.subparts.get(subpart)?.part;
        self.parts.get(part)?.material
    }

    /// Check that the rigid node and every skin influence name one of
    /// `node_count` skeleton nodes.
    pub fn check_nodes(&self, node_count: usize) -> DecodeResult<()> {
        let unresolved = |node| DecodeError::UnresolvedMeshNode {
            mesh: self.index,
            node,
            node_count,
        };
        if let Some(node) = self.rigid_node.filter(|&node| node >= node_count) {
            return Err(unresolved(node));
        }
        if self.rigid_node.is_some() || !self.streams.has_skin() {
            return Ok(());
        }

        let influences = self.streams.node_indices.iter().zip(&self.streams.node_weights);
        for (&influence, &weight) in influences {
            if !(0..=MAX_NODE_INDEX).contains(&influence) || weight <= 0.0 {
                continue;
            }
            let node = self.resolve_node(influence)?;
            if node >= node_count {
                return Err(unresolved(node));
            }
        }
        Ok(())
    }

    fn resolve_node(&self, influence: i32) -> DecodeResult<usize> {
        if self.node_map.is_empty() {
            return Ok(influence as usize);
        }
        self.node_map
            .get(influence as usize)
            .and_then(|&node| usize::try_from(node).ok())
            .ok_or_else(|| {
                DecodeError::vertex_stream(
                    self.index,
                    format!(
                        "influence {influence} is not in the node map of {} entries",
                        self.node_map.len()
                    ),
                )
            })
    }
}

/// Which triangles of a mesh to reconstruct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Selection {
    /// Every subpart, merged into one object.
    #[default]
    Whole,
    /// A single subpart.
    Subpart(usize),
}

impl Selection {
    fn accepts(self, subpart: usize) -> bool {
        match self {
            Self::Whole => true,
            Self::Subpart(selected) => selected == subpart,
        }
    }
}

/// Rigid placement applied to a reconstructed object, used by instances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Node to follow. Replaces the mesh's rigid node; `None` places the
    /// object in world space even when the mesh is rigid.
    pub node: Option<usize>,
    /// Matrix relative to the node, or a world matrix without a node.
    pub local: Mat4,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconstructOptions {
    pub selection: Selection,
    /// Read per-vertex skin weights when the mesh is not rigid.
    pub skin: bool,
    pub placement: Option<Placement>,
    /// Collapse reverse-wound twin faces into two-sided faces.
    pub merge_two_sided: bool,
}

impl Default for ReconstructOptions {
    fn default() -> Self {
        Self {
            selection: Selection::Whole,
            skin: true,
            placement: None,
            merge_two_sided: true,
        }
    }
}

/// How a reconstructed object attaches to the skeleton.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Binding {
    /// Deformed by per-vertex weights in [`SubMesh::skin`].
    Skinned,
    /// Follows one node; `local` is relative to that node's world matrix.
    Rigid { node: usize, local: Mat4 },
    /// Not attached to the skeleton.
    World { matrix: Mat4 },
}

/// One weighted influence of a node on a vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkinWeight {
    /// Vertex index within the reconstructed object.
    pub vertex: u32,
    pub node: usize,
    pub weight: f32,
}

/// Mesh-wide face properties. A `None` field means parts disagree and the
/// value must be read per face through [`SubMesh::triangle_parts`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshProperties {
    pub transparent: Option<bool>,
    pub draw_distance: Option<DrawDistance>,
    pub tessellation: Option<Tessellation>,
    pub no_shadow: Option<bool>,
    pub lightmap_only: Option<bool>,
}

impl MeshProperties {
    fn of(parts: &[MeshPart]) -> Self {
        Self {
            transparent: uniform(parts, |p| p.transparent),
            draw_distance: uniform(parts, |p| p.draw_distance),
            tessellation: uniform(parts, |p| p.tessellation),
            no_shadow: uniform(parts, |p| p.no_shadow),
            lightmap_only: uniform(parts, |p| p.lightmap_only),
        }
    }
}

/// A reconstructed, self-contained sub-object.
#[derive(Debug, Clone, PartialEq)]
pub struct SubMesh {
    pub mesh: usize,
    pub subpart: Option<usize>,
    /// Index of the first source vertex; triangle indices are relative to it.
    pub vertex_offset: usize,
    /// World-unit positions.
    pub positions: Vec<Vec3>,
    /// Unit-length normals.
    pub normals: Option<Vec<Vec3>>,
    /// Dequantized, V-flipped texcoords.
    pub uvs: Option<Vec<Vec2>>,
    pub lightmap_uvs: Option<Vec<Vec2>>,
    pub colors: Option<Vec<Vec3>>,
    pub triangles: Vec<[u32; 3]>,
    /// Owning part of each triangle.
    pub triangle_parts: Vec<usize>,
    /// Material slot of each triangle, indexing [`SubMesh::materials`].
    pub triangle_materials: Vec<u32>,
    /// Material slots, as indices into the model's material list.
    pub materials: Vec<Option<usize>>,
    pub skin: Vec<SkinWeight>,
    pub binding: Binding,
    pub properties: MeshProperties,
    pub two_sided: TwoSided,
    pub precise_position: bool,
}

impl SubMesh {
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Axis-aligned size of the positions.
    #[must_use]
    pub fn dimensions(&self) -> Vec3 {
        let Some(&first) = self.positions.first() else {
            return Vec3::ZERO;
        };
        let (min, max) = self
            .positions
            .iter()
            .fold((first, first), |(min, max), &p| (min.min(p), max.max(p)));
        max - min
    }
}

/// Reconstruct the selected triangles of `mesh` into a [`SubMesh`].
///
/// Returns `None` for meshes without parts or subparts and for selections
/// that produce no triangles.
pub fn reconstruct(
    mesh: &Mesh,
    bounds: &CompressionBounds,
    options: &ReconstructOptions,
) -> DecodeResult<Option<SubMesh>> {
    if !mesh.is_valid() {
        return Ok(None);
    }
    if let Selection::Subpart(subpart) = options.selection {
        if subpart >= mesh.subparts.len() {
            return Err(DecodeError::index_buffer(
                mesh.index,
                format!("subpart {subpart} of {} selected", mesh.subparts.len()),
            ));
        }
    }

    let ranges: Vec<Range<usize>> = mesh.subparts.iter().map(|s| s.indices.clone()).collect();
    let triangles: Vec<_> = decode_triangles(mesh.index, mesh.index_buffer_type, &mesh.indices, &ranges)?
        .filter(|t| options.selection.accepts(t.subpart))
        .collect();
    if triangles.is_empty() {
        return Ok(None);
    }

    let (low, high) = triangles
        .iter()
        .flat_map(|t| t.indices)
        .fold((u32::MAX, 0), |(low, high), i| (low.min(i), high.max(i)));
    let vertices = low as usize..high as usize + 1;
    if vertices.end > mesh.streams.vertex_count() {
        return Err(DecodeError::vertex_stream(
            mesh.index,
            format!(
                "triangles reference vertex {high} of {}",
                mesh.streams.vertex_count()
            ),
        ));
    }

    let streams = &mesh.streams;
    let positions = slice3(&streams.positions, &vertices)
        .map(|p| bounds.dequantize(p))
        .collect::<Vec<_>>();
    let normals = (!streams.normals.is_empty())
        .then(|| slice3(&streams.normals, &vertices).map(Vec3::normalize_or_zero).collect());
    let uvs = (!streams.texcoords.is_empty())
        .then(|| slice2(&streams.texcoords, &vertices).map(|uv| bounds.dequantize_uv(uv)).collect());
    let lightmap_uvs = nonzero(&streams.lightmap_texcoords)
        .then(|| slice2(&streams.lightmap_texcoords, &vertices).collect());
    let colors = nonzero(&streams.vertex_colors)
        .then(|| slice3(&streams.vertex_colors, &vertices).collect());

    // Material slots in first-use order of the selected subparts.
    let mut materials = Vec::new();
    let mut subpart_slots = vec![0u32; mesh.subparts.len()];
    for (i, subpart) in mesh.subparts.iter().enumerate() {
        if !options.selection.accepts(i) {
            continue;
        }
        let material = mesh.subpart_material(i);
        let slot = match materials.iter().position(|&m| m == material) {
            Some(slot) => slot,
            None => {
                materials.push(material);
                materials.len() - 1
            }
        };
        subpart_slots[subpart.index] = slot as u32;
    }

    let mut rebased = Vec::with_capacity(triangles.len());
    let mut triangle_parts = Vec::with_capacity(triangles.len());
    let mut triangle_materials = Vec::with_capacity(triangles.len());
    for triangle in &triangles {
        rebased.push(triangle.indices.map(|i| i - low));
        triangle_parts.push(mesh.subparts[triangle.subpart].part);
        triangle_materials.push(subpart_slots[triangle.subpart]);
    }

    let binding = resolve_binding(mesh, options);
    let skin = if binding == Binding::Skinned {
        skin_weights(mesh, &vertices)?
    } else {
        Vec::new()
    };

    let mut sub_mesh = SubMesh {
        mesh: mesh.index,
        subpart: match options.selection {
            Selection::Whole => None,
            Selection::Subpart(subpart) => Some(subpart),
        },
        vertex_offset: vertices.start,
        positions,
        normals,
        uvs,
        lightmap_uvs,
        colors,
        triangles: rebased,
        triangle_parts,
        triangle_materials,
        materials,
        skin,
        binding,
        properties: MeshProperties::of(&mesh.parts),
        two_sided: TwoSided::None,
        precise_position: false,
    };
    if options.merge_two_sided {
        merge_two_sided(&mut sub_mesh);
    }
    sub_mesh.precise_position =
        sub_mesh.dimensions().element_sum() / 3.0 < PRECISE_POSITION_THRESHOLD;

    Ok(Some(sub_mesh))
}

fn resolve_binding(mesh: &Mesh, options: &ReconstructOptions) -> Binding {
    if let Some(placement) = options.placement {
        return match placement.node {
            Some(node) => Binding::Rigid {
                node,
                local: placement.local,
            },
            None => Binding::World {
                matrix: placement.local,
            },
        };
    }
    match mesh.rigid_node {
        Some(node) => Binding::Rigid {
            node,
            local: Mat4::IDENTITY,
        },
        None if options.skin && mesh.streams.has_skin() => Binding::Skinned,
        None => Binding::World {
            matrix: Mat4::IDENTITY,
        },
    }
}

fn skin_weights(mesh: &Mesh, vertices: &Range<usize>) -> DecodeResult<Vec<SkinWeight>> {
    let span = vertices.start * MAX_NODE_INFLUENCES..vertices.end * MAX_NODE_INFLUENCES;
    let indices = mesh.streams.node_indices[span.clone()].chunks_exact(MAX_NODE_INFLUENCES);
    let weights = mesh.streams.node_weights[span].chunks_exact(MAX_NODE_INFLUENCES);

    let mut skin = Vec::new();
    for (vertex, (indices, weights)) in indices.zip(weights).enumerate() {
        for (&influence, &weight) in indices.iter().zip(weights) {
            if !(0..=MAX_NODE_INDEX).contains(&influence) || weight <= 0.0 {
                continue;
            }
            skin.push(SkinWeight {
                vertex: vertex as u32,
                node: mesh.resolve_node(influence)?,
                weight,
            });
        }
    }
    Ok(skin)
}

fn merge_two_sided(sub_mesh: &mut SubMesh) {
    let twins = find_twin_faces(&sub_mesh.positions, &sub_mesh.triangles);
    if !twins.any() {
        return;
    }
    sub_mesh.triangles = kept(std::mem::take(&mut sub_mesh.triangles), &twins.removed);
    sub_mesh.triangle_parts = kept(std::mem::take(&mut sub_mesh.triangle_parts), &twins.removed);
    sub_mesh.triangle_materials =
        kept(std::mem::take(&mut sub_mesh.triangle_materials), &twins.removed);

    let flags = kept(twins.two_sided, &twins.removed);
    sub_mesh.two_sided = if flags.iter().all(|&flag| flag) {
        TwoSided::Whole
    } else {
        TwoSided::PerFace(flags)
    };
}

fn kept<T>(values: Vec<T>, removed: &[bool]) -> Vec<T> {
    values
        .into_iter()
        .zip(removed)
        .filter_map(|(value, &removed)| (!removed).then_some(value))
        .collect()
}

fn slice3<'a>(values: &'a [f32], vertices: &Range<usize>) -> impl Iterator<Item = Vec3> + 'a {
    values[vertices.start * 3..vertices.end * 3]
        .chunks_exact(3)
        .map(Vec3::from_slice)
}

fn slice2<'a>(values: &'a [f32], vertices: &Range<usize>) -> impl Iterator<Item = Vec2> + 'a {
    values[vertices.start * 2..vertices.end * 2]
        .chunks_exact(2)
        .map(Vec2::from_slice)
}

fn nonzero(values: &[f32]) -> bool {
    values.iter().any(|&v| v != 0.0)
}
