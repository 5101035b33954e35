//! Typed field records for render model tags.
//!
//! These are the values the tag-access layer hands over once every field path
//! has been resolved. They mirror the tag layout closely (signed indices, `-1`
//! sentinels, raw tag units) and carry no decoding logic; interpretation lives in
//! `tagmesh-decode`.

use serde::{Deserialize, Serialize};

/// Sentinel used by tag block indices for "no element".
pub const NONE: i32 = -1;

/// Every field of a render model tag that the importer reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderModelRecord {
    /// Short name of the tag, used to name the skeleton.
    pub name: String,
    pub nodes: Vec<NodeRecord>,
    pub regions: Vec<RegionRecord>,
    pub materials: Vec<MaterialRecord>,
    /// `render geometry/compression info`. Only the first entry is used.
    pub compression_info: Vec<CompressionInfoRecord>,
    /// `render geometry/meshes`.
    pub meshes: Vec<MeshRecord>,
    /// `render geometry/per mesh temporary`, parallel to `meshes`.
    pub mesh_streams: Vec<MeshStreamsRecord>,
    /// `render geometry/per mesh node map`, parallel to `meshes` when present.
    pub mesh_node_maps: Vec<Vec<i32>>,
    /// Mesh holding one subpart per instance placement, or `-1`.
    pub instance_mesh_index: i32,
    pub instance_placements: Vec<InstancePlacementRecord>,
    pub marker_groups: Vec<MarkerGroupRecord>,
}

impl RenderModelRecord {
    /// Node map for a mesh, empty when the tag has none.
    #[must_use]
    pub fn node_map(&self, mesh_index: usize) -> &[i32] {
        self.mesh_node_maps
            .get(mesh_index)
            .map_or(&[], Vec::as_slice)
    }
}

/// One skeleton node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeRecord {
    pub name: String,
    pub parent_node: i32,
    /// Tag units.
    pub default_translation: [f32; 3],
    /// Quaternion stored as `(i, j, k, w)`.
    pub default_rotation: [f32; 4],
    pub inverse_forward: [f32; 3],
    pub inverse_left: [f32; 3],
    pub inverse_up: [f32; 3],
    /// Tag units.
    pub inverse_position: [f32; 3],
    pub inverse_scale: f32,
}

impl Default for NodeRecord {
    fn default() -> Self {
        Self {
            name: String::new(),
            parent_node: NONE,
            default_translation: [0.0; 3],
            default_rotation: [0.0, 0.0, 0.0, 1.0],
            inverse_forward: [1.0, 0.0, 0.0],
            inverse_left: [0.0, 1.0, 0.0],
            inverse_up: [0.0, 0.0, 1.0],
            inverse_position: [0.0; 3],
            inverse_scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionRecord {
    pub name: String,
    pub permutations: Vec<PermutationRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermutationRecord {
    pub name: String,
    pub mesh_index: i32,
    pub mesh_count: i32,
    /// Empty unless this permutation is a material-variant clone.
    pub clone_name: String,
    /// `instance mask 0-31`, `instance mask 32-63` and `instance mask 64-95`.
    pub instance_mask: [u32; 3],
}

impl Default for PermutationRecord {
    fn default() -> Self {
        Self {
            name: String::new(),
            mesh_index: NONE,
            mesh_count: 0,
            clone_name: String::new(),
            instance_mask: [0; 3],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialRecord {
    /// Short name of the render method.
    pub name: String,
    /// Relative path of the render method, with extension.
    pub shader_path: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionInfoRecord {
    /// `(x0, x1, y0)` in tag units.
    pub position_bounds_0: [f32; 3],
    /// `(y1, z0, z1)` in tag units.
    pub position_bounds_1: [f32; 3],
    /// `(u0, u1)`.
    pub texcoord_bounds_0: [f32; 2],
    /// `(v0, v1)`.
    pub texcoord_bounds_1: [f32; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshRecord {
    pub rigid_node_index: i32,
    pub index_buffer_type: i32,
    pub parts: Vec<PartRecord>,
    pub subparts: Vec<SubpartRecord>,
}

impl Default for MeshRecord {
    fn default() -> Self {
        Self {
            rigid_node_index: NONE,
            index_buffer_type: 3,
            parts: Vec::new(),
            subparts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartRecord {
    pub render_method_index: i32,
    pub transparent_sorting_index: i32,
    pub index_start: i32,
    pub index_count: i32,
    pub part_type: i32,
    pub tessellation: i32,
    pub flags: PartFlagsRecord,
}

impl Default for PartRecord {
    fn default() -> Self {
        Self {
            render_method_index: NONE,
            transparent_sorting_index: NONE,
            index_start: 0,
            index_count: 0,
            part_type: 0,
            tessellation: 0,
            flags: PartFlagsRecord::default(),
        }
    }
}

/// `part flags` bits the importer reads, resolved by bit name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartFlagsRecord {
    pub is_water_surface: bool,
    pub draw_cull_distance_medium: bool,
    pub draw_cull_distance_close: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubpartRecord {
    pub index_start: i32,
    /// `-1` means "to the end of the index buffer".
    pub index_count: i32,
    pub part_index: i32,
}

/// Flattened vertex streams and raw indices of one mesh.
///
/// Positions and texcoords are normalized to the compression bounds. Node
/// indices and weights hold four influences per vertex and are empty for rigid
/// meshes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshStreamsRecord {
    pub positions: Vec<f32>,
    pub texcoords: Vec<f32>,
    pub normals: Vec<f32>,
    pub node_indices: Vec<i32>,
    pub node_weights: Vec<f32>,
    /// Two floats per vertex.
    pub lightmap_texcoords: Vec<f32>,
    /// Three floats per vertex.
    pub vertex_colors: Vec<f32>,
    pub indices: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstancePlacementRecord {
    pub name: String,
    pub definition_index: i32,
    pub node_index: i32,
    pub scale: f32,
    pub forward: [f32; 3],
    pub left: [f32; 3],
    pub up: [f32; 3],
    /// Tag units.
    pub position: [f32; 3],
}

impl Default for InstancePlacementRecord {
    fn default() -> Self {
        Self {
            name: String::new(),
            definition_index: 0,
            node_index: NONE,
            scale: 1.0,
            forward: [1.0, 0.0, 0.0],
            left: [0.0, 1.0, 0.0],
            up: [0.0, 0.0, 1.0],
            position: [0.0; 3],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerGroupRecord {
    pub name: String,
    pub markers: Vec<MarkerRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerRecord {
    pub region_index: i32,
    pub permutation_index: i32,
    pub node_index: i32,
    /// Tag units.
    pub translation: [f32; 3],
    /// Quaternion stored as `(i, j, k, w)`.
    pub rotation: [f32; 4],
    pub scale: f32,
    pub direction: [f32; 3],
}

impl Default for MarkerRecord {
    fn default() -> Self {
        Self {
            region_index: NONE,
            permutation_index: NONE,
            node_index: NONE,
            translation: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: 0.01,
            direction: [0.0; 3],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_tag_defaults() {
        let node: NodeRecord = serde_json::from_str(r#"{ "name": "pedestal" }"#).unwrap();
        assert_eq!(node.parent_node, NONE);
        assert_eq!(node.default_rotation, [0.0, 0.0, 0.0, 1.0]);
        assert!((node.inverse_scale - 1.0).abs() < f32::EPSILON);

        let permutation: PermutationRecord =
            serde_json::from_str(r#"{ "name": "base", "mesh_count": 2 }"#).unwrap();
        assert_eq!(permutation.mesh_index, NONE);
        assert!(permutation.clone_name.is_empty());
    }

    #[test]
    fn node_map_is_empty_when_absent() {
        let record = RenderModelRecord {
            mesh_node_maps: vec![vec![3, 4]],
            ..Default::default()
        };
        assert_eq!(record.node_map(0), &[3, 4]);
        assert!(record.node_map(1).is_empty());
    }
}
