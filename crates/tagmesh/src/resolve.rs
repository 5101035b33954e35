//! Field path resolution.
//!
//! Reads every field the importer needs from an open render model tag, once,
//! into a [`RenderModelRecord`]. Fields that older tag layouts lack (clone
//! names, lightmap texcoords, per mesh node maps) fall back to their record
//! defaults.

use tagmesh_records::{
    CompressionInfoRecord, InstancePlacementRecord, MarkerGroupRecord, MarkerRecord,
    MaterialRecord, MeshRecord, MeshStreamsRecord, NodeRecord, PartFlagsRecord, PartRecord,
    PermutationRecord, RegionRecord, RenderModelRecord, SubpartRecord,
};

use crate::error::Result;
use crate::source::{TagFields, element, real_array};

const RENDER_GEOMETRY: &str = "render geometry";
const INSTANCE_MASK_FIELDS: [&str; 3] = [
    "instance mask 0-31",
    "instance mask 32-63",
    "instance mask 64-95",
];

struct Reader<'a> {
    tag: &'a dyn TagFields,
}

impl Reader<'_> {
    fn int_or(&self, path: &str, default: i32) -> Result<i32> {
        if self.tag.has_field(path) {
            self.tag.int32(path)
        } else {
            Ok(default)
        }
    }

    fn real_or(&self, path: &str, default: f32) -> Result<f32> {
        if self.tag.has_field(path) {
            self.tag.real(path)
        } else {
            Ok(default)
        }
    }

    fn string_or_empty(&self, path: &str) -> Result<String> {
        if self.tag.has_field(path) {
            self.tag.string(path)
        } else {
            Ok(String::new())
        }
    }

    fn array_or<const N: usize>(&self, path: &str, default: [f32; N]) -> Result<[f32; N]> {
        if self.tag.has_field(path) {
            real_array(self.tag, path)
        } else {
            Ok(default)
        }
    }

    fn count(&self, path: &str) -> Result<usize> {
        self.tag.element_count(path)
    }

    fn nodes(&self) -> Result<Vec<NodeRecord>> {
        let defaults = NodeRecord::default();
        (0..self.count("nodes")?)
            .map(|i| -> Result<NodeRecord> {
                let field = |name: &str| element("nodes", i, name);
                Ok(NodeRecord {
                    name: self.string_or_empty(&field("name"))?,
                    parent_node: self.int_or(&field("parent node"), defaults.parent_node)?,
                    default_translation: self
                        .array_or(&field("default translation"), defaults.default_translation)?,
                    default_rotation: self
                        .array_or(&field("default rotation"), defaults.default_rotation)?,
                    inverse_forward: self
                        .array_or(&field("inverse forward"), defaults.inverse_forward)?,
                    inverse_left: self.array_or(&field("inverse left"), defaults.inverse_left)?,
                    inverse_up: self.array_or(&field("inverse up"), defaults.inverse_up)?,
                    inverse_position: self
                        .array_or(&field("inverse position"), defaults.inverse_position)?,
                    inverse_scale: self.real_or(&field("inverse scale"), defaults.inverse_scale)?,
                })
            })
            .collect()
    }

    fn instance_mask(&self, permutation: &str) -> Result<[u32; 3]> {
        let mut mask = [0u32; 3];
        for (word, field) in mask.iter_mut().zip(INSTANCE_MASK_FIELDS) {
            let path = format!("{permutation}/{field}");
            for bit in 0..u32::BITS {
                if self.tag.flag(&path, &bit.to_string())? {
                    *word |= 1u32 << bit;
                }
            }
        }
        Ok(mask)
    }

    fn regions(&self) -> Result<Vec<RegionRecord>> {
        (0..self.count("regions")?)
            .map(|r| -> Result<RegionRecord> {
                let region = element("regions", r, "");
                let block = format!("{region}/permutations");
                let permutations = (0..self.count(&block)?)
                    .map(|p| -> Result<PermutationRecord> {
                        let permutation = element(&block, p, "");
                        let field = |name: &str| format!("{permutation}/{name}");
                        Ok(PermutationRecord {
                            name: self.string_or_empty(&field("name"))?,
                            mesh_index: self.int_or(&field("mesh index"), -1)?,
                            mesh_count: self.int_or(&field("mesh count"), 0)?,
                            clone_name: self.string_or_empty(&field("clone name"))?,
                            instance_mask: self.instance_mask(&permutation)?,
                        })
                    })
                    .collect::<Result<_>>()?;
                Ok(RegionRecord {
                    name: self.string_or_empty(&format!("{region}/name"))?,
                    permutations,
                })
            })
            .collect()
    }

    fn materials(&self) -> Result<Vec<MaterialRecord>> {
        (0..self.count("materials")?)
            .map(|i| -> Result<MaterialRecord> {
                let shader_path = self.string_or_empty(&element("materials", i, "render method"))?;
                Ok(MaterialRecord {
                    name: material_name(&shader_path).to_owned(),
                    shader_path,
                })
            })
            .collect()
    }

    fn compression_info(&self) -> Result<Vec<CompressionInfoRecord>> {
        let block = format!("{RENDER_GEOMETRY}/compression info");
        (0..self.count(&block)?)
            .map(|i| -> Result<CompressionInfoRecord> {
                let field = |name: &str| element(&block, i, name);
                Ok(CompressionInfoRecord {
                    position_bounds_0: real_array(self.tag, &field("position bounds 0"))?,
                    position_bounds_1: real_array(self.tag, &field("position bounds 1"))?,
                    texcoord_bounds_0: real_array(self.tag, &field("texcoord bounds 0"))?,
                    texcoord_bounds_1: real_array(self.tag, &field("texcoord bounds 1"))?,
                })
            })
            .collect()
    }

    fn part(&self, path: &str) -> Result<PartRecord> {
        let field = |name: &str| format!("{path}/{name}");
        let flags = field("part flags");
        Ok(PartRecord {
            render_method_index: self.int_or(&field("render method index"), -1)?,
            transparent_sorting_index: self.int_or(&field("transparent sorting index"), -1)?,
            index_start: self.int_or(&field("index start"), 0)?,
            index_count: self.int_or(&field("index count"), 0)?,
            part_type: self.int_or(&field("part type"), 0)?,
            tessellation: self.int_or(&field("tessellation"), 0)?,
            flags: PartFlagsRecord {
                is_water_surface: self.tag.flag(&flags, "is water surface")?,
                draw_cull_distance_medium: self.tag.flag(&flags, "draw cull distance medium")?,
                draw_cull_distance_close: self.tag.flag(&flags, "draw cull distance close")?,
            },
        })
    }

    fn subpart(&self, path: &str) -> Result<SubpartRecord> {
        let field = |name: &str| format!("{path}/{name}");
        Ok(SubpartRecord {
            index_start: self.int_or(&field("index start"), 0)?,
            index_count: self.int_or(&field("index count"), 0)?,
            part_index: self.int_or(&field("part index"), -1)?,
        })
    }

    fn meshes(&self) -> Result<Vec<MeshRecord>> {
        let block = format!("{RENDER_GEOMETRY}/meshes");
        (0..self.count(&block)?)
            .map(|i| -> Result<MeshRecord> {
                let mesh = element(&block, i, "");
                let parts_block = format!("{mesh}/parts");
                let subparts_block = format!("{mesh}/subparts");
                Ok(MeshRecord {
                    rigid_node_index: self.int_or(&format!("{mesh}/rigid node index"), -1)?,
                    index_buffer_type: self.int_or(&format!("{mesh}/index buffer type"), 3)?,
                    parts: (0..self.count(&parts_block)?)
                        .map(|p| self.part(&element(&parts_block, p, "")))
                        .collect::<Result<_>>()?,
                    subparts: (0..self.count(&subparts_block)?)
                        .map(|s| self.subpart(&element(&subparts_block, s, "")))
                        .collect::<Result<_>>()?,
                })
            })
            .collect()
    }

    /// Concatenate a per-vertex field, or return nothing when the first
    /// vertex lacks it.
    fn vertex_reals(&self, vertices: &str, count: usize, field: &str) -> Result<Vec<f32>> {
        if count == 0 || !self.tag.has_field(&element(vertices, 0, field)) {
            return Ok(Vec::new());
        }
        let mut values = Vec::new();
        for v in 0..count {
            values.extend(self.tag.reals(&element(vertices, v, field))?);
        }
        Ok(values)
    }

    fn vertex_integers(&self, vertices: &str, count: usize, field: &str) -> Result<Vec<i32>> {
        if count == 0 || !self.tag.has_field(&element(vertices, 0, field)) {
            return Ok(Vec::new());
        }
        let mut values = Vec::new();
        for v in 0..count {
            values.extend(
                self.tag
                    .integers(&element(vertices, v, field))?
                    .into_iter()
                    .map(|value| value as i32),
            );
        }
        Ok(values)
    }

    /// Index buffer of one mesh. The 16-bit block stores signed words that
    /// are reinterpreted unsigned; the 32-bit block is used when it is empty.
    fn indices(&self, temporary: &str) -> Result<Vec<u32>> {
        let words = format!("{temporary}/raw indices");
        let word_count = self.count(&words)?;
        if word_count > 0 {
            return (0..word_count)
                .map(|i| -> Result<u32> {
                    let value = self.tag.integer(&element(&words, i, "word"))?;
                    Ok(u32::from(value as i16 as u16))
                })
                .collect();
        }
        let dwords = format!("{temporary}/raw indices32");
        (0..self.count(&dwords)?)
            .map(|i| -> Result<u32> { Ok(self.tag.integer(&element(&dwords, i, "dword"))? as u32) })
            .collect()
    }

    fn mesh_streams(&self) -> Result<Vec<MeshStreamsRecord>> {
        let block = format!("{RENDER_GEOMETRY}/per mesh temporary");
        (0..self.count(&block)?)
            .map(|i| -> Result<MeshStreamsRecord> {
                let temporary = element(&block, i, "");
                let vertices = format!("{temporary}/raw vertices");
                let count = self.count(&vertices)?;
                Ok(MeshStreamsRecord {
                    positions: self.vertex_reals(&vertices, count, "position")?,
                    texcoords: self.vertex_reals(&vertices, count, "texcoord")?,
                    normals: self.vertex_reals(&vertices, count, "normal")?,
                    node_indices: self.vertex_integers(&vertices, count, "node indices")?,
                    node_weights: self.vertex_reals(&vertices, count, "node weights")?,
                    lightmap_texcoords: self.vertex_reals(&vertices, count, "lightmap texcoord")?,
                    vertex_colors: self.vertex_reals(&vertices, count, "vertex color")?,
                    indices: self.indices(&temporary)?,
                })
            })
            .collect()
    }

    fn node_maps(&self) -> Result<Vec<Vec<i32>>> {
        let block = format!("{RENDER_GEOMETRY}/per mesh node map");
        (0..self.count(&block)?)
            .map(|i| -> Result<Vec<i32>> {
                let map = element(&block, i, "node map");
                (0..self.count(&map)?)
                    .map(|n| self.tag.int32(&element(&map, n, "node index")))
                    .collect()
            })
            .collect()
    }

    fn instance_placements(&self) -> Result<Vec<InstancePlacementRecord>> {
        let defaults = InstancePlacementRecord::default();
        (0..self.count("instance placements")?)
            .map(|i| -> Result<InstancePlacementRecord> {
                let field = |name: &str| element("instance placements", i, name);
                Ok(InstancePlacementRecord {
                    name: self.string_or_empty(&field("name"))?,
                    // Placement i renders subpart i of the instance mesh.
                    definition_index: i as i32,
                    node_index: self.int_or(&field("node index"), defaults.node_index)?,
                    scale: self.real_or(&field("scale"), defaults.scale)?,
                    forward: self.array_or(&field("forward"), defaults.forward)?,
                    left: self.array_or(&field("left"), defaults.left)?,
                    up: self.array_or(&field("up"), defaults.up)?,
                    position: self.array_or(&field("position"), defaults.position)?,
                })
            })
            .collect()
    }

    fn marker_groups(&self) -> Result<Vec<MarkerGroupRecord>> {
        let defaults = MarkerRecord::default();
        (0..self.count("marker groups")?)
            .map(|g| -> Result<MarkerGroupRecord> {
                let markers = element("marker groups", g, "markers");
                Ok(MarkerGroupRecord {
                    name: self.string_or_empty(&element("marker groups", g, "name"))?,
                    markers: (0..self.count(&markers)?)
                        .map(|m| -> Result<MarkerRecord> {
                            let field = |name: &str| element(&markers, m, name);
                            Ok(MarkerRecord {
                                region_index: self.int_or(&field("region index"), -1)?,
                                permutation_index: self.int_or(&field("permutation index"), -1)?,
                                node_index: self.int_or(&field("node index"), -1)?,
                                translation: self
                                    .array_or(&field("translation"), defaults.translation)?,
                                rotation: self.array_or(&field("rotation"), defaults.rotation)?,
                                scale: self.real_or(&field("scale"), defaults.scale)?,
                                direction: self.array_or(&field("direction"), defaults.direction)?,
                            })
                        })
                        .collect::<Result<_>>()?,
                })
            })
            .collect()
    }
}

/// Short material name of a render method path: the file name without
/// directories or extension.
#[must_use]
pub fn material_name(path: &str) -> &str {
    let file = path.rsplit(['/', '\\']).next().unwrap_or(path);
    file.rsplit_once('.').map_or(file, |(stem, _)| stem)
}

/// Resolve every field of a render model tag.
pub fn resolve_render_model(tag: &dyn TagFields) -> Result<RenderModelRecord> {
    let reader = Reader { tag };
    let record = RenderModelRecord {
        name: reader.string_or_empty("name")?,
        nodes: reader.nodes()?,
        regions: reader.regions()?,
        materials: reader.materials()?,
        compression_info: reader.compression_info()?,
        meshes: reader.meshes()?,
        mesh_streams: reader.mesh_streams()?,
        mesh_node_maps: reader.node_maps()?,
        instance_mesh_index: reader.int_or("instance mesh index", -1)?,
        instance_placements: reader.instance_placements()?,
        marker_groups: reader.marker_groups()?,
    };
    tracing::debug!(
        "resolved {}: {} nodes, {} regions, {} meshes",
        tag.tag_path(),
        record.nodes.len(),
        record.regions.len(),
        record.meshes.len()
    );
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::JsonTagBackend;
    use crate::source::TagBackend;
    use serde_json::json;

    fn resolve(tag: serde_json::Value) -> RenderModelRecord {
        let mut backend = JsonTagBackend::default();
        backend.insert("test.render_model", tag);
        backend.initialize().unwrap();
        let fields = backend.open("test.render_model").unwrap();
        resolve_render_model(&*fields).unwrap()
    }

    #[test]
    fn signed_words_are_reinterpreted() {
        let record = resolve(json!({
            "render geometry": {
                "per mesh temporary": [{
                    "raw indices": [{ "word": 1 }, { "word": -1 }, { "word": -32768 }],
                    "raw indices32": [{ "dword": 99 }]
                }]
            }
        }));
        assert_eq!(record.mesh_streams[0].indices, vec![1, 65535, 32768]);
    }

    #[test]
    fn dword_indices_are_the_fallback() {
        let record = resolve(json!({
            "render geometry": {
                "per mesh temporary": [{ "raw indices": [], "raw indices32": [{ "dword": 70000 }] }]
            }
        }));
        assert_eq!(record.mesh_streams[0].indices, vec![70000]);
    }

    #[test]
    fn instance_masks_read_every_bit() {
        let record = resolve(json!({
            "regions": [{
                "name": "body",
                "permutations": [{
                    "name": "base",
                    "instance mask 0-31": ["0", "31"],
                    "instance mask 64-95": ["2"]
                }]
            }]
        }));
        let permutation = &record.regions[0].permutations[0];
        assert_eq!(permutation.instance_mask, [1 | 1 << 31, 0, 1 << 2]);
        assert_eq!(permutation.mesh_index, -1);
        assert!(permutation.clone_name.is_empty());
    }

    #[test]
    fn streams_are_concatenated_per_vertex() {
        let record = resolve(json!({
            "render geometry": {
                "per mesh temporary": [{
                    "raw vertices": [
                        { "position": [0.0, 0.5, 1.0], "node indices": [0, 1, -1, -1] },
                        { "position": [1.0, 0.5, 0.0], "node indices": [1, -1, -1, -1] }
                    ]
                }]
            }
        }));
        let streams = &record.mesh_streams[0];
        assert_eq!(streams.positions, vec![0.0, 0.5, 1.0, 1.0, 0.5, 0.0]);
        assert_eq!(streams.node_indices, vec![0, 1, -1, -1, 1, -1, -1, -1]);
        assert!(streams.texcoords.is_empty());
    }

    #[test]
    fn material_names_drop_directories_and_extension() {
        assert_eq!(material_name("objects\\crate\\shaders\\wood.shader"), "wood");
        assert_eq!(material_name("levels/metal"), "metal");
        assert_eq!(material_name(""), "");
    }

    #[test]
    fn placements_index_their_own_subpart() {
        let record = resolve(json!({
            "instance mesh index": 2,
            "instance placements": [{ "name": "a" }, { "name": "b", "scale": 2.0 }]
        }));
        assert_eq!(record.instance_mesh_index, 2);
        assert_eq!(record.instance_placements[1].definition_index, 1);
        assert_eq!(record.instance_placements[1].scale, 2.0);
        assert_eq!(record.instance_placements[0].scale, 1.0);
    }
}
