//! End-to-end imports of a small render model served from JSON.

use glam::{Mat4, Vec3};
use serde_json::{Value, json};
use tagmesh::tagmesh_decode::{
    Binding, CloneRemap, DecodeError, Diagnostic, MarkerKind, MaterialRemap, PermutationFilter,
};
use tagmesh::{
    Error, ImportOptions, JsonTagBackend, PermutationSelection, RenderModelImport, TagBackend,
    import_tag,
};

const TAG: &str = "objects\\crate\\crate.render_model";

fn triangle_streams(vertices: &[[f32; 3]]) -> Value {
    let raw_vertices: Vec<Value> = vertices
        .iter()
        .map(|position| json!({ "position": position }))
        .collect();
    let raw_indices: Vec<Value> = (0..vertices.len())
        .map(|i| json!({ "word": i }))
        .collect();
    json!({ "raw vertices": raw_vertices, "raw indices": raw_indices })
}

fn single_triangle_mesh(material: i32, rigid_node: i32) -> Value {
    json!({
        "rigid node index": rigid_node,
        "parts": [{ "render method index": material, "index start": 0, "index count": 3 }],
        "subparts": [{ "index start": 0, "index count": 3, "part index": 0 }]
    })
}

fn crate_model() -> Value {
    let triangle = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
    json!({
        "name": "crate",
        "nodes": [{ "name": "root" }],
        "materials": [
            { "render method": "objects\\crate\\shaders\\wood.shader" },
            { "render method": "objects\\crate\\shaders\\rust.shader" }
        ],
        "regions": [{
            "name": "body",
            "permutations": [
                { "name": "base", "mesh index": 0, "mesh count": 1, "instance mask 0-31": ["0"] },
                { "name": "damaged", "mesh index": 1, "mesh count": 1 },
                { "name": "rusty", "mesh index": 2, "mesh count": 1, "clone name": "base" }
            ]
        }],
        "render geometry": {
            "compression info": [{
                "position bounds 0": [0.0, 1.0, 0.0],
                "position bounds 1": [1.0, 0.0, 2.0],
                "texcoord bounds 0": [0.0, 1.0],
                "texcoord bounds 1": [0.0, 1.0]
            }],
            "meshes": [
                single_triangle_mesh(0, 0),
                single_triangle_mesh(0, -1),
                single_triangle_mesh(1, -1),
                {
                    "parts": [{ "render method index": 0, "index start": 0, "index count": 6 }],
                    "subparts": [
                        { "index start": 0, "index count": 3, "part index": 0 },
                        { "index start": 3, "index count": 3, "part index": 0 }
                    ]
                }
            ],
            "per mesh temporary": [
                triangle_streams(&triangle),
                triangle_streams(&triangle),
                triangle_streams(&triangle),
                triangle_streams(&[
                    [0.0, 0.0, 0.0], [0.1, 0.0, 0.0], [0.0, 0.1, 0.0],
                    [0.0, 0.0, 0.5], [0.1, 0.0, 0.5], [0.0, 0.1, 0.5]
                ])
            ]
        },
        "instance mesh index": 3,
        "instance placements": [
            { "name": "bolt__0", "node index": 0, "position": [0.25, 0.0, 0.0] },
            { "name": "bolt__1", "scale": 2.0, "position": [0.0, 0.5, 0.0] }
        ],
        "marker groups": [
            {
                "name": "target_lid",
                "markers": [{
                    "region index": 0,
                    "permutation index": 0,
                    "node index": 0,
                    "translation": [0.0, 0.0, 1.0],
                    "scale": 0.5
                }]
            },
            { "name": "handle", "markers": [{ "node index": 0 }] }
        ]
    })
}

fn backend(model: Value) -> JsonTagBackend {
    let mut backend = JsonTagBackend::default();
    backend.insert(TAG, model);
    backend.initialize().unwrap();
    backend
}

fn import_crate(options: &ImportOptions) -> RenderModelImport {
    import_tag(&backend(crate_model()), TAG, options).unwrap()
}

fn object_names(import: &RenderModelImport) -> Vec<&str> {
    import.objects.iter().map(|o| o.name.as_str()).collect()
}

#[test]
fn imports_one_object_per_built_permutation() {
    let import = import_crate(&ImportOptions::default());

    assert_eq!(import.name, "crate");
    assert_eq!(import.skeleton.len(), 1);
    assert_eq!(object_names(&import), ["body:base", "body:damaged"]);
    assert!(import.diagnostics.is_empty());

    let material_names: Vec<&str> = import.materials.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(material_names, ["wood", "rust"]);

    let base = &import.objects[0].mesh;
    assert_eq!(base.positions[1], Vec3::new(100.0, 0.0, 0.0));
    assert_eq!(base.materials, [Some(0)]);
    assert!(matches!(base.binding, Binding::Rigid { node: 0, .. }));

    let damaged = &import.objects[1].mesh;
    assert!(matches!(damaged.binding, Binding::World { .. }));
}

#[test]
fn sequential_and_parallel_imports_agree() {
    let parallel = import_crate(&ImportOptions::default());
    let sequential = import_crate(&ImportOptions {
        parallel: false,
        ..ImportOptions::default()
    });
    assert_eq!(parallel.objects, sequential.objects);
    assert_eq!(parallel.instances, sequential.instances);
}

#[test]
fn clones_become_material_remaps() {
    let import = import_crate(&ImportOptions::default());
    assert_eq!(
        import.clone_remaps,
        [CloneRemap {
            source_permutation: "base".into(),
            clone_permutation: "rusty".into(),
            remaps: vec![MaterialRemap {
                source: 0,
                destination: 1,
            }],
        }]
    );
}

#[test]
fn selection_limits_objects_instances_and_clones() {
    let import = import_crate(&ImportOptions {
        selection: PermutationSelection::Permutation("damaged".into()),
        ..ImportOptions::default()
    });
    assert_eq!(object_names(&import), ["body:damaged"]);
    assert!(import.instances.is_empty());
    assert!(import.clone_remaps.is_empty());

    let import = import_crate(&ImportOptions {
        selection: PermutationSelection::Only(
            [("body".to_owned(), "base".to_owned())].into_iter().collect(),
        ),
        ..ImportOptions::default()
    });
    assert_eq!(object_names(&import), ["body:base"]);
    assert_eq!(import.instances.len(), 1);
    assert_eq!(import.instances[0].instance.name, "bolt");
}

#[test]
fn instances_place_their_own_subpart() {
    let import = import_crate(&ImportOptions::default());
    assert_eq!(import.instances.len(), 2);

    let bolt = &import.instances[0];
    assert_eq!(bolt.instance.name, "bolt");
    assert_eq!(bolt.mesh.subpart, Some(0));
    assert_eq!(bolt.region.as_deref(), Some("body"));
    assert_eq!(bolt.filter, PermutationFilter::Include(vec!["base".into()]));
    assert_eq!(
        bolt.mesh.binding,
        Binding::Rigid {
            node: 0,
            local: Mat4::from_translation(Vec3::new(25.0, 0.0, 0.0)),
        }
    );
    assert!(bolt.mesh.skin.is_empty());

    let loose = &import.instances[1];
    assert_eq!(loose.mesh.subpart, Some(1));
    assert_eq!(loose.mesh.vertex_offset, 3);
    assert_eq!(loose.mesh.triangles, [[0, 1, 2]]);
    assert_eq!(loose.region, None);
    assert_eq!(loose.filter, PermutationFilter::All);
    assert_eq!(loose.instance.scale, 2.0);
    assert_eq!(
        loose.mesh.binding,
        Binding::World {
            matrix: Mat4::from_translation(Vec3::new(0.0, 50.0, 0.0)),
        }
    );
}

#[test]
fn world_instances_ignore_the_rigid_node() {
    let mut model = crate_model();
    model["render geometry"]["meshes"][3]["rigid node index"] = json!(0);
    let import = import_tag(&backend(model.clone()), TAG, &ImportOptions::default()).unwrap();
    let world = Binding::World {
        matrix: Mat4::from_translation(Vec3::new(0.0, 50.0, 0.0)),
    };
    assert_eq!(import.instances[1].mesh.binding, world);
    assert!(matches!(
        import.instances[0].mesh.binding,
        Binding::Rigid { node: 0, .. }
    ));

    // An unknown node is reported and the instance stays in world space.
    model["instance placements"][1]["node index"] = json!(7);
    let import = import_tag(&backend(model), TAG, &ImportOptions::default()).unwrap();
    assert_eq!(import.instances[1].mesh.binding, world);
    assert_eq!(import.instances[1].instance.node, None);
    assert!(matches!(
        import.diagnostics.into_vec().as_slice(),
        [Diagnostic::UnresolvedInstanceNode { node: 7, .. }]
    ));
}

#[test]
fn rigid_nodes_must_exist() {
    let mut model = crate_model();
    model["render geometry"]["meshes"][1]["rigid node index"] = json!(3);
    let result = import_tag(&backend(model), TAG, &ImportOptions::default());
    assert!(matches!(
        result,
        Err(Error::Decode(DecodeError::UnresolvedMeshNode {
            mesh: 1,
            node: 3,
            node_count: 1,
        }))
    ));
}

#[test]
fn skin_influences_must_exist() {
    let skinned = |node: i32| {
        let mut model = crate_model();
        let vertices = &mut model["render geometry"]["per mesh temporary"][1]["raw vertices"];
        for vertex in vertices.as_array_mut().unwrap() {
            vertex["node indices"] = json!([node, -1, -1, -1]);
            vertex["node weights"] = json!([1.0, 0.0, 0.0, 0.0]);
        }
        model
    };

    let import = import_tag(&backend(skinned(0)), TAG, &ImportOptions::default()).unwrap();
    let damaged = &import.objects[1].mesh;
    assert_eq!(damaged.binding, Binding::Skinned);
    assert_eq!(damaged.skin.len(), 3);
    assert!(damaged.skin.iter().all(|w| w.node == 0));

    let result = import_tag(&backend(skinned(2)), TAG, &ImportOptions::default());
    assert!(matches!(
        result,
        Err(Error::Decode(DecodeError::UnresolvedMeshNode {
            mesh: 1,
            node: 2,
            node_count: 1,
        }))
    ));
}

#[test]
fn markers_are_sized_and_placed() {
    let import = import_crate(&ImportOptions::default());
    // Largest box extent is 200 world units.
    assert_eq!(import.marker_size_factor, 5.0);
    assert_eq!(import.marker_groups.len(), 2);

    let target = &import.marker_groups[0];
    assert_eq!(target.kind, MarkerKind::Target);
    let lid = &target.markers[0];
    assert_eq!(lid.display_size, 50.0);
    assert_eq!(lid.region.as_deref(), Some("body"));
    assert_eq!(lid.bone.as_deref(), Some("root"));
    assert_eq!(lid.reconciled.filter, PermutationFilter::Include(vec!["base".into()]));
    assert_eq!(lid.world.w_axis.truncate(), Vec3::new(0.0, 0.0, 100.0));

    let handle = &import.marker_groups[1];
    assert_eq!(handle.kind, MarkerKind::Model);
    assert_eq!(handle.markers[0].display_size, 5.0);
    assert_eq!(handle.markers[0].reconciled.filter, PermutationFilter::All);
}

#[test]
fn disabled_stages_are_skipped() {
    let import = import_crate(&ImportOptions {
        render: false,
        markers: false,
        ..ImportOptions::default()
    });
    assert!(import.objects.is_empty());
    assert!(import.instances.is_empty());
    assert!(import.marker_groups.is_empty());
    assert_eq!(import.skeleton.len(), 1);
}

#[test]
fn geometry_without_compression_info_fails() {
    let mut model = crate_model();
    model["render geometry"]["compression info"] = json!([]);
    let backend = backend(model);

    let result = import_tag(&backend, TAG, &ImportOptions::default());
    assert!(matches!(
        result,
        Err(Error::Decode(DecodeError::MissingCompressionInfo { .. }))
    ));

    // Markers alone fall back to a unit size factor.
    let import = import_tag(
        &backend,
        TAG,
        &ImportOptions {
            render: false,
            ..ImportOptions::default()
        },
    )
    .unwrap();
    assert_eq!(import.marker_size_factor, 1.0);
    assert_eq!(import.marker_groups[1].markers[0].display_size, 1.0);
}

#[test]
fn missing_instance_definitions_are_reported() {
    let mut model = crate_model();
    model["instance placements"]
        .as_array_mut()
        .unwrap()
        .push(json!({ "name": "bolt__2" }));
    // Placement 2 has no subpart in the instance mesh.
    let import = import_tag(&backend(model), TAG, &ImportOptions::default()).unwrap();
    assert_eq!(import.instances.len(), 2);
    assert_eq!(import.diagnostics.len(), 1);
}

#[test]
fn backends_must_be_initialized() {
    let mut backend = backend(crate_model());
    backend.shutdown();
    assert!(matches!(
        import_tag(&backend, TAG, &ImportOptions::default()),
        Err(Error::BackendNotInitialized)
    ));

    backend.initialize().unwrap();
    assert!(matches!(
        import_tag(&backend, "objects\\missing.render_model", &ImportOptions::default()),
        Err(Error::TagNotFound(_))
    ));
}
