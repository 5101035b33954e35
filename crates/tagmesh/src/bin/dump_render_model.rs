//! Import a render model from a JSON tag document and print a summary.
//!
//! Run: `cargo run -p tagmesh --features test-tools --bin dump_render_model -- <document.json> <tag path> [options.json]`
//!
//! The optional options file is an `ImportOptions` value, e.g.
//! `{ "selection": { "permutation": "base" }, "parallel": false }`.

use std::env;
use std::fs;
use std::process::ExitCode;

use serde_json::{Value, json};
use tagmesh::{ImportOptions, JsonTagBackend, RenderModelImport, TagBackend, import_tag};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let (Some(document), Some(tag)) = (args.get(1), args.get(2)) else {
        eprintln!("usage: dump_render_model <document.json> <tag path> [options.json]");
        return ExitCode::FAILURE;
    };

    match run(document, tag, args.get(3).map(String::as_str)) {
        Ok(summary) => {
            println!("{summary:#}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to import {tag}: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(document: &str, tag: &str, options: Option<&str>) -> tagmesh::Result<Value> {
    let options: ImportOptions = match options {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => ImportOptions::default(),
    };

    let mut backend = JsonTagBackend::from_path(document)?;
    backend.initialize()?;
    let import = import_tag(&backend, tag, &options);
    backend.shutdown();
    Ok(summarize(&import?))
}

fn summarize(import: &RenderModelImport) -> Value {
    json!({
        "name": import.name,
        "bones": import.skeleton.bones().iter().map(|bone| json!({
            "name": bone.name,
            "parent": bone.parent,
            "world_position": bone.world.w_axis.truncate().to_array(),
        })).collect::<Vec<_>>(),
        "materials": import.materials.iter().map(|m| &m.name).collect::<Vec<_>>(),
        "objects": import.objects.iter().map(|object| json!({
            "name": object.name,
            "mesh": object.mesh.mesh,
            "vertices": object.mesh.vertex_count(),
            "triangles": object.mesh.triangles.len(),
            "skin_weights": object.mesh.skin.len(),
            "two_sided": format!("{:?}", object.mesh.two_sided),
            "dimensions": object.mesh.dimensions().to_array(),
        })).collect::<Vec<_>>(),
        "instances": import.instances.iter().map(|placed| json!({
            "name": placed.instance.name,
            "definition": placed.instance.definition,
            "bone": placed.instance.bone,
            "scale": placed.instance.scale,
            "region": placed.region,
            "filter": format!("{:?}", placed.filter),
            "triangles": placed.mesh.triangles.len(),
        })).collect::<Vec<_>>(),
        "clone_remaps": import.clone_remaps.iter().map(|remap| json!({
            "source": remap.source_permutation,
            "clone": remap.clone_permutation,
            "remaps": remap.remaps.iter().map(|r| [r.source, r.destination]).collect::<Vec<_>>(),
        })).collect::<Vec<_>>(),
        "marker_groups": import.marker_groups.iter().map(|group| json!({
            "name": group.name,
            "kind": format!("{:?}", group.kind),
            "markers": group.markers.len(),
        })).collect::<Vec<_>>(),
        "marker_size_factor": import.marker_size_factor,
        "diagnostics": import.diagnostics.iter().map(ToString::to_string).collect::<Vec<_>>(),
    })
}
