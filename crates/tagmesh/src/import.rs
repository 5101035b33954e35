//! Render model import pipeline.
//!
//! Runs every decode stage over a resolved [`RenderModelRecord`]: skeleton,
//! per-permutation geometry, instance placements, clone material remaps and
//! marker groups.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tagmesh_decode::regions::{instance_filter, object_name, regions_from_records};
use tagmesh_decode::{
    CloneRemap, CompressionBounds, DecodeError, Diagnostic, Diagnostics, InstancePlacement,
    MarkerGroup, Mesh, PermutationFilter, ReconstructOptions, Region, ResolvedInstance, Selection,
    Skeleton, SubMesh, build_marker_group, clone_remaps, reconstruct, resolve_instance,
    skeleton_from_records,
};
use tagmesh_records::{MaterialRecord, MeshStreamsRecord, RenderModelRecord};

use crate::error::Result;
use crate::resolve::resolve_render_model;
use crate::source::TagBackend;

/// Which region/permutation pairs to import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermutationSelection {
    #[default]
    All,
    /// Only these `(region, permutation)` pairs.
    Only(BTreeSet<(String, String)>),
    /// The named permutation in every region.
    Permutation(String),
}

impl PermutationSelection {
    #[must_use]
    pub fn admits(&self, region: &str, permutation: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(pairs) => pairs
                .iter()
                .any(|(r, p)| r == region && p == permutation),
            Self::Permutation(name) => name == permutation,
        }
    }
}

/// Import configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Reconstruct render geometry and instances.
    pub render: bool,
    /// Reconcile marker groups.
    pub markers: bool,
    pub selection: PermutationSelection,
    /// Reconstruct meshes concurrently when the `parallel` feature is enabled.
    pub parallel: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            render: true,
            markers: true,
            selection: PermutationSelection::All,
            parallel: true,
        }
    }
}

/// Geometry of one mesh of a region/permutation.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderObject {
    /// `region:permutation`.
    pub name: String,
    pub region: String,
    pub permutation: String,
    pub mesh: SubMesh,
}

/// A placed copy of instance geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedInstance {
    pub instance: ResolvedInstance,
    pub mesh: SubMesh,
    /// Region of the first permutation rendering this instance.
    pub region: Option<String>,
    pub filter: PermutationFilter,
}

/// Everything decoded from one render model.
#[derive(Debug, Clone)]
pub struct RenderModelImport {
    pub name: String,
    pub skeleton: Skeleton,
    pub regions: Vec<Region>,
    pub materials: Vec<MaterialRecord>,
    pub objects: Vec<RenderObject>,
    pub instances: Vec<PlacedInstance>,
    pub clone_remaps: Vec<CloneRemap>,
    pub marker_groups: Vec<MarkerGroup>,
    pub marker_size_factor: f32,
    pub diagnostics: Diagnostics,
}

/// Open, resolve and import the render model tag at `path`.
pub fn import_tag(
    backend: &impl TagBackend,
    path: &str,
    options: &ImportOptions,
) -> Result<RenderModelImport> {
    let tag = backend.open(path)?;
    let record = resolve_render_model(&*tag)?;
    import_render_model(&record, options)
}

/// One mesh to reconstruct for a region/permutation.
struct MeshJob<'a> {
    region: &'a str,
    permutation: &'a str,
    mesh: &'a Mesh,
}

/// Import a resolved render model.
pub fn import_render_model(
    record: &RenderModelRecord,
    options: &ImportOptions,
) -> Result<RenderModelImport> {
    let span = tracing::info_span!("import_render_model", name = %record.name);
    let _enter = span.enter();

    let mut diagnostics = Diagnostics::new();
    let skeleton = skeleton_from_records(&record.nodes)?.merge_into(&mut diagnostics);
    let regions = regions_from_records(&record.regions);

    let bounds = record
        .compression_info
        .first()
        .map(CompressionBounds::from_record)
        .transpose()?;
    let marker_size_factor = bounds.map_or(1.0, |bounds| bounds.marker_size_factor());

    let mut objects = Vec::new();
    let mut instances = Vec::new();
    let mut remaps = Vec::new();
    if options.render {
        let meshes = build_meshes(record, &mut diagnostics)?;
        let admitted = |region: &Region, permutation: &str| {
            options.selection.admits(&region.name, permutation)
        };

        let mut jobs = Vec::new();
        for region in &regions {
            for permutation in &region.permutations {
                if !admitted(region, &permutation.name) || permutation.is_clone() {
                    continue;
                }
                for index in permutation.meshes() {
                    let Some(mesh) = meshes.get(index) else {
                        tracing::warn!(
                            "permutation {} references mesh {index} of {}",
                            object_name(&region.name, &permutation.name),
                            meshes.len()
                        );
                        continue;
                    };
                    if mesh.is_valid() {
                        mesh.check_nodes(skeleton.len())?;
                    }
                    jobs.push(MeshJob {
                        region: &region.name,
                        permutation: &permutation.name,
                        mesh,
                    });
                }
            }
        }

        objects = reconstruct_jobs(&jobs, bounds, options.parallel)?;
        instances = place_instances(
            record,
            &regions,
            &meshes,
            &skeleton,
            bounds,
            options,
            &mut diagnostics,
        )?;
        remaps = clone_remaps(&regions, &meshes, |p| {
            regions
                .get(p.region)
                .is_some_and(|region| admitted(region, &p.name))
        })
        .merge_into(&mut diagnostics);
    }

    let mut marker_groups = Vec::new();
    if options.markers {
        for group in &record.marker_groups {
            marker_groups.push(
                build_marker_group(group, &regions, &skeleton, marker_size_factor)
                    .merge_into(&mut diagnostics),
            );
        }
    }

    tracing::info!(
        "imported {}: {} bones, {} objects, {} instances, {} marker groups, {} diagnostics",
        record.name,
        skeleton.len(),
        objects.len(),
        instances.len(),
        marker_groups.len(),
        diagnostics.len()
    );

    Ok(RenderModelImport {
        name: record.name.clone(),
        skeleton,
        regions,
        materials: record.materials.clone(),
        objects,
        instances,
        clone_remaps: remaps,
        marker_groups,
        marker_size_factor,
        diagnostics,
    })
}

fn build_meshes(record: &RenderModelRecord, diagnostics: &mut Diagnostics) -> Result<Vec<Mesh>> {
    let empty = MeshStreamsRecord::default();
    let mut meshes = Vec::with_capacity(record.meshes.len());
    for (index, mesh) in record.meshes.iter().enumerate() {
        let streams = record.mesh_streams.get(index).unwrap_or(&empty);
        let mesh = Mesh::from_records(
            index,
            mesh,
            streams,
            record.node_map(index),
            record.materials.len(),
        )?;
        let coverage = mesh.coverage();
        if mesh.is_valid() && !coverage.is_exact() {
            diagnostics.push(Diagnostic::SubpartCoverage {
                mesh: index,
                gaps: coverage.gaps,
                overlaps: coverage.overlaps,
            });
        }
        meshes.push(mesh);
    }
    Ok(meshes)
}

fn require_bounds(bounds: Option<CompressionBounds>, mesh: &Mesh) -> Result<CompressionBounds> {
    bounds.ok_or_else(|| DecodeError::MissingCompressionInfo { mesh: mesh.index }.into())
}

fn reconstruct_job(job: &MeshJob<'_>, bounds: Option<CompressionBounds>) -> Result<Option<RenderObject>> {
    if !job.mesh.is_valid() {
        return Ok(None);
    }
    let bounds = require_bounds(bounds, job.mesh)?;
    let built = reconstruct(job.mesh, &bounds, &ReconstructOptions::default())?;
    Ok(built.map(|mesh| RenderObject {
        name: object_name(job.region, job.permutation),
        region: job.region.to_owned(),
        permutation: job.permutation.to_owned(),
        mesh,
    }))
}

#[cfg(feature = "parallel")]
fn reconstruct_jobs(
    jobs: &[MeshJob<'_>],
    bounds: Option<CompressionBounds>,
    parallel: bool,
) -> Result<Vec<RenderObject>> {
    use rayon::prelude::*;

    let built: Vec<Option<RenderObject>> = if parallel {
        jobs.par_iter()
            .map(|job| reconstruct_job(job, bounds))
            .collect::<Result<_>>()?
    } else {
        jobs.iter()
            .map(|job| reconstruct_job(job, bounds))
            .collect::<Result<_>>()?
    };
    Ok(built.into_iter().flatten().collect())
}

#[cfg(not(feature = "parallel"))]
fn reconstruct_jobs(
    jobs: &[MeshJob<'_>],
    bounds: Option<CompressionBounds>,
    _parallel: bool,
) -> Result<Vec<RenderObject>> {
    let built: Vec<Option<RenderObject>> = jobs
        .iter()
        .map(|job| reconstruct_job(job, bounds))
        .collect::<Result<_>>()?;
    Ok(built.into_iter().flatten().collect())
}

/// Resolve and reconstruct the instance placements the selection renders.
fn place_instances(
    record: &RenderModelRecord,
    regions: &[Region],
    meshes: &[Mesh],
    skeleton: &Skeleton,
    bounds: Option<CompressionBounds>,
    options: &ImportOptions,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<PlacedInstance>> {
    let Some(instance_mesh) = usize::try_from(record.instance_mesh_index)
        .ok()
        .and_then(|index| meshes.get(index))
    else {
        return Ok(Vec::new());
    };

    let visible: Option<BTreeSet<usize>> = match options.selection {
        PermutationSelection::All => None,
        _ => Some(
            regions
                .iter()
                .flat_map(|region| {
                    region
                        .permutations
                        .iter()
                        .filter(|p| options.selection.admits(&region.name, &p.name))
                })
                .flat_map(|p| p.instances.iter().copied())
                .collect(),
        ),
    };

    let mut placed = Vec::new();
    for (index, placement) in record.instance_placements.iter().enumerate() {
        if visible.as_ref().is_some_and(|visible| !visible.contains(&index)) {
            continue;
        }
        let placement = InstancePlacement::from_record(index, placement);
        let Some(instance) = resolve_instance(
            &placement,
            instance_mesh.subparts.len(),
            skeleton,
            diagnostics,
        )?
        else {
            continue;
        };

        let bounds = require_bounds(bounds, instance_mesh)?;
        let reconstruct_options = ReconstructOptions {
            selection: Selection::Subpart(instance.definition),
            skin: false,
            placement: Some(instance.placement()),
            merge_two_sided: false,
        };
        let Some(mesh) = reconstruct(instance_mesh, &bounds, &reconstruct_options)? else {
            continue;
        };

        let (region, filter) = instance_filter(regions, index)
            .map_or((None, PermutationFilter::All), |(region, filter)| {
                (regions.get(region).map(|r| r.name.clone()), filter)
            });
        placed.push(PlacedInstance {
            instance,
            mesh,
            region,
            filter,
        });
    }
    Ok(placed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn selection_admits_pairs() {
        assert!(PermutationSelection::All.admits("body", "base"));
        let only = PermutationSelection::Only(
            [("body".to_owned(), "base".to_owned())].into_iter().collect(),
        );
        assert!(only.admits("body", "base"));
        assert!(!only.admits("head", "base"));
        let named = PermutationSelection::Permutation("damaged".into());
        assert!(named.admits("head", "damaged"));
        assert!(!named.admits("head", "base"));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: ImportOptions = serde_json::from_str(r#"{ "markers": false }"#).unwrap();
        assert!(options.render);
        assert!(!options.markers);
        assert_eq!(options.selection, PermutationSelection::All);

        let options: ImportOptions =
            serde_json::from_str(r#"{ "selection": { "permutation": "base" } }"#).unwrap();
        assert_eq!(
            options.selection,
            PermutationSelection::Permutation("base".into())
        );
    }

    proptest! {
        #[test]
        fn only_admits_listed_pairs(
            pairs in prop::collection::btree_set(("[a-c]", "[x-z]"), 0..6),
            region in "[a-c]",
            permutation in "[x-z]",
        ) {
            let listed = pairs.contains(&(region.clone(), permutation.clone()));
            let selection = PermutationSelection::Only(pairs);
            prop_assert_eq!(selection.admits(&region, &permutation), listed);
        }
    }
}
