//! Regions, permutations and the per-permutation data derived from them.

use std::ops::Range;

use tagmesh_records::{PermutationRecord, RegionRecord};

use crate::diagnostics::{Decoded, Diagnostic, Diagnostics};
use crate::mesh::Mesh;

/// Number of instance-mask words per permutation.
pub const INSTANCE_MASK_WORDS: usize = 3;

/// Instance indices set in a permutation's mask. Bit `b` of word `w` is
/// instance `32 * w + b`.
#[must_use]
pub fn decode_instance_mask(mask: [u32; INSTANCE_MASK_WORDS]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .flat_map(|(word, &bits)| {
            (0..u32::BITS as usize)
                .filter(move |&bit| bits & (1u32 << bit) != 0)
                .map(move |bit| word * u32::BITS as usize + bit)
        })
        .collect()
}

/// Scene object name for a region/permutation pair.
#[must_use]
pub fn object_name(region: &str, permutation: &str) -> String {
    format!("{region}:{permutation}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutation {
    pub index: usize,
    pub region: usize,
    pub name: String,
    /// First mesh of the contiguous run, `None` when the permutation has no geometry.
    pub mesh_index: Option<usize>,
    pub mesh_count: usize,
    /// Permutation whose geometry this one reuses with other materials.
    pub clone_name: Option<String>,
    /// Instance placements rendered by this permutation.
    pub instances: Vec<usize>,
}

impl Permutation {
    #[must_use]
    pub fn from_record(region: usize, index: usize, record: &PermutationRecord) -> Self {
        Self {
            index,
            region,
            name: record.name.clone(),
            mesh_index: usize::try_from(record.mesh_index).ok(),
            mesh_count: usize::try_from(record.mesh_count).unwrap_or(0),
            clone_name: (!record.clone_name.is_empty()).then(|| record.clone_name.clone()),
            instances: decode_instance_mask(record.instance_mask),
        }
    }

    /// Indices of the meshes this permutation owns.
    #[must_use]
    pub fn meshes(&self) -> Range<usize> {
        self.mesh_index
            .map_or(0..0, |start| start..start + self.mesh_count)
    }

    #[must_use]
    pub fn is_clone(&self) -> bool {
        self.clone_name.is_some()
    }

    #[must_use]
    pub fn renders_instance(&self, instance: usize) -> bool {
        self.instances.contains(&instance)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub index: usize,
    pub name: String,
    pub permutations: Vec<Permutation>,
}

impl Region {
    #[must_use]
    pub fn from_record(index: usize, record: &RegionRecord) -> Self {
        Self {
            index,
            name: record.name.clone(),
            permutations: record
                .permutations
                .iter()
                .enumerate()
                .map(|(i, permutation)| Permutation::from_record(index, i, permutation))
                .collect(),
        }
    }

    #[must_use]
    pub fn permutation(&self, index: usize) -> Option<&Permutation> {
        self.permutations.get(index)
    }

    #[must_use]
    pub fn permutation_names(&self) -> Vec<&str> {
        self.permutations.iter().map(|p| p.name.as_str()).collect()
    }
}

#[must_use]
pub fn regions_from_records(records: &[RegionRecord]) -> Vec<Region> {
    records
        .iter()
        .enumerate()
        .map(|(index, record)| Region::from_record(index, record))
        .collect()
}

/// Which permutations of a region an object is visible in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PermutationFilter {
    /// Every permutation.
    #[default]
    All,
    /// Only the listed permutations.
    Include(Vec<String>),
    /// Every permutation except the listed ones.
    Exclude(Vec<String>),
}

impl PermutationFilter {
    /// Pick the shorter of the include and exclude lists for `included`.
    ///
    /// Covering every permutation of the region yields [`Self::All`]. Equal
    /// lengths yield [`Self::Exclude`].
    #[must_use]
    pub fn choose(region: &Region, included: &[&str]) -> Self {
        let mut include: Vec<String> = Vec::new();
        for &name in included {
            if !include.iter().any(|existing| existing == name) {
                include.push(name.to_owned());
            }
        }
        let exclude: Vec<String> = region
            .permutations
            .iter()
            .filter(|p| !include.contains(&p.name))
            .map(|p| p.name.clone())
            .collect();

        if exclude.is_empty() {
            Self::All
        } else if include.len() < exclude.len() {
            Self::Include(include)
        } else {
            Self::Exclude(exclude)
        }
    }

    #[must_use]
    pub fn admits(&self, permutation: &str) -> bool {
        match self {
            Self::All => true,
            Self::Include(names) => names.iter().any(|name| name == permutation),
            Self::Exclude(names) => !names.iter().any(|name| name == permutation),
        }
    }
}

/// Region and permutation filter for an instance placement, taken from the
/// first region with a permutation whose mask references the instance.
#[must_use]
pub fn instance_filter(regions: &[Region], instance: usize) -> Option<(usize, PermutationFilter)> {
    regions.iter().find_map(|region| {
        let rendering: Vec<&str> = region
            .permutations
            .iter()
            .filter(|p| p.renders_instance(instance))
            .map(|p| p.name.as_str())
            .collect();
        (!rendering.is_empty())
            .then(|| (region.index, PermutationFilter::choose(region, &rendering)))
    })
}

/// Material substitution for a clone permutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialRemap {
    pub source: usize,
    pub destination: usize,
}

/// Every material substitution turning a source permutation into a clone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneRemap {
    pub source_permutation: String,
    pub clone_permutation: String,
    pub remaps: Vec<MaterialRemap>,
}

impl CloneRemap {
    /// Record a remap. Missing or identical materials are ignored and the
    /// first remap per source material wins.
    pub fn add(&mut self, source: Option<usize>, destination: Option<usize>) {
        let (Some(source), Some(destination)) = (source, destination) else {
            return;
        };
        if source == destination || self.remaps.iter().any(|r| r.source == source) {
            return;
        }
        self.remaps.push(MaterialRemap {
            source,
            destination,
        });
    }
}

/// Accumulates clone remaps keyed by `(source, clone)` permutation names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneRemapTable {
    clones: Vec<CloneRemap>,
}

impl CloneRemapTable {
    pub fn entry(&mut self, source: &str, clone: &str) -> &mut CloneRemap {
        let position = self
            .clones
            .iter()
            .position(|c| c.source_permutation == source && c.clone_permutation == clone);
        let position = match position {
            Some(position) => position,
            None => {
                tracing::debug!("added permutation clone {source} -> {clone}");
                self.clones.push(CloneRemap {
                    source_permutation: source.to_owned(),
                    clone_permutation: clone.to_owned(),
                    remaps: Vec::new(),
                });
                self.clones.len() - 1
            }
        };
        &mut self.clones[position]
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<CloneRemap> {
        self.clones
    }
}

fn find_source<'a>(
    regions: &'a [Region],
    clone: &Permutation,
    name: &str,
    built: &impl Fn(&Permutation) -> bool,
) -> Option<&'a Permutation> {
    let candidates = || {
        regions
            .iter()
            .flat_map(|region| &region.permutations)
            .filter(|p| p.name == name && !p.is_clone() && built(p))
    };
    candidates()
        .find(|p| p.region == clone.region)
        .or_else(|| candidates().next())
}

/// Material remaps for every clone permutation accepted by `built`.
///
/// The i-th mesh of a clone is paired with the i-th mesh of its source, and
/// their parts are paired in order. Sources must themselves pass `built`;
/// a clone without one is reported and skipped.
pub fn clone_remaps(
    regions: &[Region],
    meshes: &[Mesh],
    built: impl Fn(&Permutation) -> bool,
) -> Decoded<Vec<CloneRemap>> {
    let mut diagnostics = Diagnostics::new();
    let mut table = CloneRemapTable::default();

    let clones = regions
        .iter()
        .flat_map(|region| &region.permutations)
        .filter(|p| built(p));
    for clone in clones {
        let Some(clone_name) = clone.clone_name.as_deref() else {
            continue;
        };
        let Some(source) = find_source(regions, clone, clone_name, &built) else {
            diagnostics.push(Diagnostic::UnresolvedCloneSource {
                permutation: clone.name.clone(),
                clone_name: clone_name.to_owned(),
            });
            continue;
        };

        let entry = table.entry(&source.name, &clone.name);
        for (source_mesh, clone_mesh) in source.meshes().zip(clone.meshes()) {
            let (Some(source_mesh), Some(clone_mesh)) = (meshes.get(source_mesh), meshes.get(clone_mesh))
            else {
                continue;
            };
            for (source_part, clone_part) in source_mesh.parts.iter().zip(&clone_mesh.parts) {
                entry.add(source_part.material, clone_part.material);
            }
        }
    }

    Decoded::new(table.into_vec(), diagnostics)
}
