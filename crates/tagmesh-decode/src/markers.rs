//! Marker groups and their reconciliation across permutations.
//!
//! Tags repeat a marker once per permutation even when the transform is the
//! same in all of them. [`reconcile`] folds those copies back into one marker
//! with a [`PermutationFilter`].

use glam::{Mat4, Quat, Vec3};
use tagmesh_records::{MarkerGroupRecord, MarkerRecord};

use crate::WORLD_UNITS_PER_TAG_UNIT;
use crate::diagnostics::{Decoded, Diagnostic, Diagnostics};
use crate::regions::{PermutationFilter, Region};
use crate::skeleton::Skeleton;

/// Marker behaviour, from the group name prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    #[default]
    Model,
    Effects,
    Garbage,
    Hint,
    Target,
}

impl MarkerKind {
    #[must_use]
    pub fn from_group_name(name: &str) -> Self {
        if name.starts_with("fx_") {
            Self::Effects
        } else if name.starts_with("target_") {
            Self::Target
        } else if name.starts_with("garbage_") {
            Self::Garbage
        } else if name.starts_with("hint_") {
            Self::Hint
        } else {
            Self::Model
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintSide {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintHeight {
    Step,
    Crouch,
    Stand,
}

/// Parsed `hint_<type>[_<side|height>]` group name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hint {
    pub hint_type: String,
    pub side: Option<HintSide>,
    pub height: Option<HintHeight>,
}

impl Hint {
    /// Parse a hint group name. Bunker hints never carry a side or height.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let mut parts = name.split('_');
        if parts.next() != Some("hint") {
            return None;
        }
        let hint_type = parts.next()?.to_owned();
        let mut hint = Self {
            hint_type,
            side: None,
            height: None,
        };
        if hint.hint_type == "bunker" {
            return Some(hint);
        }
        match parts.next() {
            Some("left") => hint.side = Some(HintSide::Left),
            Some("right") => hint.side = Some(HintSide::Right),
            Some("step") => hint.height = Some(HintHeight::Step),
            Some("crouch") => hint.height = Some(HintHeight::Crouch),
            Some("stand") => hint.height = Some(HintHeight::Stand),
            _ => {}
        }
        Some(hint)
    }
}

/// A marker with its region and permutation resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub index: usize,
    pub region: Option<usize>,
    pub permutation: Option<usize>,
    pub node: Option<usize>,
    /// World units.
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: f32,
    pub direction: Vec3,
}

impl Marker {
    /// Resolve a marker record against the region table.
    ///
    /// Returns `None` and records a diagnostic when the region or permutation
    /// index does not resolve.
    pub fn from_record(
        group: &str,
        index: usize,
        record: &MarkerRecord,
        regions: &[Region],
        diagnostics: &mut Diagnostics,
    ) -> Option<Self> {
        let unresolved = |diagnostics: &mut Diagnostics| {
            diagnostics.push(Diagnostic::UnresolvedMarkerRegion {
                group: group.to_owned(),
                marker: index,
                region: record.region_index,
                permutation: record.permutation_index,
            });
        };

        let (region, permutation) = match record.region_index {
            -1 => (None, None),
            raw => {
                let Some(region) = usize::try_from(raw).ok().and_then(|r| regions.get(r)) else {
                    unresolved(diagnostics);
                    return None;
                };
                let permutation = match record.permutation_index {
                    -1 => None,
                    raw => {
                        let Some(permutation) =
                            usize::try_from(raw).ok().and_then(|p| region.permutation(p))
                        else {
                            unresolved(diagnostics);
                            return None;
                        };
                        Some(permutation.index)
                    }
                };
                (Some(region.index), permutation)
            }
        };

        let [i, j, k, w] = record.rotation;
        Some(Self {
            index,
            region,
            permutation,
            node: usize::try_from(record.node_index).ok(),
            translation: Vec3::from(record.translation) * WORLD_UNITS_PER_TAG_UNIT,
            rotation: Quat::from_xyzw(i, j, k, w),
            scale: record.scale,
            direction: Vec3::from(record.direction),
        })
    }

    /// Local matrix relative to the owning bone, without scale.
    #[must_use]
    pub fn local_matrix(&self) -> Mat4 {
        let rotation = if self.rotation.length_squared() > 0.0 {
            self.rotation.normalize()
        } else {
            Quat::IDENTITY
        };
        Mat4::from_rotation_translation(rotation, self.translation)
    }

    fn duplicates(&self, other: &Self) -> bool {
        self.region.is_some()
            && self.region == other.region
            && self.translation == other.translation
            && self.rotation == other.rotation
    }
}

/// A marker kept after reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledMarker {
    pub marker: Marker,
    /// Permutations of the dropped duplicates.
    pub linked_permutations: Vec<String>,
    pub filter: PermutationFilter,
}

/// Fold markers with identical region, translation and rotation into one.
///
/// The first marker of each class is kept. Markers without a region are never
/// merged and apply to every permutation, as do markers without a
/// permutation.
#[must_use]
pub fn reconcile(markers: &[Marker], regions: &[Region]) -> Vec<ReconciledMarker> {
    let mut dropped = vec![false; markers.len()];
    let mut reconciled = Vec::new();

    for (i, marker) in markers.iter().enumerate() {
        if dropped[i] {
            continue;
        }
        let mut linked = Vec::new();
        for (j, other) in markers.iter().enumerate().skip(i + 1) {
            if !dropped[j] && marker.duplicates(other) {
                dropped[j] = true;
                linked.push(other);
            }
        }

        let region = marker.region.and_then(|r| regions.get(r));
        let name_of = |m: &Marker| {
            region
                .zip(m.permutation)
                .and_then(|(region, p)| region.permutation(p))
                .map(|p| p.name.as_str())
        };
        let linked_permutations: Vec<String> = linked
            .iter()
            .filter_map(|&m| name_of(m))
            .map(str::to_owned)
            .collect();

        let filter = match (region, name_of(marker)) {
            (Some(region), Some(own)) => {
                let mut included = vec![own];
                included.extend(linked_permutations.iter().map(String::as_str));
                PermutationFilter::choose(region, &included)
            }
            _ => PermutationFilter::All,
        };

        reconciled.push(ReconciledMarker {
            marker: marker.clone(),
            linked_permutations,
            filter,
        });
    }
    reconciled
}

/// A reconciled marker placed in the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedMarker {
    pub reconciled: ReconciledMarker,
    pub region: Option<String>,
    pub bone: Option<String>,
    /// Bone world matrix times the marker's local matrix.
    pub world: Mat4,
    pub display_size: f32,
    /// Garbage markers carry their direction as a velocity.
    pub velocity: Option<Vec3>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerGroup {
    pub name: String,
    pub kind: MarkerKind,
    pub hint: Option<Hint>,
    pub markers: Vec<PlacedMarker>,
}

/// Resolve, reconcile and place every marker of a group.
#[must_use]
pub fn build_marker_group(
    record: &MarkerGroupRecord,
    regions: &[Region],
    skeleton: &Skeleton,
    size_factor: f32,
) -> Decoded<MarkerGroup> {
    let mut diagnostics = Diagnostics::new();
    let kind = MarkerKind::from_group_name(&record.name);

    let markers: Vec<Marker> = record
        .markers
        .iter()
        .enumerate()
        .filter_map(|(i, marker)| {
            Marker::from_record(&record.name, i, marker, regions, &mut diagnostics)
        })
        .collect();

    let placed = reconcile(&markers, regions)
        .into_iter()
        .map(|reconciled| {
            let marker = &reconciled.marker;
            let bone = marker.node.and_then(|node| skeleton.bone(node));
            let local = marker.local_matrix();
            PlacedMarker {
                region: marker
                    .region
                    .and_then(|r| regions.get(r))
                    .map(|region| region.name.clone()),
                bone: bone.map(|bone| bone.name.clone()),
                world: bone.map_or(local, |bone| bone.world * local),
                display_size: match kind {
                    MarkerKind::Target => marker.scale * WORLD_UNITS_PER_TAG_UNIT,
                    _ => size_factor,
                },
                velocity: (kind == MarkerKind::Garbage).then_some(marker.direction),
                reconciled,
            }
        })
        .collect::<Vec<_>>();

    tracing::debug!(
        "marker group {} kept {} of {} markers",
        record.name,
        placed.len(),
        record.markers.len()
    );
    Decoded::new(
        MarkerGroup {
            name: record.name.clone(),
            kind,
            hint: (kind == MarkerKind::Hint)
                .then(|| Hint::parse(&record.name))
                .flatten(),
            markers: placed,
        },
        diagnostics,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::skeleton_from_records;
    use tagmesh_records::{NodeRecord, PermutationRecord, RegionRecord};

    fn regions() -> Vec<Region> {
        crate::regions::regions_from_records(&[RegionRecord {
            name: "body".into(),
            permutations: ["a", "b", "c", "d"]
                .iter()
                .map(|&name| PermutationRecord {
                    name: name.into(),
                    ..Default::default()
                })
                .collect(),
        }])
    }

    fn marker(permutation: i32, translation: [f32; 3]) -> MarkerRecord {
        MarkerRecord {
            region_index: 0,
            permutation_index: permutation,
            node_index: 0,
            translation,
            ..Default::default()
        }
    }

    fn group(markers: Vec<MarkerRecord>) -> MarkerGroupRecord {
        MarkerGroupRecord {
            name: "hint_vault_left".into(),
            markers,
        }
    }

    fn skeleton() -> Skeleton {
        skeleton_from_records(&[NodeRecord {
            name: "root".into(),
            default_translation: [0.0, 0.0, 1.0],
            ..Default::default()
        }])
        .unwrap()
        .value
    }

    #[test]
    fn three_shared_one_distinct() {
        let record = group(vec![
            marker(0, [1.0, 0.0, 0.0]),
            marker(1, [1.0, 0.0, 0.0]),
            marker(2, [1.0, 0.0, 0.0]),
            marker(3, [0.0, 2.0, 0.0]),
        ]);
        let decoded = build_marker_group(&record, &regions(), &skeleton(), 1.0);
        assert!(decoded.diagnostics.is_empty());
        let markers = decoded.value.markers;
        assert_eq!(markers.len(), 2);

        let shared = &markers[0].reconciled;
        assert_eq!(shared.linked_permutations, vec!["b", "c"]);
        assert_eq!(shared.filter, PermutationFilter::Exclude(vec!["d".into()]));

        let distinct = &markers[1].reconciled;
        assert!(distinct.linked_permutations.is_empty());
        assert_eq!(distinct.filter, PermutationFilter::Include(vec!["d".into()]));
    }

    #[test]
    fn marker_in_every_permutation_is_unfiltered() {
        let record = group((0..4).map(|p| marker(p, [0.5; 3])).collect());
        let markers = build_marker_group(&record, &regions(), &skeleton(), 1.0)
            .value
            .markers;
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].reconciled.filter, PermutationFilter::All);
    }

    #[test]
    fn markers_without_region_are_never_merged() {
        let mut a = marker(-1, [0.5; 3]);
        a.region_index = -1;
        let b = a.clone();
        let markers = build_marker_group(&group(vec![a, b]), &regions(), &skeleton(), 1.0)
            .value
            .markers;
        assert_eq!(markers.len(), 2);
        assert!(markers.iter().all(|m| m.reconciled.filter == PermutationFilter::All));
        assert!(markers.iter().all(|m| m.region.is_none()));
    }

    #[test]
    fn unresolved_region_is_dropped_with_diagnostic() {
        let mut bad_region = marker(0, [0.0; 3]);
        bad_region.region_index = 4;
        let bad_permutation = marker(9, [0.0; 3]);
        let decoded = build_marker_group(
            &group(vec![bad_region, bad_permutation, marker(0, [0.0; 3])]),
            &regions(),
            &skeleton(),
            1.0,
        );
        assert_eq!(decoded.value.markers.len(), 1);
        assert_eq!(
            decoded.diagnostics.into_vec(),
            vec![
                Diagnostic::UnresolvedMarkerRegion {
                    group: "hint_vault_left".into(),
                    marker: 0,
                    region: 4,
                    permutation: 0
                },
                Diagnostic::UnresolvedMarkerRegion {
                    group: "hint_vault_left".into(),
                    marker: 1,
                    region: 0,
                    permutation: 9
                },
            ]
        );
    }

    #[test]
    fn world_matrix_follows_bone() {
        let decoded = build_marker_group(
            &group(vec![marker(0, [0.1, 0.0, 0.0])]),
            &regions(),
            &skeleton(),
            1.0,
        );
        let placed = &decoded.value.markers[0];
        assert_eq!(placed.bone.as_deref(), Some("root"));
        assert_eq!(placed.region.as_deref(), Some("body"));
        assert!(
            placed
                .world
                .transform_point3(Vec3::ZERO)
                .abs_diff_eq(Vec3::new(10.0, 0.0, 100.0), 1e-5)
        );
    }

    #[test]
    fn group_kinds_and_display() {
        assert_eq!(MarkerKind::from_group_name("fx_muzzle"), MarkerKind::Effects);
        assert_eq!(MarkerKind::from_group_name("target_head"), MarkerKind::Target);
        assert_eq!(MarkerKind::from_group_name("garbage_clip"), MarkerKind::Garbage);
        assert_eq!(MarkerKind::from_group_name("primary_trigger"), MarkerKind::Model);

        let mut target = marker(0, [0.0; 3]);
        target.scale = 0.05;
        let record = MarkerGroupRecord {
            name: "target_head".into(),
            markers: vec![target],
        };
        let group = build_marker_group(&record, &regions(), &skeleton(), 3.0).value;
        assert!((group.markers[0].display_size - 5.0).abs() < 1e-5);
        assert!(group.markers[0].velocity.is_none());
        assert!(group.hint.is_none());

        let mut garbage = marker(0, [0.0; 3]);
        garbage.direction = [0.0, 0.0, 2.0];
        let record = MarkerGroupRecord {
            name: "garbage_clip".into(),
            markers: vec![garbage],
        };
        let group = build_marker_group(&record, &regions(), &skeleton(), 3.0).value;
        assert_eq!(group.markers[0].display_size, 3.0);
        assert_eq!(group.markers[0].velocity, Some(Vec3::new(0.0, 0.0, 2.0)));
    }

    #[test]
    fn hint_names() {
        assert_eq!(
            Hint::parse("hint_vault_left"),
            Some(Hint {
                hint_type: "vault".into(),
                side: Some(HintSide::Left),
                height: None
            })
        );
        assert_eq!(
            Hint::parse("hint_wall_crouch").and_then(|h| h.height),
            Some(HintHeight::Crouch)
        );
        let bunker = Hint::parse("hint_bunker_left").unwrap();
        assert_eq!(bunker.side, None);
        assert_eq!(Hint::parse("hint"), None);
        assert_eq!(Hint::parse("fx_hint"), None);
    }
}
