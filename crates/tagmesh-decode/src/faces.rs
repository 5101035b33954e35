//! Two-sided face detection.
//!
//! Tags store two-sided geometry as pairs of coincident faces with opposite
//! winding. The host scene wants one face with a two-sided flag instead.

use std::collections::BTreeMap;

use glam::Vec3;

/// Two-sidedness of a reconstructed mesh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TwoSided {
    #[default]
    None,
    /// Every face is two-sided.
    Whole,
    /// Per-triangle flags, parallel to the mesh's triangles.
    PerFace(Vec<bool>),
}

/// Result of pairing coincident faces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TwinFaces {
    /// Faces that kept their twin's side.
    pub two_sided: Vec<bool>,
    /// Reverse-wound twins to drop.
    pub removed: Vec<bool>,
}

impl TwinFaces {
    #[must_use]
    pub fn any(&self) -> bool {
        self.removed.iter().any(|&removed| removed)
    }
}

type Corner = [u32; 3];

fn corner(position: Vec3) -> Corner {
    position.to_array().map(f32::to_bits)
}

fn corners(positions: &[Vec3], triangle: [u32; 3]) -> [Corner; 3] {
    triangle.map(|i| corner(positions[i as usize]))
}

/// `b` is `a` with the opposite winding, starting at any corner.
fn is_reverse(a: [Corner; 3], b: [Corner; 3]) -> bool {
    let reversed = [b[2], b[1], b[0]];
    (0..3).any(|shift| (0..3).all(|i| a[i] == reversed[(i + shift) % 3]))
}

/// Pair each face with the first later face that covers the same positions
/// with opposite winding.
///
/// Positions are compared bit-for-bit, so twins must reference identical
/// coordinates (they may use different vertex indices).
#[must_use]
pub fn find_twin_faces(positions: &[Vec3], triangles: &[[u32; 3]]) -> TwinFaces {
    let mut groups: BTreeMap<[Corner; 3], Vec<usize>> = BTreeMap::new();
    for (face, &triangle) in triangles.iter().enumerate() {
        let mut key = corners(positions, triangle);
        key.sort_unstable();
        groups.entry(key).or_default().push(face);
    }

    let mut twins = TwinFaces {
        two_sided: vec![false; triangles.len()],
        removed: vec![false; triangles.len()],
    };
    for faces in groups.values().filter(|faces| faces.len() > 1) {
        for (i, &first) in faces.iter().enumerate() {
            if twins.removed[first] || twins.two_sided[first] {
                continue;
            }
            let a = corners(positions, triangles[first]);
            let twin = faces[i + 1..].iter().copied().find(|&second| {
                !twins.removed[second]
                    && !twins.two_sided[second]
                    && is_reverse(a, corners(positions, triangles[second]))
            });
            if let Some(second) = twin {
                twins.removed[second] = true;
                twins.two_sided[first] = true;
            }
        }
    }
    twins
}
