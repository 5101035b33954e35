//! Index buffer decoding.
//!
//! Turns a flat index buffer and the subpart ranges that slice it into a lazy
//! sequence of triangles. Triangle strips use degenerate triangles (repeated
//! indices) for restarts.

use std::ops::Range;

use crate::error::{DecodeError, DecodeResult};

/// Index buffer layout as stored in the `index buffer type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum IndexBufferType {
    Default = 0,
    LineList = 1,
    LineStrip = 2,
    TriangleList = 3,
    TriangleFan = 4,
    TriangleStrip = 5,
    QuadList = 6,
    RectList = 7,
}

impl TryFrom<i32> for IndexBufferType {
    type Error = DecodeError;

    fn try_from(value: i32) -> DecodeResult<Self> {
        Ok(match value {
            0 => Self::Default,
            1 => Self::LineList,
            2 => Self::LineStrip,
            3 => Self::TriangleList,
            4 => Self::TriangleFan,
            5 => Self::TriangleStrip,
            6 => Self::QuadList,
            7 => Self::RectList,
            other => return Err(DecodeError::UnsupportedTopology(other)),
        })
    }
}

/// One decoded triangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triangle {
    pub indices: [u32; 3],
    /// Position of the originating subpart in the mesh's subpart list.
    pub subpart: usize,
    /// Sequential id across the whole mesh.
    pub id: usize,
}

/// Resolve a tag `(start, count)` pair against a buffer of `len` indices.
///
/// A count of `-1` means "to the end of the buffer".
pub fn resolve_range(mesh: usize, start: i32, count: i32, len: usize) -> DecodeResult<Range<usize>> {
    let start = usize::try_from(start)
        .map_err(|_| DecodeError::index_buffer(mesh, format!("negative index start {start}")))?;
    if start > len {
        return Err(DecodeError::index_buffer(
            mesh,
            format!("index start {start} past end of buffer ({len})"),
        ));
    }
    let end = match count {
        -1 => len,
        count if count < 0 => {
            return Err(DecodeError::index_buffer(
                mesh,
                format!("negative index count {count}"),
            ));
        }
        count => start + count as usize,
    };
    if end > len {
        return Err(DecodeError::index_buffer(
            mesh,
            format!("index range {start}..{end} past end of buffer ({len})"),
        ));
    }
    Ok(start..end)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Topology {
    List,
    Strip,
}

/// Decode the triangles of every subpart range, in order.
///
/// Validation happens up front: unsupported layouts, ranges outside the
/// buffer and triangle-list ranges whose length is not a multiple of three
/// fail before any triangle is produced.
pub fn decode_triangles<'a>(
    mesh: usize,
    kind: IndexBufferType,
    indices: &'a [u32],
    subparts: &'a [Range<usize>],
) -> DecodeResult<Triangles<'a>> {
    let topology = match kind {
        IndexBufferType::TriangleList => Topology::List,
        IndexBufferType::TriangleStrip => Topology::Strip,
        other => return Err(DecodeError::UnsupportedTopology(other as i32)),
    };

    for range in subparts {
        if range.start > range.end || range.end > indices.len() {
            return Err(DecodeError::index_buffer(
                mesh,
                format!(
                    "subpart range {range:?} outside buffer of {} indices",
                    indices.len()
                ),
            ));
        }
        if topology == Topology::List && range.len() % 3 != 0 {
            return Err(DecodeError::index_buffer(
                mesh,
                format!(
                    "triangle list range {range:?} has {} indices, not a multiple of 3",
                    range.len()
                ),
            ));
        }
    }

    Ok(Triangles {
        topology,
        indices,
        subparts,
        subpart: 0,
        cursor: 0,
        window: [0; 2],
        parity: 0,
        next_id: 0,
    })
}

/// Lazy triangle sequence produced by [`decode_triangles`].
#[derive(Debug, Clone)]
pub struct Triangles<'a> {
    topology: Topology,
    indices: &'a [u32],
    subparts: &'a [Range<usize>],
    subpart: usize,
    cursor: usize,
    window: [u32; 2],
    /// Winding parity, advanced only by emitted strip triangles.
    parity: usize,
    next_id: usize,
}

impl Triangles<'_> {
    fn emit(&mut self, indices: [u32; 3]) -> Triangle {
        let triangle = Triangle {
            indices,
            subpart: self.subpart,
            id: self.next_id,
        };
        self.next_id += 1;
        triangle
    }

    fn next_in_subpart(&mut self, slice: &[u32]) -> Option<[u32; 3]> {
        match self.topology {
            Topology::List => {
                let triangle = slice.get(self.cursor..self.cursor + 3)?;
                self.cursor += 3;
                Some([triangle[0], triangle[1], triangle[2]])
            }
            Topology::Strip => {
                while let Some(&i2) = slice.get(self.cursor) {
                    self.cursor += 1;
                    let [i0, i1] = self.window;
                    self.window = [i1, i2];
                    if self.cursor < 3 || i0 == i1 || i0 == i2 || i1 == i2 {
                        continue;
                    }
                    let triangle = if self.parity % 2 == 0 {
                        [i0, i1, i2]
                    } else {
                        [i0, i2, i1]
                    };
                    self.parity += 1;
                    return Some(triangle);
                }
                None
            }
        }
    }
}

impl Iterator for Triangles<'_> {
    type Item = Triangle;

    fn next(&mut self) -> Option<Triangle> {
        loop {
            let range = self.subparts.get(self.subpart)?.clone();
            let indices = self.indices;
            let slice = &indices[range];
            if let Some(indices) = self.next_in_subpart(slice) {
                return Some(self.emit(indices));
            }
            // Strips restart at every subpart boundary.
            self.subpart += 1;
            self.cursor = 0;
            self.window = [0; 2];
            self.parity = 0;
        }
    }
}

/// Decode a single triangle strip.
#[must_use]
pub fn strip_to_triangles(strip: &[u32]) -> Vec<[u32; 3]> {
    let ranges = [0..strip.len()];
    decode_triangles(0, IndexBufferType::TriangleStrip, strip, &ranges)
        .map(|triangles| triangles.map(|t| t.indices).collect())
        .unwrap_or_default()
}
