use std::sync::atomic::{AtomicU32, Ordering};

// Attachment ids are process-global and monotonically increasing so higher
// layers (timeline application) can tell attachment instances apart cheaply.
// They carry no skinning semantics.
static NEXT_ATTACHMENT_ID: AtomicU32 = AtomicU32::new(0);

fn next_attachment_id() -> u32 {
    NEXT_ATTACHMENT_ID.fetch_add(1, Ordering::Relaxed)
}

/// World-space pose of one bone: the combined rotation/scale/shear as a 2x2
/// affine matrix plus the bone's world translation. Produced each frame by an
/// external pose solver; read-only here.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BonePose {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub world_x: f32,
    pub world_y: f32,
}

impl BonePose {
    pub const IDENTITY: BonePose = BonePose {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        world_x: 0.0,
        world_y: 0.0,
    };
}

/// Bone input for one skinning call: a single bone for unweighted
/// attachments, or the skeleton-wide pose list indexed by the weighted
/// encoding's bone indices.
#[derive(Copy, Clone)]
pub enum BoneBinding<'a> {
    Single(&'a BonePose),
    Skeleton(&'a [BonePose]),
}

/// Attachment-local geometry for a skinned attachment.
///
/// Unweighted attachments store one `(x, y)` pair per output vertex in
/// `vertices` and no `bones`. Weighted attachments store, per output vertex,
/// a leading count `n` followed by `n` bone indices in `bones`, with one
/// `(x, y, weight)` triple per binding in `vertices`.
#[derive(Debug)]
pub struct VertexAttachment {
    id: u32,
    timeline_attachment: u32,
    pub name: String,
    pub bones: Option<Vec<usize>>,
    pub vertices: Vec<f32>,
    /// Number of world-space floats a full transform emits. Always even.
    pub world_vertices_length: usize,
}

impl VertexAttachment {
    pub fn unweighted(name: impl Into<String>, vertices: Vec<f32>) -> Self {
        debug_assert!(vertices.len() % 2 == 0);
        let world_vertices_length = vertices.len();
        let id = next_attachment_id();
        VertexAttachment {
            id,
            timeline_attachment: id,
            name: name.into(),
            bones: None,
            vertices,
            world_vertices_length,
        }
    }

    pub fn weighted(
        name: impl Into<String>,
        bones: Vec<usize>,
        vertices: Vec<f32>,
        world_vertices_length: usize,
    ) -> Self {
        debug_assert!(world_vertices_length % 2 == 0);
        let id = next_attachment_id();
        VertexAttachment {
            id,
            timeline_attachment: id,
            name: name.into(),
            bones: Some(bones),
            vertices,
            world_vertices_length,
        }
    }

    /// Unique id of this attachment instance.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Id of the attachment whose timelines also apply to this one. Defaults
    /// to this attachment's own id.
    pub fn timeline_attachment(&self) -> u32 {
        self.timeline_attachment
    }

    pub fn set_timeline_attachment(&mut self, id: u32) {
        self.timeline_attachment = id;
    }

    /// Transforms the attachment's local vertices to world coordinates.
    ///
    /// `start` is an offset into the local vertex values (two per output
    /// vertex), `count` the number of world values to write. Pairs land in
    /// `world_vertices` beginning at `offset`, `stride` values apart.
    ///
    /// A non-empty `deform` buffer replaces the local positions for
    /// unweighted attachments and is added to them, triple by triple, for
    /// weighted ones. Weights are expected to sum to 1 per vertex; no
    /// normalization is performed.
    #[allow(clippy::too_many_arguments)]
    pub fn compute_world_vertices(
        &self,
        binding: BoneBinding<'_>,
        deform: &[f32],
        start: usize,
        count: usize,
        world_vertices: &mut [f32],
        offset: usize,
        stride: usize,
    ) {
        debug_assert!(count % 2 == 0);
        debug_assert!(world_vertices.len() >= offset + (count / 2) * stride);
        let end = offset + (count / 2) * stride;

        match (&self.bones, binding) {
            (None, BoneBinding::Single(bone)) => {
                let vertices = if deform.is_empty() {
                    self.vertices.as_slice()
                } else {
                    deform
                };
                let mut vv = start;
                let mut w = offset;
                while w < end {
                    let vx = vertices[vv];
                    let vy = vertices[vv + 1];
                    world_vertices[w] = vx * bone.a + vy * bone.b + bone.world_x;
                    world_vertices[w + 1] = vx * bone.c + vy * bone.d + bone.world_y;
                    vv += 2;
                    w += stride;
                }
            }
            (Some(bones), BoneBinding::Skeleton(skeleton_bones)) => {
                // Skip whole bone groups to honor `start`, tracking how many
                // triples (and deform slots) they consumed.
                let mut v = 0usize;
                let mut skip = 0usize;
                let mut i = 0usize;
                while i < start {
                    let n = bones[v];
                    v += n + 1;
                    skip += n;
                    i += 2;
                }
                let mut b = skip * 3;
                let mut f = skip * 2;
                let mut w = offset;
                while w < end {
                    let mut wx = 0.0f32;
                    let mut wy = 0.0f32;
                    let group_end = v + 1 + bones[v];
                    v += 1;
                    while v < group_end {
                        let bone = &skeleton_bones[bones[v]];
                        let mut vx = self.vertices[b];
                        let mut vy = self.vertices[b + 1];
                        if !deform.is_empty() {
                            vx += deform[f];
                            vy += deform[f + 1];
                        }
                        let weight = self.vertices[b + 2];
                        wx += (vx * bone.a + vy * bone.b + bone.world_x) * weight;
                        wy += (vx * bone.c + vy * bone.d + bone.world_y) * weight;
                        v += 1;
                        b += 3;
                        f += 2;
                    }
                    world_vertices[w] = wx;
                    world_vertices[w + 1] = wy;
                    w += stride;
                }
            }
            // Binding does not match the attachment's encoding; nothing to emit.
            _ => {}
        }
    }

    /// Full-range transform: every vertex, packed as `(x, y)` pairs from
    /// index 0 of `world_vertices`.
    pub fn compute_world_vertices_into(
        &self,
        binding: BoneBinding<'_>,
        deform: &[f32],
        world_vertices: &mut [f32],
    ) {
        self.compute_world_vertices(
            binding,
            deform,
            0,
            self.world_vertices_length,
            world_vertices,
            0,
            2,
        );
    }
}

impl Clone for VertexAttachment {
    // A copy is a distinct instance: it gets a fresh id but keeps the
    // source's timeline association.
    fn clone(&self) -> Self {
        VertexAttachment {
            id: next_attachment_id(),
            timeline_attachment: self.timeline_attachment,
            name: self.name.clone(),
            bones: self.bones.clone(),
            vertices: self.vertices.clone(),
            world_vertices_length: self.world_vertices_length,
        }
    }
}
