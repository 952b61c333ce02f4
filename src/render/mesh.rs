use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_MESH_ID: AtomicU64 = AtomicU64::new(1);

/// A drawable mesh: vertex and index counts over externally owned geometry
/// buffers.
#[derive(Debug)]
pub struct Mesh {
    id: u64,
    vertex_count: u32,
    index_count: u32,
}

impl Mesh {
    #[must_use]
    pub fn new(vertex_count: u32, index_count: u32) -> Self {
        Self {
            id: NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed),
            vertex_count,
            index_count,
        }
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    #[must_use]
    pub const fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Whether draws of this mesh go through the index buffer.
    #[must_use]
    pub const fn is_indexed(&self) -> bool {
        self.index_count > 0
    }
}
