use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use tessera_common::ChunkId;

/// Immutable columnar block owned by a table.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: ChunkId,
    pub batch: RecordBatch,
}

impl Chunk {
    pub fn new(batch: RecordBatch) -> Self {
        Self {
            id: ChunkId::next(),
            batch,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }
}

/// Versioned, ordered list of chunk handles making up a table's content.
///
/// A set is never edited after publication; writers build a successor and
/// swap it in.
#[derive(Debug, Clone, Default)]
pub struct ChunkSet {
    pub version: u64,
    pub chunks: Vec<Arc<Chunk>>,
}

impl ChunkSet {
    pub fn row_count(&self) -> usize {
        self.chunks.iter().map(|c| c.num_rows()).sum()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn ids(&self) -> Vec<ChunkId> {
        self.chunks.iter().map(|c| c.id).collect()
    }

    pub(crate) fn appended(&self, chunk: Chunk) -> Self {
        let mut chunks = self.chunks.clone();
        chunks.push(Arc::new(chunk));
        Self {
            version: self.version + 1,
            chunks,
        }
    }

    pub(crate) fn successor(&self, chunks: Vec<Arc<Chunk>>) -> Self {
        Self {
            version: self.version + 1,
            chunks,
        }
    }
}
