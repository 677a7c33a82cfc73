use crate::TransferError;

/// A half-open byte range `[byte_start, byte_end)` of the source file.
///
/// The payload is not held here; it is read from the file when the chunk is
/// transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub byte_start: u64,
    pub byte_end: u64,
}

impl Chunk {
    /// Length of the chunk in bytes.
    pub fn len(&self) -> u64 {
        self.byte_end - self.byte_start
    }

    pub fn is_empty(&self) -> bool {
        self.byte_end == self.byte_start
    }
}

/// Ordered partition of a file into fixed-size chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    file_size: u64,
    chunk_size: u64,
    chunks: Vec<Chunk>,
}

impl ChunkPlan {
    /// Partitions `[0, file_size)` into chunks of `chunk_size` bytes.
    ///
    /// The last chunk may be shorter. An empty file yields an empty plan.
    pub fn new(file_size: u64, chunk_size: u64) -> Result<Self, TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::InvalidChunkSize(chunk_size));
        }

        let count = file_size.div_ceil(chunk_size);
        let chunks = (0..count)
            .map(|i| {
                let byte_start = i * chunk_size;
                Chunk {
                    index: i as usize,
                    byte_start,
                    byte_end: (byte_start + chunk_size).min(file_size),
                }
            })
            .collect();

        Ok(Self {
            file_size,
            chunk_size,
            chunks,
        })
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Returns the chunk with the given index.
    pub fn get(&self, index: usize) -> Option<&Chunk> {
        self.chunks.get(index)
    }

    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_partition(plan: &ChunkPlan) {
        let mut expected_start = 0;
        for (i, chunk) in plan.chunks().iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(chunk.byte_start, expected_start);
            assert!(!chunk.is_empty());
            assert!(chunk.len() <= plan.chunk_size());
            expected_start = chunk.byte_end;
        }
        assert_eq!(expected_start, plan.file_size());
    }

    #[test]
    fn exact_multiple() {
        let plan = ChunkPlan::new(4096, 1024).unwrap();
        assert_eq!(plan.len(), 4);
        assert_partition(&plan);
        assert_eq!(plan.get(3).unwrap().len(), 1024);
    }

    #[test]
    fn short_last_chunk() {
        let plan = ChunkPlan::new(2500, 1000).unwrap();
        assert_eq!(plan.len(), 3);
        assert_partition(&plan);
        assert_eq!(
            plan.get(2).copied(),
            Some(Chunk {
                index: 2,
                byte_start: 2000,
                byte_end: 2500,
            })
        );
    }

    #[test]
    fn smaller_than_one_chunk() {
        let plan = ChunkPlan::new(10, 1024).unwrap();
        assert_eq!(plan.len(), 1);
        assert_partition(&plan);
    }

    #[test]
    fn empty_file_has_no_chunks() {
        let plan = ChunkPlan::new(0, 1024).unwrap();
        assert!(plan.is_empty());
        assert!(plan.get(0).is_none());
    }

    #[test]
    fn zero_chunk_size_rejected() {
        assert!(matches!(
            ChunkPlan::new(100, 0),
            Err(TransferError::InvalidChunkSize(0))
        ));
    }

    #[test]
    fn partition_holds_for_many_sizes() {
        for size in [1u64, 7, 1023, 1024, 1025, 99_999] {
            for chunk in [1u64, 3, 512, 1024, 4096] {
                let plan = ChunkPlan::new(size, chunk).unwrap();
                assert_eq!(plan.len() as u64, size.div_ceil(chunk));
                assert_partition(&plan);
            }
        }
    }
}
