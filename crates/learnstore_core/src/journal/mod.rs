//! Append-only journal of store mutations.
//!
//! The journal is the only durable state of a store. Each mutation is one
//! frame; a batch is one frame, which is what makes it atomic. On open the
//! journal is replayed from the start, and anything after the last intact
//! frame is cut off.

mod record;

pub use record::{compute_crc32, JournalOp, CRC_SIZE, FRAME_MAGIC, FRAME_VERSION, HEADER_SIZE};

use crate::error::CoreResult;
use learnstore_storage::StorageBackend;

/// Result of replaying a journal.
#[derive(Debug, Default)]
pub struct Replay {
    /// Intact operations, oldest first.
    pub ops: Vec<JournalOp>,
    /// Bytes dropped from the tail because they did not form a valid frame.
    pub discarded_bytes: u64,
}

/// Writes and replays journal frames on a storage backend.
pub struct Journal {
    backend: Box<dyn StorageBackend>,
    sync_on_write: bool,
    frames: u64,
    frames_since_compaction: u64,
}

impl Journal {
    /// Wraps a backend. Call [`replay`](Self::replay) before appending.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_write: bool) -> Self {
        Self {
            backend,
            sync_on_write,
            frames: 0,
            frames_since_compaction: 0,
        }
    }

    /// Reads every intact frame and truncates a torn or corrupt tail.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or truncated, or if an
    /// intact frame holds a payload that does not decode.
    pub fn replay(&mut self) -> CoreResult<Replay> {
        let data = self.backend.read_all()?;
        let mut ops = Vec::new();
        let mut offset = 0usize;

        while offset < data.len() {
            match JournalOp::decode_frame(&data[offset..])? {
                Some((op, len)) => {
                    ops.push(op);
                    offset += len;
                }
                None => break,
            }
        }

        let discarded_bytes = (data.len() - offset) as u64;
        if discarded_bytes > 0 {
            tracing::warn!(
                offset,
                discarded_bytes,
                "journal tail is not a valid frame; truncating"
            );
            self.backend.truncate(offset as u64)?;
            self.backend.sync()?;
        }

        self.frames = ops.len() as u64;
        self.frames_since_compaction = self.frames;
        Ok(Replay {
            ops,
            discarded_bytes,
        })
    }

    /// Appends one frame. Returns its offset.
    ///
    /// A write the backend refuses part way is cut back off, so the next
    /// frame does not land behind a torn one.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the backend refuses the write.
    pub fn append(&mut self, op: &JournalOp) -> CoreResult<u64> {
        let frame = op.encode_frame()?;
        let start = self.backend.size()?;
        let offset = match self.backend.append(&frame) {
            Ok(offset) => offset,
            Err(err) => {
                if let Err(trim) = self.backend.truncate(start) {
                    tracing::warn!(error = %trim, "could not cut back a failed journal write");
                }
                return Err(err.into());
            }
        };
        if self.sync_on_write {
            self.backend.sync()?;
        } else {
            self.backend.flush()?;
        }
        self.frames += 1;
        self.frames_since_compaction += 1;
        Ok(offset)
    }

    /// Replaces the whole journal with `ops`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend refuses the replacement; the previous
    /// content is then left in place.
    pub fn rewrite(&mut self, ops: &[JournalOp]) -> CoreResult<()> {
        let mut image = Vec::new();
        for op in ops {
            image.extend_from_slice(&op.encode_frame()?);
        }
        self.backend.replace(&image)?;
        self.frames = ops.len() as u64;
        self.frames_since_compaction = 0;
        Ok(())
    }

    /// Forces written frames to durable storage.
    pub fn sync(&mut self) -> CoreResult<()> {
        self.backend.sync()?;
        Ok(())
    }

    /// Number of frames in the journal.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Frames appended since the journal was last rewritten or opened
    /// without a rewrite.
    #[must_use]
    pub fn frames_since_compaction(&self) -> u64 {
        self.frames_since_compaction
    }

    /// Journal size in bytes.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }

    /// Gives the backend back, e.g. so a closed engine can be reopened.
    pub fn into_backend(self) -> Box<dyn StorageBackend> {
        self.backend
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("frames", &self.frames)
            .field("sync_on_write", &self.sync_on_write)
            .finish_non_exhaustive()
    }
}
