use std::path::{Path, PathBuf};

use crate::error::{QueueError, Result};
use crate::names;
use crate::queue::layout::QUEUE_HEADER_SIZE;

/// Default region size when the caller does not pick one.
pub const DEFAULT_BYTES_CAPACITY: i64 = 1024 * 1024;

/// Per-queue configuration.
///
/// Every participant of one queue must use the same name, path, and
/// capacity; the name is used verbatim (with platform prefixes) for the
/// shared region and the coupling semaphore.
#[derive(Clone, Debug)]
pub struct QueueOptions {
    queue_name: String,
    path: PathBuf,
    bytes_capacity: i64,
}

impl QueueOptions {
    /// Options for the queue `queue_name`, with the backing file in the
    /// system temp directory and the default capacity.
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            path: std::env::temp_dir(),
            bytes_capacity: DEFAULT_BYTES_CAPACITY,
        }
    }

    /// Directory holding the memory-mapped backing file. Ignored on Windows,
    /// where the region is a named pagefile-backed mapping.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Total region size in bytes, header included. Must be a multiple of 8
    /// and large enough for the queue header plus one slot-alignment unit.
    pub fn with_bytes_capacity(mut self, bytes_capacity: i64) -> Self {
        self.bytes_capacity = bytes_capacity;
        self
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_capacity(&self) -> i64 {
        self.bytes_capacity
    }

    pub(crate) fn validate(&self) -> Result<()> {
        names::validate_queue_name(&self.queue_name)?;
        if self.bytes_capacity < QUEUE_HEADER_SIZE + 8 {
            return Err(QueueError::InvalidArgument(format!(
                "bytes_capacity {} is below the minimum of {}",
                self.bytes_capacity,
                QUEUE_HEADER_SIZE + 8
            )));
        }
        if self.bytes_capacity % 8 != 0 {
            return Err(QueueError::InvalidArgument(format!(
                "bytes_capacity {} is not a multiple of 8",
                self.bytes_capacity
            )));
        }
        Ok(())
    }

    /// The same options for a tagged sibling queue, e.g. the `P`/`S` halves
    /// of a channel.
    pub(crate) fn with_name_tag(&self, tag: &str) -> QueueOptions {
        QueueOptions {
            queue_name: format!("{tag}{}", self.queue_name),
            path: self.path.clone(),
            bytes_capacity: self.bytes_capacity,
        }
    }
}
