//! Queue-name validation and random name generation.
//!
//! A queue name is used verbatim, with platform prefixes, for both the shared
//! region and the coupling semaphore, so it must satisfy the tighter of the
//! two namespaces.

use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::error::{QueueError, Result};

/// macOS caps POSIX semaphore names at 31 bytes including the NUL; the queue
/// name additionally carries a leading `/` and a one-byte tag.
#[cfg(target_os = "macos")]
pub const MAX_QUEUE_NAME_LEN: usize = 28;

#[cfg(not(target_os = "macos"))]
pub const MAX_QUEUE_NAME_LEN: usize = 240;

pub(crate) fn validate_queue_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(QueueError::InvalidArgument(
            "queue name must not be empty".into(),
        ));
    }
    if name.contains(['/', '\\']) {
        return Err(QueueError::InvalidArgument(format!(
            "queue name '{name}' must not contain path separators"
        )));
    }
    if name.len() > MAX_QUEUE_NAME_LEN {
        return Err(QueueError::InvalidArgument(format!(
            "queue name '{name}' exceeds {MAX_QUEUE_NAME_LEN} bytes"
        )));
    }
    Ok(())
}

static NAME_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates a random queue name of `len` lowercase Latin letters.
///
/// Entropy comes from a SHA-256 digest over the high-resolution clock, the
/// process id, and a process-local counter, so concurrent callers in one or
/// several processes get distinct names. On macOS the length is capped to fit
/// the semaphore name limit.
pub fn random_name(len: usize) -> String {
    #[cfg(target_os = "macos")]
    let len = len.min(MAX_QUEUE_NAME_LEN);

    let mut out = String::with_capacity(len);
    let mut round: u64 = 0;
    while out.len() < len {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;

        let mut hasher = Sha256::new();
        hasher.update(nanos.to_le_bytes());
        hasher.update(process::id().to_le_bytes());
        hasher.update(NAME_COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
        hasher.update(round.to_le_bytes());

        for byte in hasher.finalize() {
            if out.len() == len {
                break;
            }
            out.push((b'a' + byte % 26) as char);
        }
        round += 1;
    }
    out
}
