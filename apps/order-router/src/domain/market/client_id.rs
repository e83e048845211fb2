//! Client order id generation.
//!
//! Ids combine a truncated timestamp (high word) with an OS-random value
//! (low word). A process-wide high-water mark makes every id strictly
//! greater than the previous one, so concurrent generation never collides.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use rand::TryRngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

static LAST_CLIENT_ID: AtomicU64 = AtomicU64::new(0);

/// Generate a unique, monotonically increasing client order id.
pub fn generate_client_order_id() -> u64 {
    let seconds = Utc::now().timestamp().clamp(0, i64::from(u32::MAX)) as u64;
    let random = u64::from(OsRng.try_next_u32().unwrap_or_else(|_| rand::random()));
    let candidate = (seconds << 32) | random;

    let previous = LAST_CLIENT_ID
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
            Some(candidate.max(last.wrapping_add(1)))
        })
        .unwrap_or_else(|last| last);

    candidate.max(previous.wrapping_add(1))
}

/// Protocol client id: the low 32 bits of a generated id.
#[must_use]
pub const fn protocol_client_id(client_order_id: u64) -> u32 {
    (client_order_id & 0xFFFF_FFFF) as u32
}

/// Full client order id for a ledger `client_id`.
///
/// Numeric ids (as produced by [`generate_client_order_id`]) are used as-is.
/// Any other string maps to the first eight bytes of its SHA-256 digest, so
/// the same ledger row always yields the same protocol id.
#[must_use]
pub fn client_order_id_for(client_id: &str) -> u64 {
    if let Ok(id) = client_id.parse::<u64>() {
        return id;
    }
    let digest = Sha256::digest(client_id.as_bytes());
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}
