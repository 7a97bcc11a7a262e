use crate::collectors::RawGauges;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};

pub const FINGERPRINT_LEN: usize = 32;
const COLOR_PALETTE_SIZE: u8 = 25;

/// Fingerprint of one sampled machine state. Immutable once derived.
#[derive(Debug, Clone, Serialize)]
pub struct EntropyState {
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub disk_percent: f64,
    pub net_bytes: u64,
    pub rand: f64,
    pub entropy_hash: String,
    pub color_index: u8,
}

/// Fixed-format hash input: gauges to two decimals, the network counter
/// verbatim, the random draw to six decimals, joined with `-`.
pub fn canonical_string(gauges: &RawGauges, rand: f64) -> String {
    format!(
        "{:.2}-{:.2}-{:.2}-{}-{:.6}",
        gauges.cpu_percent, gauges.mem_percent, gauges.disk_percent, gauges.net_bytes, rand
    )
}

/// Derives the fingerprint from a gauge snapshot and one uniform draw
/// in [0,1). Pure: identical inputs yield identical output.
pub fn derive_state(gauges: &RawGauges, rand: f64) -> EntropyState {
    let canonical = canonical_string(gauges, rand);
    let h1 = Sha256::digest(canonical.as_bytes());
    let h2 = Sha256::digest(h1);
    let fingerprint = xor_whiten(h1.as_slice(), h2.as_slice());

    EntropyState {
        cpu_percent: gauges.cpu_percent,
        mem_percent: gauges.mem_percent,
        disk_percent: gauges.disk_percent,
        net_bytes: gauges.net_bytes,
        rand,
        entropy_hash: STANDARD.encode(fingerprint),
        color_index: fingerprint[0] % COLOR_PALETTE_SIZE,
    }
}

/// Draws the random component from the supplied generator, then derives.
pub fn derive_with_rng<R: Rng>(gauges: &RawGauges, rng: &mut R) -> EntropyState {
    derive_state(gauges, rng.random::<f64>())
}

// Folding the two hash rounds together keeps the published fingerprint
// from revealing either round directly.
fn xor_whiten(h1: &[u8], h2: &[u8]) -> [u8; FINGERPRINT_LEN] {
    let mut out = [0u8; FINGERPRINT_LEN];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = h1[i] ^ h2[i];
    }
    out
}
