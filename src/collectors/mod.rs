pub mod system;

/// One snapshot of the raw OS gauges feeding the fingerprint derivation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawGauges {
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub disk_percent: f64,
    pub net_bytes: u64,
}
