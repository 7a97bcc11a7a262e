use crate::collectors::RawGauges;
use std::time::Duration;
use sysinfo::{CpuExt, DiskExt, NetworkExt, NetworksExt, System, SystemExt};
use thiserror::Error;
use tracing::debug;

const CPU_SAMPLE_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("no disk mounted at '{0}'")]
    DiskMountNotFound(String),
    #[error("no CPUs reported by the OS")]
    NoCpus,
}

/// Reads the four raw gauges. CPU utilization is the delta between two
/// refreshes spaced one second apart, so this suspends for that long.
pub async fn collect_gauges(
    system: &mut System,
    disk_mount: &str,
) -> Result<RawGauges, TelemetryError> {
    system.refresh_cpu();
    tokio::time::sleep(CPU_SAMPLE_WINDOW).await;
    system.refresh_cpu();
    system.refresh_memory();
    system.refresh_disks_list();
    system.refresh_disks();
    system.refresh_networks_list();
    system.refresh_networks();

    let cpus = system.cpus();
    if cpus.is_empty() {
        return Err(TelemetryError::NoCpus);
    }
    let cpu_percent =
        cpus.iter().map(|c| c.cpu_usage() as f64).sum::<f64>() / cpus.len() as f64;

    let mem_percent = if system.total_memory() > 0 {
        (system.used_memory() as f64 / system.total_memory() as f64) * 100.0
    } else {
        0.0
    };

    let disk = system
        .disks()
        .iter()
        .find(|d| d.mount_point().to_string_lossy() == disk_mount)
        .ok_or_else(|| TelemetryError::DiskMountNotFound(disk_mount.to_string()))?;
    let disk_percent = if disk.total_space() > 0 {
        let used = disk.total_space().saturating_sub(disk.available_space());
        (used as f64 / disk.total_space() as f64) * 100.0
    } else {
        0.0
    };

    // Cumulative since counter reset, summed over all interfaces.
    let net_bytes: u64 = system
        .networks()
        .iter()
        .map(|(_, data)| data.total_received() + data.total_transmitted())
        .sum();

    debug!(
        cpu_percent,
        mem_percent, disk_percent, net_bytes, "collected raw gauges"
    );

    Ok(RawGauges {
        cpu_percent,
        mem_percent,
        disk_percent,
        net_bytes,
    })
}
