use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Serialize;
use sysinfo::{Networks, System};

/// Host sample taken by [`SystemSampler`].
#[derive(Debug, Clone, Default)]
pub struct HostSample {
    pub ram_usage: f64,
    pub cpu_usage: f32,
    pub uptime_secs: u64,
    pub active_interfaces: BTreeMap<String, String>,
}

/// Periodic telemetry payload.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub hostname: String,
    pub telemetry_type: &'static str,
    pub active_scan_count: usize,
    pub openvas_status: &'static str,
    pub active_interfaces: BTreeMap<String, String>,
    pub uptime: String,
    pub ram_usage: f64,
    pub cpu_usage: f32,
    pub current_time: String,
}

impl MetricsSnapshot {
    pub fn new(hostname: &str, active_scan_count: usize, online: bool, host: HostSample) -> Self {
        Self {
            hostname: hostname.to_string(),
            telemetry_type: "openvas",
            active_scan_count,
            openvas_status: if online { "online" } else { "offline" },
            active_interfaces: host.active_interfaces,
            uptime: format_uptime(host.uptime_secs),
            ram_usage: host.ram_usage,
            cpu_usage: host.cpu_usage,
            current_time: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Keeps one `System` around so CPU usage is measured between samples
/// rather than from a cold start each time.
pub struct SystemSampler {
    system: Mutex<System>,
}

impl SystemSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
        }
    }

    pub fn sample(&self) -> HostSample {
        let (ram_usage, cpu_usage) = {
            let mut system = self.system.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            system.refresh_cpu_usage();
            system.refresh_memory();
            let total = system.total_memory();
            let ram = if total == 0 {
                0.0
            } else {
                (system.used_memory() as f64 / total as f64 * 1000.0).round() / 10.0
            };
            (ram, system.global_cpu_usage())
        };

        HostSample {
            ram_usage,
            cpu_usage,
            uptime_secs: System::uptime(),
            active_interfaces: active_interfaces(),
        }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// First address of every interface that has one.
fn active_interfaces() -> BTreeMap<String, String> {
    let networks = Networks::new_with_refreshed_list();
    networks
        .list()
        .iter()
        .filter_map(|(name, data)| {
            data.ip_networks()
                .first()
                .map(|net| (name.clone(), net.addr.to_string()))
        })
        .collect()
}

/// Host name used as the machine id on delivered findings.
pub fn host_name() -> String {
    System::host_name()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    format!("{} days, {} hours, {} minutes", days, hours, minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(0), "0 days, 0 hours, 0 minutes");
        assert_eq!(format_uptime(59), "0 days, 0 hours, 0 minutes");
        assert_eq!(format_uptime(3 * 86_400 + 4 * 3_600 + 5 * 60 + 9), "3 days, 4 hours, 5 minutes");
    }

    #[test]
    fn test_snapshot_status_labels() {
        let online = MetricsSnapshot::new("scanner-01", 2, true, HostSample::default());
        assert_eq!(online.openvas_status, "online");
        assert_eq!(online.telemetry_type, "openvas");
        assert_eq!(online.active_scan_count, 2);

        let offline = MetricsSnapshot::new("scanner-01", 0, false, HostSample::default());
        assert_eq!(offline.openvas_status, "offline");
    }

    #[test]
    fn test_snapshot_serializes_flat() {
        let snapshot = MetricsSnapshot::new("h", 1, true, HostSample {
            uptime_secs: 3_600,
            ..Default::default()
        });
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["hostname"], "h");
        assert_eq!(value["uptime"], "0 days, 1 hours, 0 minutes");
        assert!(value["active_interfaces"].is_object());
        assert!(value["current_time"].as_str().unwrap().len() == 19);
    }

    #[test]
    fn test_sampler_reports_sane_values() {
        let sample = SystemSampler::new().sample();
        assert!((0.0..=100.0).contains(&sample.ram_usage));
        assert!(sample.cpu_usage >= 0.0);
    }
}
