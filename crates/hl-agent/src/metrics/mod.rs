//! System metrics collection
//!
//! `SysinfoTelemetry` fills a `Report` from the sysinfo crate. It keeps the
//! CPU and network samplers between snapshots so that usage and traffic
//! rates cover the time since the previous report.

mod connections;
mod filters;

use std::sync::Mutex;
use std::time::Instant;

use sysinfo::{
    CpuRefreshKind, Disks, MemoryRefreshKind, Networks, ProcessRefreshKind, RefreshKind, System,
};

use hl_core::config::ReportToggles;
use hl_core::traits::TelemetryProvider;
use hl_protocol::report::{Capacity, CpuUsage, LoadAverage, NetworkUsage};
use hl_protocol::{BasicInfo, Report};

pub use filters::{is_physical_disk, is_virtual_interface};

/// Telemetry provider backed by sysinfo
pub struct SysinfoTelemetry {
    toggles: ReportToggles,
    sampler: Mutex<Sampler>,
}

struct Sampler {
    system: System,
    networks: Networks,
    last_network_refresh: Instant,
}

impl SysinfoTelemetry {
    /// Create a provider filling the sections enabled in `toggles`
    pub fn new(toggles: ReportToggles) -> Self {
        let system = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::new().with_cpu_usage())
                .with_memory(MemoryRefreshKind::everything()),
        );

        Self {
            toggles,
            sampler: Mutex::new(Sampler {
                system,
                networks: Networks::new_with_refreshed_list(),
                last_network_refresh: Instant::now(),
            }),
        }
    }
}

impl TelemetryProvider for SysinfoTelemetry {
    fn snapshot(&self) -> Report {
        let toggles = self.toggles;
        let mut report = Report::default();
        let mut sampler = self
            .sampler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if toggles.cpu {
            sampler.system.refresh_cpu_usage();
            report.cpu = Some(CpuUsage {
                usage: f64::from(sampler.system.global_cpu_usage()),
            });
        }

        if toggles.ram || toggles.swap {
            sampler.system.refresh_memory();
            let system = &sampler.system;
            if toggles.ram {
                report.ram = Some(Capacity {
                    total: system.total_memory(),
                    used: system.used_memory(),
                });
            }
            if toggles.swap {
                report.swap = Some(Capacity {
                    total: system.total_swap(),
                    used: system.used_swap(),
                });
            }
        }

        if toggles.load {
            let load = System::load_average();
            report.load = Some(LoadAverage {
                load1: load.one,
                load5: load.five,
                load15: load.fifteen,
            });
        }

        if toggles.disk {
            report.disk = Some(disk_usage());
        }

        if toggles.network {
            report.network = Some(sampler.network_usage());
        }

        if toggles.connections {
            match connections::count() {
                Ok(counts) => report.connections = Some(counts),
                Err(warning) => report.warn(warning),
            }
        }

        if toggles.uptime {
            report.uptime = Some(System::uptime());
        }

        if toggles.process {
            let processes = System::new_with_specifics(
                RefreshKind::new().with_processes(ProcessRefreshKind::new()),
            );
            report.process = Some(processes.processes().len() as u64);
        }

        report
    }

    fn basic_info(&self) -> BasicInfo {
        let system = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );

        let cpu_name = system
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .unwrap_or_default();

        let os = match (System::name(), System::os_version()) {
            (Some(name), Some(version)) => format!("{} {}", name, version),
            (Some(name), None) => name,
            _ => std::env::consts::OS.to_string(),
        };

        BasicInfo {
            cpu_name,
            cpu_cores: system.cpus().len() as u64,
            arch: std::env::consts::ARCH.to_string(),
            os,
            kernel_version: System::kernel_version().unwrap_or_default(),
            mem_total: system.total_memory(),
            swap_total: system.total_swap(),
            disk_total: disk_usage().total,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Sampler {
    /// Traffic rates in bytes per second since the previous call, plus totals
    fn network_usage(&mut self) -> NetworkUsage {
        self.networks.refresh();
        let elapsed = self.last_network_refresh.elapsed().as_secs_f64();
        self.last_network_refresh = Instant::now();

        let mut usage = NetworkUsage::default();
        let (mut received, mut transmitted) = (0u64, 0u64);
        for (name, data) in &self.networks {
            if is_virtual_interface(name) {
                continue;
            }
            received += data.received();
            transmitted += data.transmitted();
            usage.total_down += data.total_received();
            usage.total_up += data.total_transmitted();
        }

        if elapsed > 0.0 {
            usage.down = (received as f64 / elapsed) as u64;
            usage.up = (transmitted as f64 / elapsed) as u64;
        }
        usage
    }
}

fn disk_usage() -> Capacity {
    let disks = Disks::new_with_refreshed_list();
    let mut capacity = Capacity::default();
    let mut seen_devices = Vec::new();

    for disk in disks.list() {
        let mount_point = disk.mount_point().to_string_lossy();
        let fs_type = disk.file_system().to_string_lossy();
        let device = disk.name().to_string_lossy().into_owned();

        if !is_physical_disk(&mount_point, &fs_type, &device) {
            continue;
        }
        // Bind mounts show the same device more than once
        if seen_devices.contains(&device) {
            continue;
        }
        seen_devices.push(device);

        capacity.total += disk.total_space();
        capacity.used += disk.total_space().saturating_sub(disk.available_space());
    }

    capacity
}
