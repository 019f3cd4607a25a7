//! System load sampling for stats heartbeats.
//!
//! Linux reads /proc directly; other platforms report zeros rather than
//! guessing.

/// One system load sample
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSample {
    /// CPU load percent, 1-minute load average normalized by core count
    pub cpu_percent: u8,
    /// Memory usage percent (total minus available)
    pub mem_percent: u8,
}

/// Sample current system load. Returns zeros on non-Linux or read failure.
pub fn sample() -> SystemSample {
    #[cfg(target_os = "linux")]
    {
        SystemSample {
            cpu_percent: cpu_percent_linux(),
            mem_percent: mem_percent_linux(),
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        SystemSample::default()
    }
}

#[cfg(target_os = "linux")]
fn cpu_percent_linux() -> u8 {
    let Ok(loadavg) = std::fs::read_to_string("/proc/loadavg") else {
        return 0;
    };
    let Some(one_min) = loadavg.split_whitespace().next() else {
        return 0;
    };
    let Ok(load) = one_min.parse::<f64>() else {
        return 0;
    };

    let cores = num_cpus::get().max(1) as f64;
    ((load / cores) * 100.0).round().min(100.0) as u8
}

#[cfg(target_os = "linux")]
fn mem_percent_linux() -> u8 {
    let Ok(meminfo) = std::fs::read_to_string("/proc/meminfo") else {
        return 0;
    };

    let mut total_kb: u64 = 0;
    let mut available_kb: u64 = 0;
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total_kb = parse_kb(rest);
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available_kb = parse_kb(rest);
        }
        if total_kb > 0 && available_kb > 0 {
            break;
        }
    }

    if total_kb == 0 {
        return 0;
    }
    let used = total_kb.saturating_sub(available_kb);
    ((used as f64 / total_kb as f64) * 100.0).round().min(100.0) as u8
}

#[cfg(target_os = "linux")]
fn parse_kb(rest: &str) -> u64 {
    rest.split_whitespace()
        .next()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_is_bounded() {
        let s = sample();
        assert!(s.cpu_percent <= 100);
        assert!(s.mem_percent <= 100);
    }
}
