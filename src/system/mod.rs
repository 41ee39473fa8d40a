//! Host capacity detection for job scheduling
//!
//! The concurrency ceiling leaves two cores for the OS and the
//! inference servers' own threads, then caps by physical memory at one
//! job per GiB since each job holds a full audio signal in flight.

/// Memory granted to each concurrent job by the heuristic
const BYTES_PER_JOB: u64 = 1024 * 1024 * 1024;

/// Number of jobs the host can run side by side
///
/// `min(cores > 2 ? cores - 2 : 1, total_memory / 1 GiB)`, never less
/// than 1. Platforms where total memory cannot be read fall back to the
/// core-count bound alone.
pub fn usable_job_slots() -> usize {
    let cores = num_cpus::get();
    let by_cores = if cores > 2 { cores - 2 } else { 1 };

    match total_memory_bytes() {
        Some(total) => {
            let by_memory = ((total / BYTES_PER_JOB) as usize).max(1);
            by_cores.min(by_memory)
        }
        None => by_cores,
    }
}

/// Total physical memory of the host, if detectable
///
/// Platform support:
/// - Linux: reads /proc/meminfo
/// - macOS: queries `sysctl -n hw.memsize`
pub fn total_memory_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        if let Ok(content) = std::fs::read_to_string("/proc/meminfo") {
            for line in content.lines() {
                if line.starts_with("MemTotal:") {
                    // Format: "MemTotal:       16250356 kB"
                    if let Some(kb) = line.split_whitespace().nth(1) {
                        if let Ok(kb) = kb.parse::<u64>() {
                            return Some(kb * 1024);
                        }
                    }
                }
            }
        }
        None
    }

    #[cfg(target_os = "macos")]
    {
        if let Ok(output) = std::process::Command::new("sysctl")
            .arg("-n")
            .arg("hw.memsize")
            .output()
        {
            if let Ok(text) = String::from_utf8(output.stdout) {
                if let Ok(bytes) = text.trim().parse::<u64>() {
                    return Some(bytes);
                }
            }
        }
        None
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        None
    }
}
