//! Memory and garbage-collector tuning for launched server jars.
//!
//! The heap gets a slice of currently free system memory, and the GC flags
//! follow the widely used G1 tuning set for game servers. Flag layouts for
//! Java 11 and newer were never validated against the supported server
//! builds, so those versions are rejected outright instead of guessed at.

use sysinfo::System;

use crate::utils::java_detector::JavaError;

/// Dedicated heap is free system memory divided by this.
pub const MEMORY_SPLIT: u64 = 3;

/// Dedicated-memory threshold (GB) above which region sizing is scaled up.
const LARGE_HEAP_GB: u64 = 12;

const BASELINE: &[&str] = &[
    "-XX:+UseG1GC",
    "-XX:+ParallelRefProcEnabled",
    "-XX:MaxGCPauseMillis=200",
    "-XX:+UnlockExperimentalVMOptions",
    "-XX:+DisableExplicitGC",
    "-XX:-OmitStackTraceInFastThrow",
    "-XX:+AlwaysPreTouch",
    "-XX:G1NewSizePercent=30",
    "-XX:G1MaxNewSizePercent=40",
    "-XX:G1HeapRegionSize=8M",
    "-XX:G1ReservePercent=20",
    "-XX:G1HeapWastePercent=5",
    "-XX:G1MixedGCCountTarget=8",
    "-XX:InitiatingHeapOccupancyPercent=15",
    "-XX:G1MixedGCLiveThresholdPercent=90",
    "-XX:G1RSetUpdatingPauseTimePercent=5",
    "-XX:SurvivorRatio=32",
    "-XX:MaxTenuringThreshold=1",
];

const GC_LOG_FLAGS: &[&str] = &[
    "-Xloggc:gc.log",
    "-verbose:gc",
    "-XX:+PrintGCDetails",
    "-XX:+PrintGCDateStamps",
    "-XX:+PrintGCTimeStamps",
    "-XX:+UseGCLogFileRotation",
    "-XX:NumberOfGCLogFiles=5",
    "-XX:GCLogFileSize=1M",
];

/// How many whole gigabytes of heap to dedicate given free system memory.
pub fn dedicated_memory_gb(free_bytes: u64) -> u64 {
    (free_bytes as f64 / 1e9 / MEMORY_SPLIT as f64).round() as u64
}

/// Samples currently available memory.
pub fn free_system_memory() -> u64 {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.available_memory()
}

/// Builds the full JVM argument list (heap sizing first, then GC tuning)
/// for the given runtime major version and dedicated heap size.
pub fn build_flags(java_major: u32, dedicated_gb: u64) -> Result<Vec<String>, JavaError> {
    if java_major >= 11 {
        return Err(JavaError::WrongVersion { found: java_major });
    }

    // Keep at least 1G even on starved machines.
    let heap_gb = dedicated_gb.max(1);

    let mut flags = vec![format!("-Xms{heap_gb}G"), format!("-Xmx{heap_gb}G")];
    flags.extend(BASELINE.iter().map(|f| f.to_string()));

    if dedicated_gb > LARGE_HEAP_GB {
        replace_flag(&mut flags, "-XX:G1NewSizePercent=30", "-XX:G1NewSizePercent=40");
        replace_flag(
            &mut flags,
            "-XX:G1MaxNewSizePercent=40",
            "-XX:G1MaxNewSizePercent=50",
        );
        replace_flag(&mut flags, "-XX:G1HeapRegionSize=8M", "-XX:G1HeapRegionSize=16M");
        replace_flag(&mut flags, "-XX:G1ReservePercent=20", "-XX:G1ReservePercent=15");
        replace_flag(
            &mut flags,
            "-XX:InitiatingHeapOccupancyPercent=15",
            "-XX:InitiatingHeapOccupancyPercent=20",
        );
    }

    if (8..=10).contains(&java_major) {
        flags.extend(GC_LOG_FLAGS.iter().map(|f| f.to_string()));
    }
    if java_major == 8 {
        flags.push("-XX:+UseLargePagesInMetaspace".to_string());
    }

    Ok(flags)
}

fn replace_flag(flags: &mut [String], from: &str, to: &str) {
    if let Some(slot) = flags.iter_mut().find(|f| *f == from) {
        *slot = to.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedicated_memory_rounds_thirds() {
        // 12 GB free -> 4 GB heap
        assert_eq!(dedicated_memory_gb(12_000_000_000), 4);
        // 2 GB free rounds to 1
        assert_eq!(dedicated_memory_gb(2_000_000_000), 1);
    }

    #[test]
    fn heap_flags_come_first() {
        let flags = build_flags(8, 4).unwrap();
        assert_eq!(flags[0], "-Xms4G");
        assert_eq!(flags[1], "-Xmx4G");
    }

    #[test]
    fn small_heap_keeps_baseline_regions() {
        let flags = build_flags(8, 4).unwrap();
        assert!(flags.contains(&"-XX:G1NewSizePercent=30".to_string()));
        assert!(flags.contains(&"-XX:G1HeapRegionSize=8M".to_string()));
    }

    #[test]
    fn large_heap_scales_region_flags() {
        let flags = build_flags(8, 16).unwrap();
        assert!(flags.contains(&"-XX:G1NewSizePercent=40".to_string()));
        assert!(flags.contains(&"-XX:G1MaxNewSizePercent=50".to_string()));
        assert!(flags.contains(&"-XX:G1HeapRegionSize=16M".to_string()));
        assert!(flags.contains(&"-XX:G1ReservePercent=15".to_string()));
        assert!(flags.contains(&"-XX:InitiatingHeapOccupancyPercent=20".to_string()));
        assert!(!flags.contains(&"-XX:G1NewSizePercent=30".to_string()));
    }

    #[test]
    fn gc_logging_only_for_8_through_10() {
        let v8 = build_flags(8, 4).unwrap();
        let v10 = build_flags(10, 4).unwrap();
        assert!(v8.contains(&"-Xloggc:gc.log".to_string()));
        assert!(v10.contains(&"-Xloggc:gc.log".to_string()));
    }

    #[test]
    fn large_pages_only_on_8() {
        let v8 = build_flags(8, 4).unwrap();
        let v9 = build_flags(9, 4).unwrap();
        assert!(v8.contains(&"-XX:+UseLargePagesInMetaspace".to_string()));
        assert!(!v9.contains(&"-XX:+UseLargePagesInMetaspace".to_string()));
    }

    #[test]
    fn java_11_and_newer_are_rejected() {
        assert!(matches!(
            build_flags(11, 4),
            Err(JavaError::WrongVersion { found: 11 })
        ));
        assert!(matches!(
            build_flags(17, 4),
            Err(JavaError::WrongVersion { found: 17 })
        ));
    }

    #[test]
    fn zero_free_memory_still_gets_a_heap() {
        let flags = build_flags(8, 0).unwrap();
        assert_eq!(flags[0], "-Xms1G");
    }
}
