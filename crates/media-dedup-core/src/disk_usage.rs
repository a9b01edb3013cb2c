use std::path::PathBuf;
use sysinfo::Disks;

/// Space figures for the volume holding one target path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskUsage {
    pub target: PathBuf,
    pub filesystem: String,
    pub mount_point: PathBuf,
    pub total: u64,
    pub available: u64,
}

impl DiskUsage {
    pub fn used(&self) -> u64 {
        self.total.saturating_sub(self.available)
    }

    /// Used space as a whole percentage, rounded up like `df`
    pub fn used_percent(&self) -> u64 {
        if self.total == 0 {
            return 0;
        }
        (self.used() * 100).div_ceil(self.total)
    }

    /// Render as a `df -h` style header plus one row
    pub fn to_df_lines(&self) -> String {
        format!(
            "Filesystem Size Used Avail Use% Mounted on\n{} {} {} {} {}% {}",
            self.filesystem,
            human_size(self.total),
            human_size(self.used()),
            human_size(self.available),
            self.used_percent(),
            self.mount_point.display()
        )
    }
}

/// Look up the volume of each target. Targets that do not exist or match no
/// mounted volume come back as `Err` with a printable reason.
pub fn disk_usage(targets: &[PathBuf]) -> Vec<std::result::Result<DiskUsage, String>> {
    let disks = Disks::new_with_refreshed_list();
    targets
        .iter()
        .map(|target| {
            let resolved = target
                .canonicalize()
                .map_err(|e| format!("{}: {}", target.display(), e))?;
            disks
                .list()
                .iter()
                .filter(|disk| resolved.starts_with(disk.mount_point()))
                .max_by_key(|disk| disk.mount_point().as_os_str().len())
                .map(|disk| DiskUsage {
                    target: target.clone(),
                    filesystem: disk.name().to_string_lossy().into_owned(),
                    mount_point: disk.mount_point().to_path_buf(),
                    total: disk.total_space(),
                    available: disk.available_space(),
                })
                .ok_or_else(|| format!("{}: no mounted volume found", target.display()))
        })
        .collect()
}

/// Format a byte count with a binary suffix the way `df -h` does
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "K", "M", "G", "T", "P"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{}B", bytes)
    } else if value < 10.0 {
        format!("{:.1}{}", value, UNITS[unit])
    } else {
        format!("{:.0}{}", value, UNITS[unit])
    }
}
