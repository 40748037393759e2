use color_eyre::eyre::{eyre, Context};
use color_eyre::Result;

/// Parse a memory string (like "2G", "1024M", "512") to megabytes, the unit
/// `pct` expects for `--memory` and `--swap`.
pub(crate) fn parse_memory_to_mb(memory_str: &str) -> Result<u32> {
    let memory_str = memory_str.trim();
    let Some(last_char) = memory_str.chars().last() else {
        return Err(eyre!(
            "Memory specification cannot be empty - please provide a value like '2G', '1024M', or '512'"
        ));
    };

    match last_char.to_ascii_uppercase() {
        'G' => {
            let gb: f64 = memory_str[..memory_str.len() - 1]
                .parse()
                .context("Invalid number in memory specification")?;
            if !gb.is_finite() || gb < 0.0 {
                return Err(eyre!("Invalid memory specification: {memory_str}"));
            }
            let mb = gb * 1024.0;
            if mb > f64::from(u32::MAX) {
                return Err(eyre!("Memory specification too large: {memory_str}"));
            }
            Ok(mb as u32)
        }
        'M' => memory_str[..memory_str.len() - 1]
            .parse()
            .context("Invalid number in memory specification"),
        // No suffix, assume megabytes
        _ => memory_str
            .parse()
            .context("Invalid number in memory specification"),
    }
}

/// Parse a disk size ("8", "8G", "1T") to whole gigabytes for `--rootfs`.
pub(crate) fn parse_disk_to_gb(size_str: &str) -> Result<u32> {
    let size_str = size_str.trim().to_uppercase();
    let (number, multiplier) = if let Some(n) = size_str.strip_suffix('T') {
        (n, 1024)
    } else if let Some(n) = size_str.strip_suffix('G') {
        (n, 1)
    } else {
        (size_str.as_str(), 1)
    };
    let number: u32 = number
        .parse()
        .map_err(|_| eyre!("Invalid disk size: {size_str} (expected e.g. '8' or '8G')"))?;
    number
        .checked_mul(multiplier)
        .ok_or_else(|| eyre!("Disk size too large: {size_str}"))
}
