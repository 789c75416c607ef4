//! Shared utility functions.

use crate::error::{Error, Result};

/// Parse a byte-quantity string such as `"512M"` or `"1G"`.
///
/// Accepts a plain byte count or a number with a `K`, `M`, or `G` suffix
/// (case-insensitive, optional trailing `B`). Multipliers are binary:
/// `"1G"` is 1_073_741_824 bytes.
pub fn parse_bytes(input: &str) -> Result<u64> {
    let raw = input.trim();
    if raw.is_empty() {
        return Err(Error::MemoryQuantity(input.to_string()));
    }

    let upper = raw.to_ascii_uppercase();
    let digits_end = upper
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(upper.len());
    let (number, suffix) = upper.split_at(digits_end);

    let value: u64 = number
        .parse()
        .map_err(|_| Error::MemoryQuantity(input.to_string()))?;

    let multiplier = match suffix.trim_end_matches('B') {
        "" => 1,
        "K" => 1024,
        "M" => 1024 * 1024,
        "G" => 1024 * 1024 * 1024,
        _ => return Err(Error::MemoryQuantity(input.to_string())),
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| Error::MemoryQuantity(input.to_string()))
}

/// Format bytes in human-readable form.
///
/// # Examples
///
/// ```
/// use pmx::utils::format_bytes;
///
/// assert_eq!(format_bytes(0), "0 bytes");
/// assert_eq!(format_bytes(1024), "1.0 KB");
/// assert_eq!(format_bytes(1536), "1.5 KB");
/// assert_eq!(format_bytes(1048576), "1.0 MB");
/// ```
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    const GB: u64 = 1024 * 1024 * 1024;

    if bytes == 0 {
        "0 bytes".to_string()
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} bytes")
    }
}
