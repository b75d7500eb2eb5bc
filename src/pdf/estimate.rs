//! Size estimates and level recommendations shown before compressing

use super::policy::CompressionLevel;

const MIB: f64 = 1024.0 * 1024.0;
const SIZE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Expected output size range for a level
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SizeEstimate {
    pub min: u64,
    pub max: u64,
    pub expected: u64,
}

/// Typical reduction ratios per level: (min, max, expected)
fn reduction_range(level: CompressionLevel) -> (f64, f64, f64) {
    match level {
        CompressionLevel::Low => (0.05, 0.2, 0.1),
        CompressionLevel::Medium => (0.2, 0.5, 0.35),
        CompressionLevel::High => (0.4, 0.7, 0.55),
        CompressionLevel::Extreme => (0.6, 0.9, 0.75),
    }
}

/// Rough output size for a document of `original_size` bytes
#[must_use]
pub fn estimate_compressed_size(original_size: u64, level: CompressionLevel) -> SizeEstimate {
    let (min_reduction, max_reduction, expected_reduction) = reduction_range(level);
    let original = original_size as f64;
    SizeEstimate {
        min: (original * (1.0 - max_reduction)).round() as u64,
        max: (original * (1.0 - min_reduction)).round() as u64,
        expected: (original * (1.0 - expected_reduction)).round() as u64,
    }
}

/// Suggested level for a file, with a short explanation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recommendation {
    pub level: CompressionLevel,
    pub reason: &'static str,
}

#[must_use]
pub fn recommend_level(file_size: u64) -> Recommendation {
    let size_mb = file_size as f64 / MIB;
    if size_mb < 1.0 {
        Recommendation {
            level: CompressionLevel::Low,
            reason: "File is small. Minimal compression recommended.",
        }
    } else if size_mb < 5.0 {
        Recommendation {
            level: CompressionLevel::Medium,
            reason: "Medium compression for good balance.",
        }
    } else if size_mb < 20.0 {
        Recommendation {
            level: CompressionLevel::High,
            reason: "Large file. High compression recommended.",
        }
    } else {
        Recommendation {
            level: CompressionLevel::Extreme,
            reason: "Very large file. Maximum compression.",
        }
    }
}

/// Format a byte count as "1.5 MB" style text
#[must_use]
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut exponent = 0;
    let mut divisor = 1u64;
    while exponent < SIZE_UNITS.len() - 1 && bytes / divisor >= 1024 {
        divisor *= 1024;
        exponent += 1;
    }
    let rounded = (bytes as f64 / divisor as f64 * 100.0).round() / 100.0;

    format!("{rounded} {}", SIZE_UNITS[exponent])
}

/// Percentage saved going from `original` to `compressed` bytes.
///
/// Negative when the output is larger; zero for an empty original.
#[must_use]
pub fn savings_percent(original: usize, compressed: usize) -> i64 {
    if original == 0 {
        return 0;
    }
    let saved = original as f64 - compressed as f64;
    (saved / original as f64 * 100.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_medium() {
        let estimate = estimate_compressed_size(1000, CompressionLevel::Medium);
        assert_eq!(
            estimate,
            SizeEstimate {
                min: 500,
                max: 800,
                expected: 650
            }
        );
    }

    #[test]
    fn test_estimate_extreme_rounds() {
        let estimate = estimate_compressed_size(1001, CompressionLevel::Extreme);
        assert_eq!(estimate.min, 100);
        assert_eq!(estimate.max, 400);
        assert_eq!(estimate.expected, 250);
    }

    #[test]
    fn test_estimate_ordering_holds_for_all_levels() {
        for level in CompressionLevel::ALL {
            let estimate = estimate_compressed_size(10_000_000, level);
            assert!(estimate.min <= estimate.expected);
            assert!(estimate.expected <= estimate.max);
            assert!(estimate.max <= 10_000_000);
        }
    }

    #[test]
    fn test_recommendation_thresholds() {
        let mb = 1024 * 1024;
        assert_eq!(recommend_level(500 * 1024).level, CompressionLevel::Low);
        assert_eq!(recommend_level(mb).level, CompressionLevel::Medium);
        assert_eq!(recommend_level(5 * mb - 1).level, CompressionLevel::Medium);
        assert_eq!(recommend_level(5 * mb).level, CompressionLevel::High);
        assert_eq!(recommend_level(20 * mb).level, CompressionLevel::Extreme);
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1024 * 1024), "1 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3 GB");
        assert_eq!(format_file_size(2048 * 1024 * 1024 * 1024), "2048 GB");
    }

    #[test]
    fn test_savings_percent() {
        assert_eq!(savings_percent(1000, 250), 75);
        assert_eq!(savings_percent(1000, 1500), -50);
        assert_eq!(savings_percent(0, 10), 0);
        assert_eq!(savings_percent(3, 2), 33);
    }
}
