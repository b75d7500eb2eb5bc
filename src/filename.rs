//! Output file naming

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::pdf::CompressionLevel;

/// Default output name: `report.pdf` becomes `report_compressed_42%smaller.pdf`
pub const DEFAULT_OUTPUT_TEMPLATE: &str = "{{stem}}_compressed_{{savings}}%smaller.pdf";

const MAX_STEM_LEN: usize = 200;

// Invalid on Windows: < > : " / \ | ? * and control characters
static INVALID_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).expect("valid regex"));

static RESERVED_NAMES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(CON|PRN|AUX|NUL|COM[1-9]|LPT[1-9])$").expect("valid regex")
});

/// Sanitize a filename for cross-platform compatibility
pub fn sanitize_filename(name: &str) -> String {
    let sanitized = INVALID_CHARS.replace_all(name, "_");

    // Leading/trailing spaces and dots are trouble on Windows
    let sanitized = sanitized.trim_matches(|c| c == ' ' || c == '.');

    if RESERVED_NAMES.is_match(sanitized) {
        return format!("_{sanitized}");
    }

    let sanitized = truncate_on_char_boundary(sanitized, MAX_STEM_LEN);
    if sanitized.is_empty() {
        "untitled".to_string()
    } else {
        sanitized.to_string()
    }
}

fn truncate_on_char_boundary(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Replace `{{variable}}` placeholders; unknown placeholders are left alone
pub fn render_template(template: &str, variables: &HashMap<&str, String>) -> String {
    let mut result = template.to_string();
    for (key, value) in variables {
        result = result.replace(&format!("{{{{{key}}}}}"), value);
    }
    result
}

/// Where to write the compressed copy of `input`.
///
/// The file lands next to the input. Negative savings are reported as 0.
/// Supported placeholders: `stem`, `savings`, `level`.
pub fn compressed_output_path(
    input: &Path,
    template: &str,
    savings_percent: i64,
    level: CompressionLevel,
) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let variables = HashMap::from([
        ("stem", sanitize_filename(&stem)),
        ("savings", savings_percent.max(0).to_string()),
        ("level", level.as_str().to_string()),
    ]);
    let name = sanitize_filename(&render_template(template, &variables));

    input.parent().unwrap_or(Path::new("")).join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_basic() {
        assert_eq!(sanitize_filename("Annual Report"), "Annual Report");
        assert_eq!(sanitize_filename("Report: 2024"), "Report_ 2024");
        assert_eq!(sanitize_filename("Q1/Q2"), "Q1_Q2");
        assert_eq!(sanitize_filename("Q1\\Q2"), "Q1_Q2");
        assert_eq!(sanitize_filename("a|b<c>d?e*f\"g"), "a_b_c_d_e_f_g");
    }

    #[test]
    fn test_sanitize_reserved() {
        assert_eq!(sanitize_filename("CON"), "_CON");
        assert_eq!(sanitize_filename("lpt9"), "_lpt9");
        assert_eq!(sanitize_filename("CONSOLE"), "CONSOLE");
    }

    #[test]
    fn test_sanitize_empty_and_trim() {
        assert_eq!(sanitize_filename(""), "untitled");
        assert_eq!(sanitize_filename(" . "), "untitled");
        assert_eq!(sanitize_filename("..scan.."), "scan");
    }

    #[test]
    fn test_sanitize_long_multibyte_name() {
        let long_name = "é".repeat(150);
        let result = sanitize_filename(&long_name);
        assert_eq!(result.len(), 200);
        assert_eq!(result.chars().count(), 100);
    }

    #[test]
    fn test_render_template_leaves_unknown_placeholders() {
        let vars = HashMap::from([("stem", "doc".to_string())]);
        assert_eq!(
            render_template("{{stem}}-{{unknown}}.pdf", &vars),
            "doc-{{unknown}}.pdf"
        );
    }

    #[test]
    fn test_default_output_path() {
        let path = compressed_output_path(
            Path::new("/tmp/scans/report.pdf"),
            DEFAULT_OUTPUT_TEMPLATE,
            42,
            CompressionLevel::High,
        );
        assert_eq!(
            path,
            PathBuf::from("/tmp/scans/report_compressed_42%smaller.pdf")
        );
    }

    #[test]
    fn test_negative_savings_clamped() {
        let path = compressed_output_path(
            Path::new("tiny.pdf"),
            DEFAULT_OUTPUT_TEMPLATE,
            -12,
            CompressionLevel::Low,
        );
        assert_eq!(path, PathBuf::from("tiny_compressed_0%smaller.pdf"));
    }

    #[test]
    fn test_custom_template_with_level() {
        let path = compressed_output_path(
            Path::new("in/book.pdf"),
            "{{stem}}.{{level}}.pdf",
            30,
            CompressionLevel::Extreme,
        );
        assert_eq!(path, PathBuf::from("in/book.extreme.pdf"));
    }
}
