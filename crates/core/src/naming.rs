//! Filename conventions for generated and exported files.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

/// Characters that are unsafe in filenames on at least one platform,
/// including full-width colon and semicolon.
static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/:*?"<>|：；]"#).expect("valid regex"));

/// Download names: word characters, dash and dot only.
static DOWNLOAD_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w\-.]+$").expect("valid regex"));

/// Fallback when sanitizing leaves nothing.
pub const UNNAMED: &str = "unnamed";

/// Replace unsafe characters with `_`, trim spaces and dots.
pub fn sanitize_filename(name: &str) -> String {
    let replaced = UNSAFE_CHARS.replace_all(name, "_");
    let trimmed = replaced.trim_matches(|c: char| c == ' ' || c == '.');
    if trimmed.is_empty() {
        UNNAMED.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Directory that holds a project's generated images and videos.
pub fn project_output_dir(outputs_dir: &Path, project_name: &str) -> PathBuf {
    outputs_dir.join(sanitize_filename(project_name))
}

/// `shot_007_20250101_120000_nb.png`
pub fn shot_image_filename(shot_number: u32, at: DateTime<Utc>, model_suffix: &str) -> String {
    format!(
        "shot_{shot_number:03}_{}_{model_suffix}.png",
        at.format("%Y%m%d_%H%M%S")
    )
}

/// Reference image for a character, scene or prop:
/// `{project}_{entity}_{timestamp}_{suffix}.png`.
pub fn reference_image_filename(
    project_name: &str,
    entity_name: &str,
    at: DateTime<Utc>,
    model_suffix: &str,
) -> String {
    format!(
        "{}_{}_{}_{model_suffix}.png",
        sanitize_filename(project_name).replace(' ', "_"),
        sanitize_filename(entity_name).replace(' ', "_"),
        at.format("%Y%m%d_%H%M%S")
    )
}

/// Export file name for a project: `{name}_{timestamp}.{ext}`.
pub fn export_filename(project_name: &str, at: DateTime<Utc>, extension: &str) -> String {
    format!(
        "{}_{}.{extension}",
        sanitize_filename(project_name).replace(' ', "_"),
        at.format("%Y%m%d_%H%M%S")
    )
}

/// Whether `name` is acceptable as a bare download filename.
pub fn is_safe_download_name(name: &str) -> bool {
    DOWNLOAD_NAME.is_match(name) && name != "." && name != ".." && !name.contains("..")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn replaces_unsafe_characters() {
        assert_eq!(sanitize_filename("第一集：重逢/上"), "第一集_重逢_上");
        assert_eq!(sanitize_filename(r#"a*b?c"d<e>f|g"#), "a_b_c_d_e_f_g");
    }

    #[test]
    fn trims_dots_and_spaces() {
        assert_eq!(sanitize_filename("  .hidden. "), "hidden");
    }

    #[test]
    fn empty_becomes_unnamed() {
        assert_eq!(sanitize_filename(" .. "), UNNAMED);
        assert_eq!(sanitize_filename(""), UNNAMED);
    }

    #[test]
    fn shot_filename_is_zero_padded() {
        let at = Utc.with_ymd_and_hms(2025, 3, 9, 8, 5, 1).unwrap();
        assert_eq!(
            shot_image_filename(7, at, "nb"),
            "shot_007_20250309_080501_nb.png"
        );
    }

    #[test]
    fn reference_filename_sanitizes_both_names() {
        let at = Utc.with_ymd_and_hms(2025, 3, 9, 8, 5, 1).unwrap();
        assert_eq!(
            reference_image_filename("My Story", "林/小雨", at, "cloud"),
            "My_Story_林_小雨_20250309_080501_cloud.png"
        );
    }

    #[test]
    fn download_names_reject_traversal() {
        assert!(is_safe_download_name("story_20250101_000000.html"));
        assert!(!is_safe_download_name("../secret"));
        assert!(!is_safe_download_name("a/b.html"));
        assert!(!is_safe_download_name(".."));
        assert!(!is_safe_download_name(""));
    }
}
