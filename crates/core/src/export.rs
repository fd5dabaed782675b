//! Storyboard document export.
//!
//! Every format renders the same content: a title page, then one section per
//! shot with its eleven resolved prompt fields. HTML output paginates with a
//! CSS page break after every third shot (never after the last one); PDF
//! output applies the same pagination directly, see [`crate::export_pdf`].

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::export_pdf;
use crate::naming::export_filename;
use crate::project::{Project, Shot};
use crate::shot_prompt::{ShotFields, LABEL_DIALOGUE};
use crate::types::Timestamp;

/// Shots rendered per printed page.
pub const SHOTS_PER_PAGE: usize = 3;

/// Dialogue placeholder meaning "no lines".
pub(crate) const NO_DIALOGUE: &str = "无";

pub(crate) const TITLE: &str = "分镜脚本";

const HTML_STYLE: &str = "\
body { font-family: 'Noto Sans CJK SC', 'PingFang SC', 'Microsoft YaHei', sans-serif; margin: 20mm; color: #222; }
.title-page { text-align: center; padding-top: 50mm; page-break-after: always; }
.title-page h1 { font-size: 28pt; }
.shot { margin-bottom: 10mm; }
.shot h2 { font-size: 13pt; border-bottom: 1px solid #ccc; }
.page-break { page-break-after: always; }
table { border-collapse: collapse; width: 100%; }
td { border: 0.5pt solid #e0e0e0; padding: 4px 5px; vertical-align: top; }
td.label { background: #f8f9fa; width: 80pt; font-weight: bold; }
td.dialogue { font-style: italic; color: #1a4d8f; }
img.frame { max-width: 100%; max-height: 80mm; margin: 4mm 0; }
";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Html,
    #[serde(alias = "md")]
    Markdown,
    Json,
    Pdf,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Html => "html",
            ExportFormat::Markdown => "md",
            ExportFormat::Json => "json",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Html => "text/html; charset=utf-8",
            ExportFormat::Markdown => "text/markdown; charset=utf-8",
            ExportFormat::Json => "application/json",
            ExportFormat::Pdf => "application/pdf",
        }
    }

    /// Content type for a file name, by extension.
    pub fn content_type_for(filename: &str) -> &'static str {
        match Path::new(filename).extension().and_then(|e| e.to_str()) {
            Some("html") => ExportFormat::Html.content_type(),
            Some("md") => ExportFormat::Markdown.content_type(),
            Some("json") => ExportFormat::Json.content_type(),
            Some("pdf") => ExportFormat::Pdf.content_type(),
            _ => "application/octet-stream",
        }
    }
}

/// Render `project` in a text `format`. Image links are made relative to
/// `base_dir`'s `exports` sibling when they live under `base_dir`.
pub fn render(
    project: &Project,
    format: ExportFormat,
    base_dir: &Path,
    at: Timestamp,
) -> Result<String, CoreError> {
    match format {
        ExportFormat::Html => Ok(render_html(project, base_dir, at)),
        ExportFormat::Markdown => Ok(render_markdown(project, base_dir, at)),
        ExportFormat::Json => serde_json::to_string_pretty(project)
            .map_err(|e| CoreError::Internal(format!("serialize project: {e}"))),
        ExportFormat::Pdf => Err(CoreError::Unsupported(
            "PDF is a binary format; use write_export".to_string(),
        )),
    }
}

/// Render and write an export into `exports_dir`; returns the written path.
/// `pdf_font` is the configured font for PDF output, if any.
pub fn write_export(
    project: &Project,
    format: ExportFormat,
    base_dir: &Path,
    exports_dir: &Path,
    pdf_font: Option<&Path>,
    at: Timestamp,
) -> Result<PathBuf, CoreError> {
    let content = match format {
        ExportFormat::Pdf => export_pdf::render_pdf(project, pdf_font, at)?,
        _ => render(project, format, base_dir, at)?.into_bytes(),
    };
    std::fs::create_dir_all(exports_dir)
        .map_err(|e| CoreError::Internal(format!("create {}: {e}", exports_dir.display())))?;
    let path = exports_dir.join(export_filename(&project.name, at, format.extension()));
    std::fs::write(&path, content)
        .map_err(|e| CoreError::Internal(format!("write {}: {e}", path.display())))?;
    tracing::info!(project_id = %project.id, path = %path.display(), ?format, "Exported storyboard");
    Ok(path)
}

// ---------------------------------------------------------------------------
// HTML
// ---------------------------------------------------------------------------

fn render_html(project: &Project, base_dir: &Path, at: Timestamp) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "<!DOCTYPE html>\n<html lang=\"zh-CN\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{} - {TITLE}</title>\n<style>\n{HTML_STYLE}</style>\n</head>\n<body>\n",
        escape_html(&project.name)
    );

    out.push_str("<section class=\"title-page\">\n");
    let _ = writeln!(out, "<h1>{TITLE}</h1>");
    let _ = writeln!(out, "<h2>{}</h2>", escape_html(&project.name));
    if !project.description.trim().is_empty() {
        let _ = writeln!(out, "<p>{}</p>", escape_html(project.description.trim()));
    }
    let _ = writeln!(out, "<p>{}</p>", generated_line(at));
    let _ = writeln!(out, "<p>{}</p>", count_line(project));
    out.push_str("</section>\n");

    let total = project.shots.len();
    for (i, shot) in project.shots.iter().enumerate() {
        let fields = ShotFields::resolve(shot, project);
        let _ = writeln!(out, "<section class=\"shot\">");
        let _ = writeln!(out, "<h2>{}</h2>", escape_html(&shot_header(shot)));
        if let Some(src) = image_link(shot, base_dir) {
            let _ = writeln!(
                out,
                "<img class=\"frame\" src=\"{}\" alt=\"shot {}\">",
                escape_html(&src),
                shot.shot_number
            );
        }
        out.push_str("<table>\n");
        for (label, value) in fields.rows() {
            let (class, body) = if label == LABEL_DIALOGUE && is_dialogue(value) {
                ("dialogue", escape_html(value).replace('\n', "<br/>"))
            } else {
                ("value", escape_html(value))
            };
            let _ = writeln!(
                out,
                "<tr><td class=\"label\">{label}:</td><td class=\"{class}\">{body}</td></tr>"
            );
        }
        out.push_str("</table>\n</section>\n");
        if page_break_after(i, total) {
            out.push_str("<div class=\"page-break\"></div>\n");
        }
    }

    out.push_str("</body>\n</html>\n");
    out
}

// ---------------------------------------------------------------------------
// Markdown
// ---------------------------------------------------------------------------

fn render_markdown(project: &Project, base_dir: &Path, at: Timestamp) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {TITLE}\n");
    let _ = writeln!(out, "## {}\n", project.name);
    if !project.description.trim().is_empty() {
        let _ = writeln!(out, "{}\n", project.description.trim());
    }
    let _ = writeln!(out, "{}\n", generated_line(at));
    let _ = writeln!(out, "{}\n", count_line(project));
    out.push_str("---\n\n");

    let total = project.shots.len();
    for (i, shot) in project.shots.iter().enumerate() {
        let fields = ShotFields::resolve(shot, project);
        let _ = writeln!(out, "### {}\n", shot_header(shot));
        if let Some(src) = image_link(shot, base_dir) {
            let _ = writeln!(out, "![shot {}]({src})\n", shot.shot_number);
        }
        out.push_str("| 字段 | 内容 |\n| --- | --- |\n");
        for (label, value) in fields.rows() {
            let cell = value.replace('|', "\\|").replace('\n', "<br/>");
            let _ = writeln!(out, "| {label} | {cell} |");
        }
        out.push('\n');
        if page_break_after(i, total) {
            out.push_str("---\n\n");
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Page break after every third shot, never after the last.
pub(crate) fn page_break_after(index: usize, total: usize) -> bool {
    index + 1 < total && (index + 1) % SHOTS_PER_PAGE == 0
}

pub(crate) fn shot_header(shot: &Shot) -> String {
    let title = shot.description.lines().next().unwrap_or_default().trim();
    if title.is_empty() {
        format!("=== 分镜 {} ===", shot.shot_number)
    } else {
        format!("=== 分镜 {} === {title}", shot.shot_number)
    }
}

pub(crate) fn generated_line(at: Timestamp) -> String {
    format!("生成日期: {}", at.format("%Y-%m-%d %H:%M"))
}

pub(crate) fn count_line(project: &Project) -> String {
    format!("共 {} 个分镜", project.shots.len())
}

pub(crate) fn is_dialogue(value: &str) -> bool {
    let v = value.trim();
    !v.is_empty() && v != NO_DIALOGUE
}

/// Link to a shot's image as seen from the exports directory.
fn image_link(shot: &Shot, base_dir: &Path) -> Option<String> {
    if !shot.image_exists() {
        return None;
    }
    let path = shot.output_image.as_deref()?;
    let link = match path.strip_prefix(base_dir) {
        Ok(rel) => format!("../{}", rel.to_string_lossy().replace('\\', "/")),
        Err(_) => path.to_string_lossy().into_owned(),
    };
    Some(link)
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::project::Character;

    fn project_with_shots(n: usize) -> Project {
        let mut project = Project::new("雨夜来信");
        project.description = "一封迟到十年的信".into();
        let id = project.add_entity(Character::new("林夏")).unwrap().id;
        for i in 0..n {
            project
                .add_shot(Shot {
                    description: format!("镜头描述 {i}"),
                    character_ids: vec![id],
                    dialogue: if i == 0 { "林夏：你来了\n老周：嗯".into() } else { String::new() },
                    ..Shot::default()
                })
                .unwrap();
        }
        project
    }

    fn at() -> Timestamp {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn page_breaks_every_third_shot_but_not_after_last() {
        assert!(!page_break_after(0, 6));
        assert!(page_break_after(2, 6));
        assert!(!page_break_after(5, 6));
        assert!(!page_break_after(2, 3));
    }

    #[test]
    fn html_has_title_page_and_field_rows() {
        let html = render(&project_with_shots(7), ExportFormat::Html, Path::new("/data"), at()).unwrap();
        assert!(html.contains("<h1>分镜脚本</h1>"));
        assert!(html.contains("共 7 个分镜"));
        assert!(html.contains("生成日期: 2025-06-01 09:30"));
        assert_eq!(html.matches("<div class=\"page-break\">").count(), 2);
        assert_eq!(html.matches("<td class=\"label\">").count(), 7 * 11);
        assert!(html.contains("=== 分镜 1 === 镜头描述 0"));
        assert!(html.contains("<td class=\"dialogue\">林夏：你来了<br/>老周：嗯</td>"));
    }

    #[test]
    fn markdown_separates_pages() {
        let md = render(&project_with_shots(4), ExportFormat::Markdown, Path::new("/data"), at()).unwrap();
        assert!(md.starts_with("# 分镜脚本"));
        // title page separator plus one after shot 3
        assert_eq!(md.matches("---\n").count(), 2);
        assert!(md.contains("| 主体 | 林夏 |"));
    }

    #[test]
    fn json_round_trips_the_project() {
        let project = project_with_shots(2);
        let json = render(&project, ExportFormat::Json, Path::new("/data"), at()).unwrap();
        let back: Project = serde_json::from_str(&json).unwrap();
        assert_eq!(back, project);
    }

    #[test]
    fn html_escapes_user_text() {
        let mut project = project_with_shots(1);
        project.name = "<script>".into();
        let html = render(&project, ExportFormat::Html, Path::new("/data"), at()).unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn write_export_uses_sanitized_name() {
        let dir = tempfile::tempdir().unwrap();
        let exports = dir.path().join("exports");
        let path = write_export(
            &project_with_shots(1),
            ExportFormat::Markdown,
            dir.path(),
            &exports,
            None,
            at(),
        )
        .unwrap();
        assert_eq!(path, exports.join("雨夜来信_20250601_093000.md"));
        assert!(path.is_file());
    }

    #[test]
    fn format_accepts_md_alias() {
        let f: ExportFormat = serde_json::from_str("\"md\"").unwrap();
        assert_eq!(f, ExportFormat::Markdown);
        assert_eq!(ExportFormat::content_type_for("a.html"), "text/html; charset=utf-8");
        assert_eq!(ExportFormat::content_type_for("a.pdf"), "application/pdf");
    }

    #[test]
    fn pdf_is_not_a_text_format() {
        let result = render(&project_with_shots(1), ExportFormat::Pdf, Path::new("/data"), at());
        assert!(matches!(result, Err(CoreError::Unsupported(_))));
    }
}
