//! A4 PDF rendering of a storyboard.
//!
//! Layout is computed first as plain positioned text runs, then drawn with
//! `printpdf` using an embedded CJK TrueType font. Pagination matches the
//! HTML export: a title page, then three shots per page. A shot that does
//! not fit the remaining space continues on a fresh page.

use std::path::{Path, PathBuf};

use printpdf::{Mm, PdfDocument};

use crate::error::CoreError;
use crate::export::{
    count_line, generated_line, is_dialogue, page_break_after, shot_header, NO_DIALOGUE, TITLE,
};
use crate::project::Project;
use crate::shot_prompt::{ShotFields, LABEL_DIALOGUE};
use crate::types::Timestamp;

pub const PAGE_WIDTH_MM: f32 = 210.0;
pub const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 20.0;

const TITLE_PT: f32 = 24.0;
const SUBTITLE_PT: f32 = 14.0;
const HEADER_PT: f32 = 12.0;
const BODY_PT: f32 = 10.0;

const LINE_MM: f32 = 5.5;
const HEADER_LINE_MM: f32 = 8.0;
const SHOT_GAP_MM: f32 = 6.0;

const LABEL_X_MM: f32 = MARGIN_MM;
const VALUE_X_MM: f32 = 52.0;

/// Half-width columns available in the value column at body size.
const VALUE_COLUMNS: usize = 76;
/// Half-width columns across the full text width at body size.
const FULL_COLUMNS: usize = 96;

/// Fonts tried, in order, when no font is configured or it is missing.
pub const SYSTEM_CJK_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/droid/DroidSansFallbackFull.ttf",
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/google-noto-cjk/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/truetype/wqy/wqy-microhei.ttc",
    "/usr/share/fonts/wenquanyi/wqy-microhei/wqy-microhei.ttc",
    "/System/Library/Fonts/PingFang.ttc",
    "/System/Library/Fonts/STHeiti Light.ttc",
    "C:/Windows/Fonts/msyh.ttc",
    "C:/Windows/Fonts/simhei.ttf",
    "C:/Windows/Fonts/simsun.ttc",
];

/// One line of text at an absolute position, y measured from the bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub size: f32,
    pub x_mm: f32,
    pub y_mm: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    pub runs: Vec<TextRun>,
}

/// The configured font if it exists, else the first candidate on disk.
pub fn find_font(configured: Option<&Path>, candidates: &[&str]) -> Option<PathBuf> {
    if let Some(path) = configured.filter(|p| p.is_file()) {
        return Some(path.to_path_buf());
    }
    candidates
        .iter()
        .map(|p| PathBuf::from(*p))
        .find(|p| p.is_file())
}

/// Render `project` to PDF bytes. Fails with [`CoreError::Unsupported`]
/// when no usable CJK font can be found.
pub fn render_pdf(
    project: &Project,
    configured_font: Option<&Path>,
    at: Timestamp,
) -> Result<Vec<u8>, CoreError> {
    let font_path = find_font(configured_font, SYSTEM_CJK_FONTS).ok_or_else(|| {
        CoreError::Unsupported(
            "PDF export needs a CJK TrueType font; set PDF_FONT_PATH".to_string(),
        )
    })?;
    let font_bytes = std::fs::read(&font_path)
        .map_err(|e| CoreError::Internal(format!("read {}: {e}", font_path.display())))?;

    let pages = layout(project, at);
    let title = format!("{} - {TITLE}", project.name);
    let (doc, first_page, first_layer) =
        PdfDocument::new(title, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Page 1");
    let font = doc.add_external_font(font_bytes.as_slice()).map_err(|e| {
        CoreError::Unsupported(format!("font {} is not usable: {e}", font_path.display()))
    })?;

    for (i, page) in pages.iter().enumerate() {
        let layer = if i == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (page_index, layer_index) = doc.add_page(
                Mm(PAGE_WIDTH_MM),
                Mm(PAGE_HEIGHT_MM),
                format!("Page {}", i + 1),
            );
            doc.get_page(page_index).get_layer(layer_index)
        };
        for run in &page.runs {
            layer.use_text(run.text.clone(), run.size, Mm(run.x_mm), Mm(run.y_mm), &font);
        }
    }

    tracing::debug!(project_id = %project.id, pages = pages.len(), font = %font_path.display(), "Rendered PDF");
    doc.save_to_bytes()
        .map_err(|e| CoreError::Internal(format!("write pdf: {e}")))
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

struct Cursor {
    pages: Vec<PageLayout>,
    y: f32,
}

impl Cursor {
    fn new() -> Self {
        Self {
            pages: vec![PageLayout::default()],
            y: PAGE_HEIGHT_MM - MARGIN_MM,
        }
    }

    fn new_page(&mut self) {
        self.pages.push(PageLayout::default());
        self.y = PAGE_HEIGHT_MM - MARGIN_MM;
    }

    fn remaining(&self) -> f32 {
        self.y - MARGIN_MM
    }

    fn push(&mut self, text: impl Into<String>, size: f32, x_mm: f32, advance: f32) {
        if self.remaining() < advance {
            self.new_page();
        }
        if let Some(page) = self.pages.last_mut() {
            page.runs.push(TextRun {
                text: text.into(),
                size,
                x_mm,
                y_mm: self.y,
            });
        }
        self.y -= advance;
    }
}

/// Lay out the title page and every shot.
pub fn layout(project: &Project, at: Timestamp) -> Vec<PageLayout> {
    let mut cursor = Cursor::new();

    cursor.y = PAGE_HEIGHT_MM - 70.0;
    cursor.push(TITLE, TITLE_PT, MARGIN_MM, 16.0);
    cursor.push(project.name.clone(), SUBTITLE_PT, MARGIN_MM, 12.0);
    for line in wrap(project.description.trim(), FULL_COLUMNS) {
        if !line.is_empty() {
            cursor.push(line, BODY_PT, MARGIN_MM, LINE_MM);
        }
    }
    cursor.push(generated_line(at), BODY_PT, MARGIN_MM, LINE_MM);
    cursor.push(count_line(project), BODY_PT, MARGIN_MM, LINE_MM);

    if project.shots.is_empty() {
        return cursor.pages;
    }
    cursor.new_page();

    let total = project.shots.len();
    for (i, shot) in project.shots.iter().enumerate() {
        let fields = ShotFields::resolve(shot, project);
        let rows: Vec<(&str, Vec<String>)> = fields
            .rows()
            .into_iter()
            .map(|(label, value)| {
                let value = if label == LABEL_DIALOGUE && !is_dialogue(value) {
                    NO_DIALOGUE
                } else {
                    value
                };
                (label, wrap(value, VALUE_COLUMNS))
            })
            .collect();
        let image = shot
            .output_image
            .as_deref()
            .filter(|_| shot.image_exists())
            .and_then(|p| p.file_name())
            .map(|n| format!("画面: {}", n.to_string_lossy()));

        let line_count: usize = rows.iter().map(|(_, lines)| lines.len()).sum::<usize>()
            + usize::from(image.is_some());
        let height = HEADER_LINE_MM + line_count as f32 * LINE_MM;
        if cursor.remaining() < height && cursor.pages.last().is_some_and(|p| !p.runs.is_empty()) {
            cursor.new_page();
        }

        cursor.push(shot_header(shot), HEADER_PT, LABEL_X_MM, HEADER_LINE_MM);
        if let Some(image) = image {
            cursor.push(image, BODY_PT, LABEL_X_MM, LINE_MM);
        }
        for (label, lines) in rows {
            for (n, line) in lines.into_iter().enumerate() {
                if n == 0 {
                    if cursor.remaining() < LINE_MM {
                        cursor.new_page();
                    }
                    cursor.push(format!("{label}:"), BODY_PT, LABEL_X_MM, 0.0);
                }
                cursor.push(line, BODY_PT, VALUE_X_MM, LINE_MM);
            }
        }
        cursor.y -= SHOT_GAP_MM;

        if page_break_after(i, total) {
            cursor.new_page();
        }
    }
    cursor.pages
}

/// Display width in half-width columns.
fn char_columns(c: char) -> usize {
    if c.is_ascii() {
        1
    } else {
        2
    }
}

/// Break `text` into lines of at most `columns` half-width columns,
/// honouring embedded newlines. Always yields at least one line.
pub fn wrap(text: &str, columns: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for raw in text.lines() {
        let mut line = String::new();
        let mut width = 0;
        for c in raw.chars() {
            let w = char_columns(c);
            if width + w > columns && !line.is_empty() {
                lines.push(std::mem::take(&mut line));
                width = 0;
            }
            line.push(c);
            width += w;
        }
        lines.push(line);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::project::Shot;

    fn at() -> Timestamp {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap()
    }

    fn project_with_shots(n: usize) -> Project {
        let mut project = Project::new("雨夜来信");
        project.description = "一封迟到十年的信".into();
        for i in 0..n {
            project
                .add_shot(Shot {
                    description: format!("镜头描述 {i}"),
                    ..Shot::default()
                })
                .unwrap();
        }
        project
    }

    fn page_text(page: &PageLayout) -> String {
        page.runs.iter().map(|r| r.text.as_str()).collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn wrap_counts_cjk_as_double_width() {
        assert_eq!(wrap("abcdef", 4), vec!["abcd", "ef"]);
        assert_eq!(wrap("分镜脚本", 4), vec!["分镜", "脚本"]);
        assert_eq!(wrap("a\nb", 10), vec!["a", "b"]);
        assert_eq!(wrap("", 10), vec![""]);
    }

    #[test]
    fn title_page_then_three_shots_per_page() {
        let pages = layout(&project_with_shots(7), at());

        assert_eq!(pages.len(), 4);
        let title = page_text(&pages[0]);
        assert!(title.contains(TITLE));
        assert!(title.contains("共 7 个分镜"));
        assert!(title.contains("生成日期: 2025-06-01 09:30"));

        let headers: Vec<usize> = pages[1..]
            .iter()
            .map(|p| p.runs.iter().filter(|r| r.text.starts_with("=== 分镜")).count())
            .collect();
        assert_eq!(headers, vec![3, 3, 1]);
        assert!(page_text(&pages[1]).contains("=== 分镜 1 === 镜头描述 0"));
    }

    #[test]
    fn every_run_stays_inside_the_margins() {
        let mut project = project_with_shots(3);
        project.shots[1].dialogue = "很长的台词".repeat(200);
        let pages = layout(&project, at());

        assert!(pages.len() > 2);
        for run in pages.iter().flat_map(|p| &p.runs) {
            assert!(run.y_mm >= MARGIN_MM - 0.01, "{run:?}");
            assert!(run.y_mm <= PAGE_HEIGHT_MM - MARGIN_MM + 0.01, "{run:?}");
        }
    }

    #[test]
    fn empty_dialogue_renders_placeholder() {
        let pages = layout(&project_with_shots(1), at());
        let runs = &pages[1].runs;
        let label = runs.iter().position(|r| r.text == format!("{LABEL_DIALOGUE}:")).unwrap();
        assert_eq!(runs[label + 1].text, NO_DIALOGUE);
    }

    #[test]
    fn configured_font_wins_and_missing_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let font = dir.path().join("cjk.ttf");
        std::fs::write(&font, b"font").unwrap();
        let fallback = font.to_str().unwrap();

        assert_eq!(find_font(Some(font.as_path()), &[]), Some(font.clone()));
        assert_eq!(find_font(Some(Path::new("/missing.ttf")), &[fallback]), Some(font.clone()));
        assert_eq!(find_font(Some(Path::new("/missing.ttf")), &["/also/missing.ttf"]), None);
    }

    #[test]
    fn renders_with_a_system_font_when_available() {
        let Some(font) = find_font(None, SYSTEM_CJK_FONTS) else {
            return;
        };
        let bytes = render_pdf(&project_with_shots(4), Some(font.as_path()), at()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
