//! Reconcile generated files on disk with shot records.
//!
//! Files in a project's output directory are ordered by modification time
//! and grouped into batches: a new batch starts whenever the gap to the
//! previous file exceeds the threshold. Linking is positional and strict:
//! with N shots needing an image, the N most recent unclaimed files (or the
//! N most recent inside a chosen batch) are assigned to those shots in
//! ascending time order. Too few files means nothing is assigned. Shots
//! whose image still exists, and the files they point at, are never
//! touched.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::CoreError;
use crate::project::Project;
use crate::types::{EntityId, Timestamp};

// ── Constants ────────────────────────────────────────────────────────

/// Image extensions considered generation outputs.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Video extensions checked for a same-stem companion of each image.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm"];

/// Default gap that separates two batches.
pub const DEFAULT_BATCH_THRESHOLD: Duration = Duration::from_secs(300);

// ── Types ────────────────────────────────────────────────────────────

/// An image file found in the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputFile {
    pub path: PathBuf,
    pub modified: Timestamp,
}

/// Serializable description of one batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchInfo {
    pub index: usize,
    pub file_count: usize,
    pub started_at: Timestamp,
    pub ended_at: Timestamp,
    pub files: Vec<PathBuf>,
}

/// One planned shot ← file association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkAssignment {
    pub shot_id: EntityId,
    pub image: PathBuf,
    pub video: Option<PathBuf>,
}

/// Fewer files than shots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountMismatch {
    pub files: usize,
    pub shots: usize,
}

/// Result of a link attempt, reported to the user as-is.
#[derive(Debug, Clone, Serialize)]
pub struct LinkReport {
    pub linked: usize,
    pub videos_linked: usize,
    pub message: String,
}

// ── Scanning ─────────────────────────────────────────────────────────

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

/// List image files directly under `dir`, oldest first. A missing
/// directory yields an empty list.
pub fn scan_images(dir: &Path) -> std::io::Result<Vec<OutputFile>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() || !has_extension(&path, IMAGE_EXTENSIONS) {
            continue;
        }
        let modified: DateTime<Utc> = entry.metadata()?.modified()?.into();
        files.push(OutputFile { path, modified });
    }
    files.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
    Ok(files)
}

/// Same-stem video next to `image`, if one exists on disk.
pub fn companion_video(image: &Path) -> Option<PathBuf> {
    VIDEO_EXTENSIONS
        .iter()
        .map(|ext| image.with_extension(ext))
        .find(|candidate| candidate.is_file())
}

// ── Batching ─────────────────────────────────────────────────────────

/// Iterator over consecutive batches of a time-sorted file slice.
///
/// Holds no state beyond a cursor; call [`batches`] again to restart.
#[derive(Debug, Clone)]
pub struct Batches<'a> {
    files: &'a [OutputFile],
    threshold: chrono::Duration,
    pos: usize,
}

/// Group time-sorted `files` into batches separated by gaps > `threshold`.
pub fn batches(files: &[OutputFile], threshold: Duration) -> Batches<'_> {
    Batches {
        files,
        threshold: chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::MAX),
        pos: 0,
    }
}

impl<'a> Iterator for Batches<'a> {
    type Item = &'a [OutputFile];

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.pos;
        if start >= self.files.len() {
            return None;
        }
        let mut end = start + 1;
        while end < self.files.len()
            && self.files[end].modified - self.files[end - 1].modified <= self.threshold
        {
            end += 1;
        }
        self.pos = end;
        Some(&self.files[start..end])
    }
}

/// Describe every batch for display.
pub fn describe_batches(files: &[OutputFile], threshold: Duration) -> Vec<BatchInfo> {
    batches(files, threshold)
        .enumerate()
        .map(|(index, batch)| BatchInfo {
            index,
            file_count: batch.len(),
            started_at: batch[0].modified,
            ended_at: batch[batch.len() - 1].modified,
            files: batch.iter().map(|f| f.path.clone()).collect(),
        })
        .collect()
}

// ── Linking ──────────────────────────────────────────────────────────

/// Assign the most recent `shot_ids.len()` files positionally.
///
/// Empty input on either side plans nothing. Fewer files than shots is a
/// [`CountMismatch`].
pub fn plan_links(
    files: &[OutputFile],
    shot_ids: &[EntityId],
) -> Result<Vec<LinkAssignment>, CountMismatch> {
    if files.is_empty() || shot_ids.is_empty() {
        return Ok(Vec::new());
    }
    if files.len() < shot_ids.len() {
        return Err(CountMismatch {
            files: files.len(),
            shots: shot_ids.len(),
        });
    }
    let recent = &files[files.len() - shot_ids.len()..];
    Ok(shot_ids
        .iter()
        .zip(recent)
        .map(|(shot_id, file)| LinkAssignment {
            shot_id: *shot_id,
            image: file.path.clone(),
            video: companion_video(&file.path),
        })
        .collect())
}

/// Write planned assignments into the project. Returns (images, videos).
pub fn apply_links(project: &mut Project, assignments: &[LinkAssignment]) -> (usize, usize) {
    let mut images = 0;
    let mut videos = 0;
    for assignment in assignments {
        if let Some(shot) = project.shot_mut(assignment.shot_id) {
            shot.output_image = Some(assignment.image.clone());
            images += 1;
            if let Some(video) = &assignment.video {
                shot.output_video = Some(video.clone());
                videos += 1;
            }
        }
    }
    (images, videos)
}

/// Scan `dir` and link its files to the shots of `project` that have no
/// image on disk.
///
/// With `batch_index`, only files inside that batch are eligible. Files
/// already referenced by a shot with a resolving image are skipped.
pub fn link_project(
    project: &mut Project,
    dir: &Path,
    batch_index: Option<usize>,
    threshold: Duration,
) -> Result<LinkReport, CoreError> {
    let all = scan_images(dir)
        .map_err(|e| CoreError::Internal(format!("scan {}: {e}", dir.display())))?;

    let files: &[OutputFile] = match batch_index {
        Some(i) => batches(&all, threshold)
            .nth(i)
            .ok_or_else(|| CoreError::not_found("Batch", i))?,
        None => &all,
    };

    let shot_ids: Vec<EntityId> = project
        .shots
        .iter()
        .filter(|s| !s.image_exists())
        .map(|s| s.id)
        .collect();
    if shot_ids.is_empty() {
        return Ok(LinkReport {
            linked: 0,
            videos_linked: 0,
            message: "Every shot already has an image".to_string(),
        });
    }

    let claimed: Vec<&Path> = project
        .shots
        .iter()
        .filter(|s| s.image_exists())
        .filter_map(|s| s.output_image.as_deref())
        .collect();
    let unclaimed: Vec<OutputFile> = files
        .iter()
        .filter(|f| !claimed.iter().any(|c| same_file(c, &f.path)))
        .cloned()
        .collect();
    if unclaimed.is_empty() {
        return Ok(LinkReport {
            linked: 0,
            videos_linked: 0,
            message: "No image files found".to_string(),
        });
    }

    match plan_links(&unclaimed, &shot_ids) {
        Ok(assignments) => {
            let (linked, videos_linked) = apply_links(project, &assignments);
            tracing::info!(
                project_id = %project.id,
                linked,
                videos_linked,
                "Linked output files to shots"
            );
            Ok(LinkReport {
                linked,
                videos_linked,
                message: format!("Linked {linked} shots ({videos_linked} videos)"),
            })
        }
        Err(CountMismatch { files, shots }) => Ok(LinkReport {
            linked: 0,
            videos_linked: 0,
            message: format!("Found {files} image files for {shots} shots; nothing linked"),
        }),
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Run [`link_project`] once if any shot image no longer resolves.
pub fn relink_if_dangling(
    project: &mut Project,
    dir: &Path,
    threshold: Duration,
) -> Result<Option<LinkReport>, CoreError> {
    if !project.has_dangling_images() {
        return Ok(None);
    }
    link_project(project, dir, None, threshold).map(Some)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::time::SystemTime;

    use assert_matches::assert_matches;
    use chrono::TimeZone;

    use super::*;
    use crate::project::Shot;
    use crate::types::new_id;

    fn file_at(name: &str, secs: i64) -> OutputFile {
        OutputFile {
            path: PathBuf::from(name),
            modified: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    fn write_at(dir: &Path, name: &str, secs: u64) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs))
            .unwrap();
        path
    }

    fn project_with_shots(n: usize) -> Project {
        let mut project = Project::new("Demo");
        for _ in 0..n {
            project.add_shot(Shot::default()).unwrap();
        }
        project
    }

    // -- batches --

    #[test]
    fn gap_above_threshold_starts_new_batch() {
        let files: Vec<_> = [0, 10, 20, 400, 410]
            .iter()
            .enumerate()
            .map(|(i, s)| file_at(&format!("{i}.png"), *s))
            .collect();
        let groups: Vec<usize> = batches(&files, DEFAULT_BATCH_THRESHOLD)
            .map(<[OutputFile]>::len)
            .collect();
        assert_eq!(groups, vec![3, 2]);
    }

    #[test]
    fn gap_equal_to_threshold_stays_in_batch() {
        let files = vec![file_at("a.png", 0), file_at("b.png", 300)];
        assert_eq!(batches(&files, DEFAULT_BATCH_THRESHOLD).count(), 1);
    }

    #[test]
    fn batches_restart_from_scratch() {
        let files = vec![file_at("a.png", 0), file_at("b.png", 1000)];
        assert_eq!(batches(&files, DEFAULT_BATCH_THRESHOLD).count(), 2);
        assert_eq!(batches(&files, DEFAULT_BATCH_THRESHOLD).count(), 2);
        assert_eq!(batches(&[], DEFAULT_BATCH_THRESHOLD).count(), 0);
    }

    // -- plan_links --

    #[test]
    fn takes_most_recent_files_in_order() {
        let files = vec![
            file_at("old.png", 0),
            file_at("a.png", 10),
            file_at("b.png", 20),
        ];
        let shots = vec![new_id(), new_id()];
        let plan = plan_links(&files, &shots).unwrap();
        assert_eq!(plan[0].image, PathBuf::from("a.png"));
        assert_eq!(plan[1].image, PathBuf::from("b.png"));
        assert_eq!(plan[1].shot_id, shots[1]);
    }

    #[test]
    fn too_few_files_is_mismatch() {
        let files = vec![file_at("a.png", 0)];
        assert_matches!(
            plan_links(&files, &[new_id(), new_id()]),
            Err(CountMismatch { files: 1, shots: 2 })
        );
    }

    // -- link_project --

    #[test]
    fn links_three_files_to_three_shots() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_at(dir.path(), "shot_a.png", 30);
        let b = write_at(dir.path(), "shot_b.png", 10);
        let c = write_at(dir.path(), "shot_c.png", 20);
        let mut project = project_with_shots(3);

        let report = link_project(&mut project, dir.path(), None, DEFAULT_BATCH_THRESHOLD).unwrap();

        assert_eq!(report.linked, 3);
        assert_eq!(project.shots[0].output_image.as_deref(), Some(b.as_path()));
        assert_eq!(project.shots[1].output_image.as_deref(), Some(c.as_path()));
        assert_eq!(project.shots[2].output_image.as_deref(), Some(a.as_path()));
    }

    #[test]
    fn two_files_for_three_shots_links_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_at(dir.path(), "1.png", 0);
        write_at(dir.path(), "2.png", 5);
        let mut project = project_with_shots(3);

        let report = link_project(&mut project, dir.path(), None, DEFAULT_BATCH_THRESHOLD).unwrap();

        assert_eq!(report.linked, 0);
        assert!(report.message.contains("2 image files for 3 shots"));
        assert!(project.shots.iter().all(|s| s.output_image.is_none()));
    }

    #[test]
    fn empty_directory_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = project_with_shots(2);
        let report = link_project(&mut project, dir.path(), None, DEFAULT_BATCH_THRESHOLD).unwrap();
        assert_eq!(report.linked, 0);
    }

    #[test]
    fn companion_video_is_linked() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_at(dir.path(), "shot_001.png", 0);
        File::create(dir.path().join("shot_001.mp4")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let mut project = project_with_shots(1);

        let report = link_project(&mut project, dir.path(), None, DEFAULT_BATCH_THRESHOLD).unwrap();

        assert_eq!(report.videos_linked, 1);
        assert_eq!(project.shots[0].output_image, Some(image));
        assert_eq!(
            project.shots[0].output_video,
            Some(dir.path().join("shot_001.mp4"))
        );
    }

    #[test]
    fn chosen_batch_constrains_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_at(dir.path(), "first.png", 0);
        write_at(dir.path(), "second.png", 1000);
        let mut project = project_with_shots(1);

        link_project(&mut project, dir.path(), Some(0), DEFAULT_BATCH_THRESHOLD).unwrap();
        assert_eq!(project.shots[0].output_image, Some(first));

        assert_matches!(
            link_project(&mut project, dir.path(), Some(5), DEFAULT_BATCH_THRESHOLD),
            Err(CoreError::NotFound { entity: "Batch", .. })
        );
    }

    #[test]
    fn shots_with_existing_images_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_at(dir.path(), "shot_001_good.png", 0);
        write_at(dir.path(), "unrelated_a.png", 100);
        let b = write_at(dir.path(), "unrelated_b.png", 200);
        let mut project = project_with_shots(2);
        project.shots[0].output_image = Some(good.clone());
        project.shots[1].output_image = Some(dir.path().join("gone.png"));

        let report = relink_if_dangling(&mut project, dir.path(), DEFAULT_BATCH_THRESHOLD)
            .unwrap()
            .unwrap();

        assert_eq!(report.linked, 1);
        assert_eq!(project.shots[0].output_image, Some(good));
        assert_eq!(project.shots[1].output_image, Some(b));
    }

    #[test]
    fn claimed_files_are_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let newest = write_at(dir.path(), "shot_001.png", 500);
        let mut project = project_with_shots(2);
        project.shots[0].output_image = Some(newest.clone());

        let report = link_project(&mut project, dir.path(), None, DEFAULT_BATCH_THRESHOLD).unwrap();

        assert_eq!(report.linked, 0);
        assert_eq!(project.shots[0].output_image, Some(newest));
        assert!(project.shots[1].output_image.is_none());
    }

    #[test]
    fn complete_project_links_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let only = write_at(dir.path(), "a.png", 0);
        write_at(dir.path(), "b.png", 10);
        let mut project = project_with_shots(1);
        project.shots[0].output_image = Some(only.clone());

        let report = link_project(&mut project, dir.path(), None, DEFAULT_BATCH_THRESHOLD).unwrap();

        assert_eq!(report.linked, 0);
        assert_eq!(project.shots[0].output_image, Some(only));
    }

    #[test]
    fn relink_only_runs_with_dangling_images() {
        let dir = tempfile::tempdir().unwrap();
        let fresh = write_at(dir.path(), "fresh.png", 0);
        let mut project = project_with_shots(1);
        assert!(relink_if_dangling(&mut project, dir.path(), DEFAULT_BATCH_THRESHOLD)
            .unwrap()
            .is_none());

        project.shots[0].output_image = Some(dir.path().join("gone.png"));
        let report = relink_if_dangling(&mut project, dir.path(), DEFAULT_BATCH_THRESHOLD)
            .unwrap()
            .unwrap();
        assert_eq!(report.linked, 1);
        assert_eq!(project.shots[0].output_image, Some(fresh));
    }
}
