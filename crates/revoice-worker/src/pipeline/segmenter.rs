//! Transcript Segmenter.
//!
//! Partitions the source timeline into alternating gap and voice
//! segments, cuts the source once at every boundary, renames the pieces
//! to their ordinal names and backfills gaps with silent audio.
//!
//! # Strategy
//!
//! A single segmenting pass over the source produces contiguous pieces
//! (`segment_000.mp4`, `segment_001.mp4`, ...) with no drift between
//! neighbours. The number of pieces must match the plan exactly; a
//! mismatch means the boundary list is wrong and the job fails.
//!
//! Boundaries are handed to the cutter in milliseconds, so transcript
//! timestamps are aligned to that grid first with [`align_intervals`].

use std::path::Path;
use std::sync::Arc;

use revoice_media::{piece_path, replace_file, MediaToolkit, PIECE_PREFIX};
use revoice_models::{SegmentKind, TranscriptInterval, VideoSegment};
use tracing::{debug, info};

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::workdir::JobWorkspace;

const MILLIS_PER_SEC: f64 = 1000.0;

/// Finest boundary step handed to the cutter.
pub const BOUNDARY_RESOLUTION_SECS: f64 = 1.0 / MILLIS_PER_SEC;

fn to_millis(secs: f64) -> u64 {
    (secs.max(0.0) * MILLIS_PER_SEC).round() as u64
}

fn from_millis(millis: u64) -> f64 {
    millis as f64 / MILLIS_PER_SEC
}

/// True when `later` lands on a later millisecond than `earlier`.
fn is_after(earlier: f64, later: f64) -> bool {
    later - earlier >= BOUNDARY_RESOLUTION_SECS / 2.0
}

/// A segment boundary before any file exists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedSegment {
    pub kind: SegmentKind,
    pub start: f64,
    pub end: f64,
}

/// Output of [`Segmenter::segment`].
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Every segment in timeline order
    pub all: Vec<VideoSegment>,
    /// Voice segments only, carrying their index into `all`
    pub voice: Vec<VideoSegment>,
}

/// Snap ordered intervals to the millisecond grid.
///
/// Starts and ends are rounded, a start that lands before the previous
/// end is moved up to it, and ends are capped at `duration`. Intervals
/// that collapse to nothing are dropped.
pub fn align_intervals(intervals: &[TranscriptInterval], duration: f64) -> Vec<TranscriptInterval> {
    let limit = to_millis(duration);
    let mut aligned = Vec::with_capacity(intervals.len());
    let mut last_end = 0;

    for interval in intervals {
        let start = to_millis(interval.start).max(last_end);
        let end = to_millis(interval.end).min(limit);
        if end <= start {
            continue;
        }
        aligned.push(TranscriptInterval::new(
            from_millis(start),
            from_millis(end),
            interval.text.clone(),
        ));
        last_end = end;
    }

    aligned
}

/// Compute the ordered gap/voice partition of `[0, duration)`.
///
/// Intervals must already be ordered, non-overlapping and inside the
/// duration. A gap shorter than [`BOUNDARY_RESOLUTION_SECS`] is folded
/// into the segment after it, or into the last segment at the end.
pub fn plan_segments(intervals: &[TranscriptInterval], duration: f64) -> Vec<PlannedSegment> {
    let mut plan = Vec::with_capacity(intervals.len() * 2 + 1);
    let mut last_end = 0.0_f64;

    for interval in intervals {
        let start = if is_after(last_end, interval.start) {
            plan.push(PlannedSegment {
                kind: SegmentKind::Gap,
                start: last_end,
                end: interval.start,
            });
            interval.start
        } else {
            last_end
        };
        plan.push(PlannedSegment {
            kind: SegmentKind::Voice,
            start,
            end: interval.end,
        });
        last_end = interval.end;
    }

    if is_after(last_end, duration) {
        plan.push(PlannedSegment {
            kind: SegmentKind::Gap,
            start: last_end,
            end: duration,
        });
    } else if let Some(last) = plan.last_mut() {
        last.end = duration;
    }

    plan
}

/// Interior boundaries: the end of every segment except the last.
pub fn split_points(plan: &[PlannedSegment]) -> Vec<f64> {
    match plan.split_last() {
        Some((_, init)) => init.iter().map(|s| s.end).collect(),
        None => Vec::new(),
    }
}

fn segment_file_name(kind: SegmentKind, index: usize) -> String {
    format!("{}_{}.mp4", kind, index)
}

pub struct Segmenter {
    media: Arc<dyn MediaToolkit>,
}

impl Segmenter {
    pub fn new(media: Arc<dyn MediaToolkit>) -> Self {
        Self { media }
    }

    /// Cut `video` into gap and voice segment files inside the workspace.
    pub async fn segment(
        &self,
        video: &Path,
        intervals: &[TranscriptInterval],
        duration: f64,
        workspace: &JobWorkspace,
    ) -> WorkerResult<Segmentation> {
        let plan = plan_segments(intervals, duration);
        if plan.is_empty() {
            return Err(WorkerError::invalid_input(format!(
                "nothing to segment for duration {:.3}s",
                duration
            )));
        }

        let splits = split_points(&plan);
        let mut bounds = Vec::with_capacity(splits.len() + 2);
        bounds.push(0.0);
        bounds.extend_from_slice(&splits);
        bounds.push(duration);
        if let Some(pair) = bounds.windows(2).find(|w| !is_after(w[0], w[1])) {
            return Err(WorkerError::invalid_input(format!(
                "segment boundaries {:.4}s and {:.4}s fall on the same millisecond",
                pair[0], pair[1]
            )));
        }

        let segments_dir = workspace.segments_dir();
        debug!(
            segments = plan.len(),
            splits = splits.len(),
            "Cutting source in a single pass"
        );
        self.media.cut_at(video, &splits, &segments_dir).await?;

        let produced = count_pieces(&segments_dir).await?;
        if produced != plan.len() {
            return Err(WorkerError::SegmentCountMismatch {
                expected: plan.len(),
                produced,
            });
        }

        let mut all = Vec::with_capacity(plan.len());
        for (index, planned) in plan.iter().enumerate() {
            let path = segments_dir.join(segment_file_name(planned.kind, index));
            tokio::fs::rename(piece_path(&segments_dir, index), &path).await?;
            all.push(VideoSegment {
                index,
                path,
                kind: planned.kind,
                start: planned.start,
                end: planned.end,
            });
        }

        for gap in all.iter().filter(|s| !s.is_voice()) {
            let tmp = gap.path.with_extension("silent.mp4");
            self.media
                .add_silent_audio(&gap.path, gap.duration(), &tmp)
                .await?;
            replace_file(&tmp, &gap.path).await?;
        }

        let voice: Vec<VideoSegment> = all.iter().filter(|s| s.is_voice()).cloned().collect();
        metrics::record_segments_processed(SegmentKind::Voice.as_str(), voice.len());
        metrics::record_segments_processed(SegmentKind::Gap.as_str(), all.len() - voice.len());

        info!(
            total = all.len(),
            voice = voice.len(),
            "Segmentation complete"
        );

        Ok(Segmentation { all, voice })
    }
}

/// Count raw cut pieces left in `dir`.
async fn count_pieces(dir: &Path) -> WorkerResult<usize> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut count = 0;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(PIECE_PREFIX) && name.ends_with(".mp4") {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{read_meta, write_meta, FakeMedia, FakeMeta};
    use revoice_models::JobId;
    use tempfile::TempDir;

    fn hello_world() -> Vec<TranscriptInterval> {
        vec![
            TranscriptInterval::new(0.5, 2.0, "Hello"),
            TranscriptInterval::new(3.0, 5.0, "World"),
        ]
    }

    #[test]
    fn test_plan_alternates_gaps_and_voice() {
        let plan = plan_segments(&hello_world(), 10.0);
        let expected = [
            (SegmentKind::Gap, 0.0, 0.5),
            (SegmentKind::Voice, 0.5, 2.0),
            (SegmentKind::Gap, 2.0, 3.0),
            (SegmentKind::Voice, 3.0, 5.0),
            (SegmentKind::Gap, 5.0, 10.0),
        ];
        assert_eq!(plan.len(), expected.len());
        for (planned, (kind, start, end)) in plan.iter().zip(expected) {
            assert_eq!(planned.kind, kind);
            assert_eq!(planned.start, start);
            assert_eq!(planned.end, end);
        }
        assert_eq!(split_points(&plan), vec![0.5, 2.0, 3.0, 5.0]);
    }

    #[test]
    fn test_plan_without_leading_or_trailing_gap() {
        let intervals = vec![
            TranscriptInterval::new(0.0, 2.0, "a"),
            TranscriptInterval::new(2.0, 4.0, "b"),
        ];
        let plan = plan_segments(&intervals, 4.0);
        assert_eq!(plan.len(), 2);
        assert!(plan.iter().all(|s| s.kind == SegmentKind::Voice));
    }

    #[test]
    fn test_plan_without_speech_is_one_gap() {
        let plan = plan_segments(&[], 7.5);
        assert_eq!(
            plan,
            vec![PlannedSegment {
                kind: SegmentKind::Gap,
                start: 0.0,
                end: 7.5
            }]
        );
        assert!(split_points(&plan).is_empty());
    }

    #[test]
    fn test_sub_millisecond_gap_is_folded() {
        let intervals = vec![
            TranscriptInterval::new(0.5, 2.0, "a"),
            TranscriptInterval::new(2.0004, 3.0, "b"),
        ];
        let aligned = align_intervals(&intervals, 10.0);
        assert_eq!(aligned[1].start, 2.0);

        for input in [&intervals, &aligned] {
            let plan = plan_segments(input, 10.0);
            let kinds: Vec<SegmentKind> = plan.iter().map(|s| s.kind).collect();
            assert_eq!(
                kinds,
                vec![
                    SegmentKind::Gap,
                    SegmentKind::Voice,
                    SegmentKind::Voice,
                    SegmentKind::Gap
                ]
            );
            assert_eq!(plan[2].start, 2.0);
            assert_eq!(split_points(&plan), vec![0.5, 2.0, 3.0]);
        }
    }

    #[test]
    fn test_split_points_strictly_increasing_at_millisecond_resolution() {
        let intervals = vec![
            TranscriptInterval::new(0.0004, 1.0, "a"),
            TranscriptInterval::new(1.0002, 1.0004, "blip"),
            TranscriptInterval::new(1.5, 2.0004, "b"),
            TranscriptInterval::new(2.0009, 3.0, "c"),
        ];
        let aligned = align_intervals(&intervals, 3.0003);
        let texts: Vec<&str> = aligned.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);

        let plan = plan_segments(&aligned, 3.0003);
        assert_eq!(
            plan.iter().filter(|s| s.kind == SegmentKind::Voice).count(),
            aligned.len()
        );
        assert_eq!(plan.last().unwrap().end, 3.0003);

        let splits = split_points(&plan);
        assert_eq!(splits, vec![1.0, 1.5, 2.0, 2.001]);
        let formatted: Vec<String> = splits.iter().map(|t| format!("{:.3}", t)).collect();
        assert!(formatted.windows(2).all(|w| w[0] != w[1]));
        assert!(splits.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_interval_clamped_to_nothing_is_dropped() {
        let intervals = vec![TranscriptInterval::new(9.9996, 10.0, "tail")];
        assert!(align_intervals(&intervals, 10.0).is_empty());
        assert_eq!(plan_segments(&[], 10.0).len(), 1);
    }

    #[test]
    fn test_plan_is_deterministic() {
        assert_eq!(
            plan_segments(&hello_world(), 10.0),
            plan_segments(&hello_world(), 10.0)
        );
    }

    async fn setup() -> (TempDir, JobWorkspace, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let ws = JobWorkspace::create(dir.path(), &JobId::from_string("seg"))
            .await
            .unwrap();
        let source = dir.path().join("source.mp4");
        write_meta(&source, &FakeMeta::video(10.0)).await;
        (dir, ws, source)
    }

    #[tokio::test]
    async fn test_segment_names_and_silence() {
        let (_dir, ws, source) = setup().await;
        let media = Arc::new(FakeMedia::default());
        let segmenter = Segmenter::new(media.clone());

        let result = segmenter
            .segment(&source, &hello_world(), 10.0, &ws)
            .await
            .unwrap();

        assert_eq!(result.all.len(), 5);
        assert_eq!(result.voice.len(), 2);
        assert_eq!(
            result.voice.iter().map(|s| s.index).collect::<Vec<_>>(),
            vec![1, 3]
        );
        for (i, seg) in result.all.iter().enumerate() {
            assert_eq!(seg.index, i);
            assert_eq!(
                seg.path,
                ws.segments_dir().join(format!("{}_{}.mp4", seg.kind, i))
            );
            assert!(seg.path.exists());
        }
        assert!(!piece_path(&ws.segments_dir(), 0).exists());

        // Only gaps get a silent track, each with its own duration
        assert_eq!(media.calls_of("add_silence").len(), 3);
        let trailing = read_meta(&result.all[4].path).await.unwrap();
        assert_eq!(trailing.duration, 5.0);
        assert_eq!(media.calls_of("cut").len(), 1);
    }

    #[tokio::test]
    async fn test_segment_twice_yields_same_boundaries() {
        let (dir, ws, source) = setup().await;
        let segmenter = Segmenter::new(Arc::new(FakeMedia::default()));
        let first = segmenter
            .segment(&source, &hello_world(), 10.0, &ws)
            .await
            .unwrap();

        let ws = JobWorkspace::create(dir.path(), &JobId::from_string("seg"))
            .await
            .unwrap();
        let second = segmenter
            .segment(&source, &hello_world(), 10.0, &ws)
            .await
            .unwrap();
        assert_eq!(first.all, second.all);
    }

    #[tokio::test]
    async fn test_piece_count_mismatch_is_fatal() {
        let (_dir, ws, source) = setup().await;
        let media = FakeMedia::default();
        *media.piece_delta.lock().unwrap() = -1;
        let segmenter = Segmenter::new(Arc::new(media));

        let err = segmenter
            .segment(&source, &hello_world(), 10.0, &ws)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkerError::SegmentCountMismatch {
                expected: 5,
                produced: 4
            }
        ));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_colliding_boundaries_rejected_before_cut() {
        let (_dir, ws, source) = setup().await;
        let media = Arc::new(FakeMedia::default());
        let segmenter = Segmenter::new(media.clone());

        let blip = vec![TranscriptInterval::new(2.0, 2.0004, "blip")];
        let err = segmenter.segment(&source, &blip, 10.0, &ws).await.unwrap_err();
        assert!(matches!(err, WorkerError::InvalidInput(_)));
        assert!(media.calls_of("cut").is_empty());
    }

    #[tokio::test]
    async fn test_cut_failure_is_retryable() {
        let (_dir, ws, source) = setup().await;
        let media = FakeMedia::default();
        media.fail("cut");
        let segmenter = Segmenter::new(Arc::new(media));

        let err = segmenter
            .segment(&source, &hello_world(), 10.0, &ws)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Media(_)));
        assert!(err.is_retryable());
    }
}
