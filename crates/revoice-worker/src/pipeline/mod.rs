//! The three per-job stages, run in order by [`crate::processor::JobPipeline`].

pub mod reassembler;
pub mod segment_processor;
pub mod segmenter;

pub use reassembler::{output_file_name, render_manifest, Reassembler, ReassemblyOutcome};
pub use segment_processor::{choose_alignment, Alignment, SegmentProcessor, ALIGN_TOLERANCE_SECS};
pub use segmenter::{
    align_intervals, plan_segments, split_points, PlannedSegment, Segmentation, Segmenter,
    BOUNDARY_RESOLUTION_SECS,
};
