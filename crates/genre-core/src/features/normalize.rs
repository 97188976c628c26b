//! Fixed-length frame normalization
//!
//! Earliest audio wins: long grids lose their tail, short grids are padded at
//! the end with frames at the log floor (not zero, which would sit far above
//! silence on the log scale).

use super::grid::{NormalizedGrid, SpectrogramGrid};

/// Pad or truncate `grid` to exactly `frame_count` frames
pub fn normalize_frames(grid: SpectrogramGrid, frame_count: usize, floor: f32) -> NormalizedGrid {
    let n_bands = grid.n_bands();
    let source_frames = grid.frame_count();
    let mut frames = grid.into_frames();

    if source_frames > frame_count {
        log::debug!("Truncating {} frames to {}", source_frames, frame_count);
        frames.truncate(frame_count);
    } else if source_frames < frame_count {
        log::debug!(
            "Padding {} frames to {} at {} dB",
            source_frames,
            frame_count,
            floor
        );
        frames.resize(frame_count, vec![floor; n_bands]);
    }

    NormalizedGrid::from_parts(frames, n_bands, source_frames)
}
