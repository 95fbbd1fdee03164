//! Pixel decimation for dumped video frames.
//!
//! Shrinking keeps one pixel then skips `shrink_width` pixels in X,
//! and keeps one row then skips `shrink_height` rows in Y, so the
//! output geometry is `width / (shrink_width + 1)` ×
//! `height / (shrink_height + 1)` (integer division, truncating).
//!
//! The dump regions are mapped uncached, so random access against the
//! source is slow. For small skip factors most of the frame is read
//! anyway; in that case the whole frame is copied into the scratch
//! buffer first and decimated in place.

/// Bytes per pixel of the captured raw format.
pub const BYTES_PER_PIXEL: usize = 3;

/// Skip factors below this read nearly the whole frame, so the frame
/// is staged through the scratch buffer before decimation.
const COPY_FIRST_LIMIT: u8 = 4;

/// Output geometry for a shrink factor pair.
pub fn shrunk_dimensions(width: u16, height: u16, shrink_width: u8, shrink_height: u8) -> (u16, u16) {
    (
        width / (u16::from(shrink_width) + 1),
        height / (u16::from(shrink_height) + 1),
    )
}

/// Copy one unshrunk frame from the mapped slot into `scratch`.
///
/// Returns the number of payload bytes staged (`width × height × 3`).
pub fn copy_frame(source: &[u8], scratch: &mut [u8], width: u16, height: u16) -> usize {
    let size = width as usize * height as usize * BYTES_PER_PIXEL;
    scratch[..size].copy_from_slice(&source[..size]);
    size
}

/// Decimate one frame from the mapped slot into `scratch`.
///
/// Returns the number of payload bytes staged
/// (`out_w × out_h × 3`). Output pixel `(x, y)` is the source pixel at
/// `(x·(shrink_width+1), y·(shrink_height+1))`.
pub fn shrink_frame(
    source: &[u8],
    scratch: &mut [u8],
    width: u16,
    height: u16,
    shrink_width: u8,
    shrink_height: u8,
) -> usize {
    let (out_w, out_h) = shrunk_dimensions(width, height, shrink_width, shrink_height);
    let step_x = shrink_width as usize + 1;
    let step_y = shrink_height as usize + 1;
    let row_bytes = width as usize * BYTES_PER_PIXEL;
    let out_size = out_w as usize * out_h as usize * BYTES_PER_PIXEL;

    if shrink_width < COPY_FIRST_LIMIT && shrink_height < COPY_FIRST_LIMIT {
        // Stage the whole frame, then compact forward in place. The
        // source index never falls behind the destination index, so
        // pixels are still unclobbered when read.
        let frame_size = copy_frame(source, scratch, width, height);
        debug_assert!(out_size <= frame_size);
        let mut dst = 0;
        for y in 0..out_h as usize {
            let mut src = y * step_y * row_bytes;
            for _ in 0..out_w {
                scratch.copy_within(src..src + BYTES_PER_PIXEL, dst);
                dst += BYTES_PER_PIXEL;
                src += step_x * BYTES_PER_PIXEL;
            }
        }
    } else {
        let mut dst = 0;
        for y in 0..out_h as usize {
            let mut src = y * step_y * row_bytes;
            for _ in 0..out_w {
                scratch[dst..dst + BYTES_PER_PIXEL]
                    .copy_from_slice(&source[src..src + BYTES_PER_PIXEL]);
                dst += BYTES_PER_PIXEL;
                src += step_x * BYTES_PER_PIXEL;
            }
        }
    }

    out_size
}

// ── Tests ────────────────────────────────────────────────────────
