// The per-pixel arithmetic shared by every strategy.
//
// Keeping this in one place means the strategies cannot disagree on boundary
// handling, accumulation order, or rounding.

use std::ops::Range;

use crate::image::{CHANNELS, Image};
use crate::kernel::KernelGeometry;

/// Convolves the neighbourhood of `(x, y)` with the kernel and returns the
/// resulting R, G, B values.
///
/// Taps that fall outside the image contribute nothing (zero padding). Sums
/// are accumulated in `f64` in kernel row-major order, then rounded half away
/// from zero and saturated into `0..=255`.
pub fn compute_pixel(input: &Image, kernel: &KernelGeometry, x: usize, y: usize) -> [u8; CHANNELS] {
    let width = input.width();
    let height = input.height();

    let mut sums = [0f64; CHANNELS];

    for ky in 0..kernel.height {
        // rows above or below the image are all zero
        let Some(image_y) = (y + ky)
            .checked_sub(kernel.half_height)
            .filter(|&row| row < height)
        else {
            continue;
        };

        for kx in 0..kernel.width {
            let Some(image_x) = (x + kx)
                .checked_sub(kernel.half_width)
                .filter(|&column| column < width)
            else {
                continue;
            };

            let k_val = kernel.coefficient(ky, kx);

            for (c, sum) in sums.iter_mut().enumerate() {
                *sum += input[(image_y, image_x, c)] as f64 * k_val;
            }
        }
    }

    sums.map(saturate)
}

/// Rounds half away from zero and clamps into the channel range.
#[inline]
pub(crate) fn saturate(sum: f64) -> u8 {
    sum.round().clamp(0.0, 255.0) as u8
}

/// Convolves a contiguous range of output rows.
///
/// __Arguments:__
///
/// + `input` - the full input image; rows outside `rows` are read for the
///   neighbourhoods of boundary pixels
///
/// + `kernel` - validated kernel geometry
///
/// + `rows` - the output rows to compute
///
/// + `out` - destination for exactly those rows, `rows.len() * width * 3`
///   bytes, with row `rows.start` at offset 0
///
pub fn convolve_rows(input: &Image, kernel: &KernelGeometry, rows: Range<usize>, out: &mut [u8]) {
    debug_assert_eq!(out.len(), rows.len() * input.row_len());

    convolve_pixels(input, kernel, rows.start * input.width(), out);
}

/// Convolves a contiguous run of pixels in row-major order, starting at the
/// pixel with flat index `first_pixel` (`y * width + x`). The run may start
/// and end anywhere within a row.
pub(crate) fn convolve_pixels(
    input: &Image,
    kernel: &KernelGeometry,
    first_pixel: usize,
    out: &mut [u8],
) {
    let width = input.width();

    for (i, out_pixel) in out.chunks_exact_mut(CHANNELS).enumerate() {
        let index = first_pixel + i;
        out_pixel.copy_from_slice(&compute_pixel(input, kernel, index % width, index / width));
    }
}
