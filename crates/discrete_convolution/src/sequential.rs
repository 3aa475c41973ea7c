use crate::convolve::convolve_rows;
use crate::error::Result;
use crate::image::Image;
use crate::kernel::Kernel;

/// Reference implementation: every row, in order, on the calling thread.
pub fn convolve_sequential(input: &Image, kernel: &Kernel) -> Result<Image> {
    let geometry = kernel.validate()?;

    let mut output = Image::blank_like(input);
    convolve_rows(input, &geometry, 0..input.height(), output.pixels_mut());

    Ok(output)
}
