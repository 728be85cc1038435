//! Image losses that produce the upstream gradient for the backward pass.

use crate::core::{FeatureImage, RasterError};

/// Mean squared error over every pixel and channel, returning (loss, d_rendered).
pub fn l2_loss_and_grad(
    rendered: &FeatureImage,
    target: &FeatureImage,
) -> Result<(f32, FeatureImage), RasterError> {
    if rendered.width() != target.width()
        || rendered.height() != target.height()
        || rendered.channels() != target.channels()
    {
        return Err(RasterError::ImageShape {
            what: "loss target",
            expected_width: rendered.width(),
            expected_height: rendered.height(),
            expected_channels: rendered.channels(),
            width: target.width(),
            height: target.height(),
            channels: target.channels(),
        });
    }

    let n = rendered.data().len().max(1) as f32;
    let mut loss = 0.0f32;
    let mut d = FeatureImage::new(rendered.width(), rendered.height(), rendered.channels());

    for ((g, &r), &t) in d.data_mut().iter_mut().zip(rendered.data()).zip(target.data()) {
        let diff = r - t;
        loss += diff * diff;
        *g = diff * (2.0 / n);
    }

    Ok((loss / n, d))
}
