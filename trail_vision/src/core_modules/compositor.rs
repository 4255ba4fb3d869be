// THEORY:
// The compositor lays the persistent trail overlay over the live annotated frame:
// `output = frame * 1.0 + overlay * transparency`, rounded and saturated per
// channel. The overlay is black wherever nothing was drawn, so those pixels leave
// the frame untouched.

use image::RgbImage;

/// Blends `overlay` onto `frame`. Both images must share dimensions; a mismatched
/// overlay is ignored and the frame is returned unchanged.
pub fn compose(frame: &RgbImage, overlay: &RgbImage, transparency: f32) -> RgbImage {
    let mut output = frame.clone();
    if frame.dimensions() != overlay.dimensions() {
        tracing::warn!(
            frame = ?frame.dimensions(),
            overlay = ?overlay.dimensions(),
            "overlay size does not match frame, skipping blend"
        );
        return output;
    }

    let weight = transparency.clamp(0.0, 1.0);
    for (out, layer) in output.pixels_mut().zip(overlay.pixels()) {
        for (channel, added) in out.0.iter_mut().zip(layer.0) {
            let blended = *channel as f32 + added as f32 * weight;
            *channel = blended.round().min(255.0) as u8;
        }
    }
    output
}
