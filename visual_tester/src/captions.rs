use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result, anyhow};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use std::path::Path;
use trail_vision::{Annotation, Point};

/// Writes each annotation's caption next to its shape with a TrueType font.
pub struct CaptionPainter {
    font: FontVec,
    scale: PxScale,
}

impl CaptionPainter {
    pub fn load(path: &Path, size: f32) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading font {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes).map_err(|_| anyhow!("{} is not a usable font", path.display()))?;
        Ok(Self {
            font,
            scale: PxScale::from(size),
        })
    }

    pub fn paint(&self, frame: &mut RgbImage, annotations: &[Annotation]) {
        for annotation in annotations {
            let (_, height) = text_size(self.scale, &self.font, annotation.label);
            let (x, y) = caption_origin(annotation.label_anchor, height);
            draw_text_mut(frame, Rgb(annotation.color), x, y, self.scale, &self.font, annotation.label);
        }
    }
}

/// Top-left corner of a caption whose baseline sits on `anchor`, kept inside the frame.
fn caption_origin(anchor: Point, text_height: u32) -> (i32, i32) {
    let top = anchor.y - text_height as i32;
    (anchor.x.max(0), top.max(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use trail_vision::AnnotationShape;

    const SYSTEM_FONT: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf";

    #[test]
    fn captions_sit_above_their_anchor() {
        assert_eq!(caption_origin(Point::new(40, 30), 12), (40, 18));
        assert_eq!(caption_origin(Point::new(-6, 5), 12), (0, 0));
    }

    #[test]
    fn a_non_font_file_is_refused() {
        let path = std::env::temp_dir().join(format!("visual_tester_font_{}.ttf", std::process::id()));
        std::fs::write(&path, b"plain text").unwrap();
        assert!(CaptionPainter::load(&path, 16.0).is_err());
        std::fs::remove_file(&path).unwrap();
        assert!(CaptionPainter::load(&path, 16.0).is_err());
    }

    #[test]
    fn labels_are_drawn_in_their_shape_color() {
        // Only runs where the DejaVu fonts are installed.
        if !Path::new(SYSTEM_FONT).exists() {
            return;
        }
        let painter = CaptionPainter::load(Path::new(SYSTEM_FONT), 20.0).unwrap();
        let mut frame = RgbImage::new(80, 40);
        let annotation = Annotation {
            label: "Ball",
            shape: AnnotationShape::Dot(Point::new(10, 30)),
            color: [0, 255, 0],
            label_anchor: Point::new(10, 30),
        };
        painter.paint(&mut frame, &[annotation]);

        assert!(frame.pixels().any(|p| p.0[1] > 0));
        assert!(frame.pixels().all(|p| p.0[0] == 0 && p.0[2] == 0));
    }
}
