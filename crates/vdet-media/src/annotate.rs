//! Annotation rendering and frame pixel conversion.

use opencv::core::{Mat, Point, Rect, Scalar};
use opencv::imgproc;
use opencv::prelude::MatTraitConst;

use vdet_models::Detection;

use crate::error::{MediaError, MediaResult};

/// Box color palette, BGR. Indexed by class id.
const PALETTE: &[(f64, f64, f64)] = &[
    (76.0, 177.0, 34.0),
    (36.0, 28.0, 237.0),
    (0.0, 242.0, 255.0),
    (232.0, 162.0, 0.0),
    (164.0, 73.0, 163.0),
    (21.0, 0.0, 136.0),
    (190.0, 146.0, 112.0),
    (87.0, 122.0, 185.0),
];

fn class_color(class_id: usize) -> Scalar {
    let (b, g, r) = PALETTE[class_id % PALETTE.len()];
    Scalar::new(b, g, r, 0.0)
}

/// Frame geometry as (width, height).
pub fn frame_dimensions(frame: &Mat) -> (u32, u32) {
    (frame.cols() as u32, frame.rows() as u32)
}

/// Convert a BGR `Mat` into contiguous RGB bytes for the detector.
///
/// Returns the pixel buffer plus frame dimensions.
pub fn frame_to_rgb(frame: &Mat) -> MediaResult<(Vec<u8>, u32, u32)> {
    if frame.empty() {
        return Err(MediaError::detection_failed("empty frame"));
    }

    let mut rgb = Mat::default();
    imgproc::cvt_color(frame, &mut rgb, imgproc::COLOR_BGR2RGB, 0)
        .map_err(|e| MediaError::detection_failed(format!("color conversion failed: {}", e)))?;

    let bytes = rgb
        .data_bytes()
        .map_err(|e| MediaError::detection_failed(format!("frame data access failed: {}", e)))?
        .to_vec();

    Ok((bytes, frame.cols() as u32, frame.rows() as u32))
}

/// Draw detection boxes and `label confidence` captions onto a BGR frame.
///
/// Mutates the frame in place; the caller owns the annotated result.
pub fn draw_detections(frame: &mut Mat, detections: &[Detection]) -> MediaResult<()> {
    let frame_width = frame.cols();
    let frame_height = frame.rows();

    for det in detections {
        let color = class_color(det.class_id);
        let rect = Rect::new(
            det.bbox.x.round() as i32,
            det.bbox.y.round() as i32,
            det.bbox.width.round() as i32,
            det.bbox.height.round() as i32,
        );

        imgproc::rectangle(frame, rect, color, 2, imgproc::LINE_8, 0)
            .map_err(|e| MediaError::detection_failed(format!("rectangle: {}", e)))?;

        // Frames too short to hold a caption get boxes only.
        if frame_height < 16 {
            continue;
        }

        let caption = format!("{} {:.0}%", det.label, det.confidence * 100.0);
        // Keep the caption inside the frame when the box touches the top.
        let text_y = if rect.y > 14 { rect.y - 6 } else { rect.y + 16 };
        let origin = Point::new(
            rect.x.clamp(0, frame_width.saturating_sub(1)),
            text_y.clamp(12, frame_height - 2),
        );

        imgproc::put_text(
            frame,
            &caption,
            origin,
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.5,
            color,
            1,
            imgproc::LINE_AA,
            false,
        )
        .map_err(|e| MediaError::detection_failed(format!("put_text: {}", e)))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::CV_8UC3;
    use vdet_models::BoundingBox;

    fn test_frame() -> Mat {
        Mat::new_rows_cols_with_default(32, 32, CV_8UC3, Scalar::all(0.0)).unwrap()
    }

    #[test]
    fn test_frame_to_rgb_dimensions() {
        let frame = test_frame();
        let (bytes, width, height) = frame_to_rgb(&frame).unwrap();
        assert_eq!(width, 32);
        assert_eq!(height, 32);
        assert_eq!(bytes.len(), 32 * 32 * 3);
    }

    #[test]
    fn test_frame_to_rgb_rejects_empty() {
        let err = frame_to_rgb(&Mat::default()).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_draw_detections_mutates_frame() {
        let mut frame = test_frame();
        let dets = vec![Detection::new(BoundingBox::new(4.0, 4.0, 16.0, 16.0), 0, 0.9)];
        draw_detections(&mut frame, &dets).unwrap();

        // At least one pixel along the box edge is no longer black.
        let (bytes, _, _) = frame_to_rgb(&frame).unwrap();
        assert!(bytes.iter().any(|&b| b != 0));
    }

    #[test]
    fn test_draw_detections_on_short_frame() {
        // A 10px-tall frame has no room for a caption; the box must
        // still be drawn without panicking.
        let mut frame =
            Mat::new_rows_cols_with_default(10, 32, CV_8UC3, Scalar::all(0.0)).unwrap();
        let dets = vec![Detection::new(BoundingBox::new(2.0, 0.0, 8.0, 8.0), 0, 0.9)];
        draw_detections(&mut frame, &dets).unwrap();

        let (bytes, _, _) = frame_to_rgb(&frame).unwrap();
        assert!(bytes.iter().any(|&b| b != 0));
    }

    #[test]
    fn test_draw_no_detections_is_noop() {
        let mut frame = test_frame();
        draw_detections(&mut frame, &[]).unwrap();
        let (bytes, _, _) = frame_to_rgb(&frame).unwrap();
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_class_colors_are_stable() {
        assert_eq!(class_color(0), class_color(0));
        assert_ne!(class_color(0), class_color(1));
    }
}
