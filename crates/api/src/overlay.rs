//! Annotates streamed frames with the per-frame analysis

use attention::{AttentionStatus, FrameAnalysis};
use camera_capture::VideoFrame;
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
};
use imageproc::rect::Rect;

const FACE_BOX: Rgb<u8> = Rgb([0, 200, 255]);
const LANDMARK: Rgb<u8> = Rgb([255, 255, 255]);
const GAZE_LINE: Rgb<u8> = Rgb([255, 0, 0]);
const ATTENTIVE: Rgb<u8> = Rgb([0, 180, 0]);
const DISTRACTED: Rgb<u8> = Rgb([220, 0, 0]);

const STATUS_BAR_HEIGHT: u32 = 12;

fn status_colour(status: AttentionStatus) -> Rgb<u8> {
    match status {
        AttentionStatus::Attentive => ATTENTIVE,
        AttentionStatus::Distracted => DISTRACTED,
    }
}

/// Draw the face box, landmarks, gaze line and a status bar.
///
/// Frames whose buffer does not match their dimensions are returned as-is.
pub fn annotate(frame: &VideoFrame, analysis: &FrameAnalysis) -> VideoFrame {
    let Some(mut img) = frame.to_rgb_image() else {
        return frame.clone();
    };

    if let Some(face) = &analysis.face {
        let bbox = face.bbox;
        if bbox.width >= 1.0 && bbox.height >= 1.0 {
            let rect = Rect::at(bbox.x.round() as i32, bbox.y.round() as i32)
                .of_size(bbox.width.round() as u32, bbox.height.round() as u32);
            draw_hollow_rect_mut(&mut img, rect, FACE_BOX);
        }

        for p in face.landmarks.points() {
            draw_filled_circle_mut(&mut img, (p.x.round() as i32, p.y.round() as i32), 1, LANDMARK);
        }
    }

    if let Some(gaze) = &analysis.gaze {
        draw_line_segment_mut(
            &mut img,
            (gaze.nose_tip.x as f32, gaze.nose_tip.y as f32),
            (gaze.nose_end.x as f32, gaze.nose_end.y as f32),
            GAZE_LINE,
        );
    }

    draw_status_bar(&mut img, analysis.status);
    VideoFrame::from_rgb_image(img, frame.timestamp_ns, frame.sequence)
}

fn draw_status_bar(img: &mut RgbImage, status: AttentionStatus) {
    let height = STATUS_BAR_HEIGHT.min(img.height());
    if height == 0 || img.width() == 0 {
        return;
    }
    draw_filled_rect_mut(img, Rect::at(0, 0).of_size(img.width(), height), status_colour(status));
}
