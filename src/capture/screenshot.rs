use std::io::Cursor;

use image::{ImageFormat, RgbaImage};

use crate::error::CaptureError;

use super::backend::StillFrame;

pub const PNG_MIME: &str = "image/png";

pub fn encode_png(frame: StillFrame) -> Result<Vec<u8>, CaptureError> {
    if frame.width == 0 || frame.height == 0 {
        return Err(CaptureError::Encode("empty frame".into()));
    }

    let (width, height) = (frame.width, frame.height);
    let image = RgbaImage::from_raw(width, height, frame.rgba).ok_or_else(|| {
        CaptureError::Encode(format!("pixel buffer does not match {width}x{height} RGBA"))
    })?;

    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| CaptureError::Encode(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_png_signature() {
        let frame = StillFrame {
            width: 2,
            height: 2,
            rgba: vec![255; 16],
        };
        let png = encode_png(frame).expect("png");
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn rejects_short_buffer() {
        let frame = StillFrame {
            width: 4,
            height: 4,
            rgba: vec![0; 8],
        };
        assert!(matches!(encode_png(frame), Err(CaptureError::Encode(_))));
    }
}
