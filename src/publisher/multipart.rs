//! `multipart/x-mixed-replace` framing for MJPEG viewers
//!
//! Each composite becomes one part:
//!
//! ```text
//! --frame\r\n
//! Content-Type: image/jpeg\r\n
//! \r\n
//! <jpeg bytes>\r\n
//! ```

use bytes::{BufMut, Bytes, BytesMut};

/// Part boundary token
pub const BOUNDARY: &str = "frame";

/// Response content type for the viewer stream
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Content type of each part
pub const PART_CONTENT_TYPE: &str = "image/jpeg";

/// Frame one encoded image as a multipart part
pub fn encode_part(jpeg: &[u8]) -> Bytes {
    let header = format!("--{BOUNDARY}\r\nContent-Type: {PART_CONTENT_TYPE}\r\n\r\n");
    let mut buf = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    buf.put_slice(header.as_bytes());
    buf.put_slice(jpeg);
    buf.put_slice(b"\r\n");
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_layout() {
        let part = encode_part(&[0xFF, 0xD8, 0xFF, 0xD9]);
        let expected: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n\xFF\xD8\xFF\xD9\r\n";
        assert_eq!(&part[..], expected);
    }

    #[test]
    fn test_content_type_names_boundary() {
        assert!(STREAM_CONTENT_TYPE.ends_with(&format!("boundary={BOUNDARY}")));
    }
}
