//! Framing of JPEG images as parts of a `multipart/x-mixed-replace` stream.
//!
use bytes::{BufMut, Bytes, BytesMut};

/// Marker separating the parts of the stream.
pub const BOUNDARY: &str = "frame";

/// Content type of the video response.
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Prologue preceding the image bytes of every part.
pub const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";

const PART_TRAILER: &[u8] = b"\r\n";

/// Wrap JPEG data into one part of the stream.
pub fn as_jpeg_stream_item(data: &[u8]) -> Bytes {
    let mut part = BytesMut::with_capacity(PART_HEADER.len() + data.len() + PART_TRAILER.len());
    part.put_slice(PART_HEADER);
    part.put_slice(data);
    part.put_slice(PART_TRAILER);

    part.freeze()
}
