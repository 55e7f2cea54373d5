use bytes::BytesMut;
use frame_sink_common::frame::SharedFrame;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

use crate::SourceError;

const HEADER_END: &[u8] = b"\r\n\r\n";
const READ_CHUNK: usize = 64 * 1024;

/// Parse state for the MJPEG multipart stream.
enum ParseState {
    /// Looking for the boundary line, e.g. `--frame\r\n`.
    SeekingBoundary,
    /// Found boundary, now looking for end of headers `\r\n\r\n`.
    SeekingHeaderEnd,
    /// Collecting JPEG bytes until the next boundary.
    CollectingBody,
}

/// Incremental splitter for `multipart/x-mixed-replace` JPEG streams.
///
/// Feed it arbitrary chunks; it hands back every complete JPEG body.
/// Boundaries and header terminators may straddle chunk edges.
pub struct MjpegSplitter {
    boundary: Vec<u8>,
    buffer: BytesMut,
    state: ParseState,
    body_scan_from: usize,
}

impl MjpegSplitter {
    /// `boundary` is the delimiter line without its CRLF, e.g. `--frame`.
    pub fn new(boundary: &str) -> Self {
        let mut line = boundary.as_bytes().to_vec();
        line.extend_from_slice(b"\r\n");
        Self {
            boundary: line,
            buffer: BytesMut::with_capacity(256 * 1024),
            state: ParseState::SeekingBoundary,
            body_scan_from: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        loop {
            match self.state {
                ParseState::SeekingBoundary => {
                    if let Some(pos) = find_subsequence(&self.buffer, &self.boundary) {
                        // Discard everything up to and including the boundary
                        let _ = self.buffer.split_to(pos + self.boundary.len());
                        self.state = ParseState::SeekingHeaderEnd;
                    } else {
                        // Keep the tail in case the boundary spans chunks
                        let keep = self.boundary.len() - 1;
                        if self.buffer.len() > keep {
                            let _ = self.buffer.split_to(self.buffer.len() - keep);
                        }
                        break;
                    }
                }
                ParseState::SeekingHeaderEnd => {
                    if let Some(pos) = find_subsequence(&self.buffer, HEADER_END) {
                        let _ = self.buffer.split_to(pos + HEADER_END.len());
                        self.body_scan_from = 0;
                        self.state = ParseState::CollectingBody;
                    } else {
                        break;
                    }
                }
                ParseState::CollectingBody => {
                    let scan = &self.buffer[self.body_scan_from..];
                    if let Some(pos) = find_subsequence(scan, &self.boundary) {
                        let body_end = self.body_scan_from + pos;
                        // Strip trailing \r\n before boundary
                        let end = if body_end >= 2
                            && self.buffer[body_end - 2] == b'\r'
                            && self.buffer[body_end - 1] == b'\n'
                        {
                            body_end - 2
                        } else {
                            body_end
                        };

                        let body = self.buffer[..end].to_vec();
                        let _ = self.buffer.split_to(body_end + self.boundary.len());

                        if !body.is_empty() {
                            frames.push(body);
                        }
                        self.state = ParseState::SeekingHeaderEnd;
                    } else {
                        // Avoid re-scanning bytes that cannot start a boundary
                        self.body_scan_from = self
                            .buffer
                            .len()
                            .saturating_sub(self.boundary.len() - 1);
                        break;
                    }
                }
            }
        }

        frames
    }
}

/// Read a multipart MJPEG stream until EOF and publish every frame.
/// Returns the number of frames published.
pub async fn pump<R>(mut reader: R, shared: &SharedFrame, boundary: &str) -> Result<u64, SourceError>
where
    R: AsyncRead + Unpin,
{
    let mut splitter = MjpegSplitter::new(boundary);
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut published: u64 = 0;

    loop {
        let n = reader.read(&mut chunk).await.map_err(SourceError::Read)?;
        if n == 0 {
            break;
        }

        for frame in splitter.push(&chunk[..n]) {
            let generation = shared.publish(&frame)?;
            published += 1;
            debug!(generation, bytes = frame.len(), "published frame");
        }

        if shared.is_stopped() {
            info!(published, "stop requested, leaving input stream");
            return Ok(published);
        }
    }

    info!(published, "input stream ended");
    Ok(published)
}

/// Find the position of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(body: &[u8]) -> Vec<u8> {
        let mut out = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        out.extend_from_slice(body);
        out.extend_from_slice(b"\r\n");
        out
    }

    fn stream(bodies: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for body in bodies {
            out.extend(part(body));
        }
        // closing boundary so the last body is terminated
        out.extend_from_slice(b"--frame\r\n");
        out
    }

    #[test]
    fn splits_frames_in_one_chunk() {
        let mut splitter = MjpegSplitter::new("--frame");
        let frames = splitter.push(&stream(&[b"\xFF\xD8one\xFF\xD9", b"\xFF\xD8two\xFF\xD9"]));
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], b"\xFF\xD8one\xFF\xD9");
        assert_eq!(frames[1], b"\xFF\xD8two\xFF\xD9");
    }

    #[test]
    fn handles_byte_at_a_time_delivery() {
        let mut splitter = MjpegSplitter::new("--frame");
        let data = stream(&[b"first", b"second", b"third"]);
        let mut frames = Vec::new();
        for byte in &data {
            frames.extend(splitter.push(std::slice::from_ref(byte)));
        }
        assert_eq!(frames, vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()]);
    }

    #[test]
    fn skips_preamble_and_empty_bodies() {
        let mut splitter = MjpegSplitter::new("--frame");
        let mut data = b"HTTP preamble garbage\r\n".to_vec();
        data.extend(stream(&[b"", b"kept"]));
        let frames = splitter.push(&data);
        assert_eq!(frames, vec![b"kept".to_vec()]);
    }

    #[test]
    fn custom_boundary() {
        let mut splitter = MjpegSplitter::new("--boundarydonotcross");
        let data = b"--boundarydonotcross\r\nX-Timestamp: 1\r\n\r\nabc\r\n--boundarydonotcross\r\n";
        assert_eq!(splitter.push(data), vec![b"abc".to_vec()]);
    }

    #[tokio::test]
    async fn pump_publishes_every_frame() {
        let shared = SharedFrame::new();
        let data = stream(&[b"a", b"bb", b"ccc"]);

        let published = pump(data.as_slice(), &shared, "--frame").await.unwrap();

        assert_eq!(published, 3);
        let slot = shared.lock().unwrap();
        assert_eq!(slot.generation(), 3);
        assert_eq!(slot.data(), b"ccc");
    }

    #[tokio::test]
    async fn pump_stops_when_flag_raised() {
        let shared = SharedFrame::new();
        shared.request_stop();
        let data = stream(&[b"a", b"b"]);

        let published = pump(data.as_slice(), &shared, "--frame").await.unwrap();

        // The first read is still drained; nothing is read afterwards.
        assert_eq!(published, 2);
        assert!(shared.is_stopped());
    }
}
