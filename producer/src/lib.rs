//! Upstream frame source: turns a multipart MJPEG byte stream into
//! publishes on a [`SharedFrame`](frame_sink_common::frame::SharedFrame).

pub mod mjpeg;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to read input stream: {0}")]
    Read(std::io::Error),
    #[error("failed to publish frame: {0}")]
    Publish(#[from] frame_sink_common::frame::FrameError),
}
