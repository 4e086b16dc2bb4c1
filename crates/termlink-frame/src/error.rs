/// Errors that can occur during telegram encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload does not fit the 16-bit length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing telegrams.
    #[error("telegram I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection (a read or write returned zero bytes).
    #[error("connection closed by peer")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
