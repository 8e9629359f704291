//! Control-stream frame codec.
//!
//! Wire layout: `type(u8, non-zero) || payload length(u32 BE) || payload`.
//! Frames only ever travel on the dedicated control stream.

use core::fmt;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame payload (1 MiB).
pub const MAX_FRAME_PAYLOAD: usize = 1 << 20;

/// Known frame types. Only HELLO is interpreted at this layer; the rest are
/// reserved for higher-level protocol use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Hello = 1,
    PeerInfo = 2,
    Data = 3,
    Ack = 4,
    Close = 5,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Hello),
            2 => Some(Self::PeerInfo),
            3 => Some(Self::Data),
            4 => Some(Self::Ack),
            5 => Some(Self::Close),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hello => "HELLO",
            Self::PeerInfo => "PEER_INFO",
            Self::Data => "DATA",
            Self::Ack => "ACK",
            Self::Close => "CLOSE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame type must be non-zero")]
    InvalidType,
    #[error("frame payload of {0} bytes exceeds the {} byte limit", MAX_FRAME_PAYLOAD)]
    TooLarge(usize),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The basic control-stream unit. The type byte is kept raw so that frames
/// with unknown types can still be read and skipped at the receiver's
/// discretion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(message_type: MessageType, payload: Vec<u8>) -> Self {
        Self {
            frame_type: message_type as u8,
            payload,
        }
    }

    /// The known message type, if this frame carries one.
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_u8(self.frame_type)
    }
}

/// Writes a single frame and flushes.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> Result<(), FrameError> {
    if frame.frame_type == 0 {
        return Err(FrameError::InvalidType);
    }
    if frame.payload.len() > MAX_FRAME_PAYLOAD {
        return Err(FrameError::TooLarge(frame.payload.len()));
    }
    let mut header = [0u8; 5];
    header[0] = frame.frame_type;
    header[1..].copy_from_slice(&(frame.payload.len() as u32).to_be_bytes());
    writer.write_all(&header).await?;
    if !frame.payload.is_empty() {
        writer.write_all(&frame.payload).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Reads a single frame. A truncated stream surfaces as an unexpected-EOF
/// I/O error. Only one task may read a given stream at a time.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame, FrameError> {
    let mut header = [0u8; 5];
    reader.read_exact(&mut header).await?;
    let frame_type = header[0];
    if frame_type == 0 {
        return Err(FrameError::InvalidType);
    }
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
    if len > MAX_FRAME_PAYLOAD {
        return Err(FrameError::TooLarge(len));
    }
    let mut payload = vec![0u8; len];
    if len > 0 {
        reader.read_exact(&mut payload).await?;
    }
    Ok(Frame {
        frame_type,
        payload,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_read_round_trip() {
        let frame = Frame::new(MessageType::Hello, b"payload".to_vec());
        let mut wire = Vec::new();
        write_frame(&mut wire, &frame).await.unwrap();
        assert_eq!(wire[0], 1);
        assert_eq!(&wire[1..5], &7u32.to_be_bytes());

        let read = read_frame(&mut &wire[..]).await.unwrap();
        assert_eq!(read, frame);
        assert_eq!(read.message_type(), Some(MessageType::Hello));
    }

    #[tokio::test]
    async fn empty_payload_round_trip() {
        let frame = Frame::new(MessageType::Close, Vec::new());
        let mut wire = Vec::new();
        write_frame(&mut wire, &frame).await.unwrap();
        assert_eq!(wire.len(), 5);
        assert_eq!(read_frame(&mut &wire[..]).await.unwrap(), frame);
    }

    #[tokio::test]
    async fn zero_type_rejected_at_write() {
        let frame = Frame {
            frame_type: 0,
            payload: Vec::new(),
        };
        let mut wire = Vec::new();
        assert!(matches!(
            write_frame(&mut wire, &frame).await.unwrap_err(),
            FrameError::InvalidType
        ));
    }

    #[tokio::test]
    async fn zero_type_rejected_at_read() {
        let wire = [0u8, 0, 0, 0, 0];
        assert!(matches!(
            read_frame(&mut &wire[..]).await.unwrap_err(),
            FrameError::InvalidType
        ));
    }

    #[tokio::test]
    async fn oversize_payload_rejected_at_write() {
        let frame = Frame {
            frame_type: 3,
            payload: vec![0u8; MAX_FRAME_PAYLOAD + 1],
        };
        let mut wire = Vec::new();
        assert!(matches!(
            write_frame(&mut wire, &frame).await.unwrap_err(),
            FrameError::TooLarge(_)
        ));
    }

    #[tokio::test]
    async fn oversize_length_rejected_at_read() {
        let mut wire = vec![3u8];
        wire.extend_from_slice(&((MAX_FRAME_PAYLOAD as u32) + 1).to_be_bytes());
        assert!(matches!(
            read_frame(&mut &wire[..]).await.unwrap_err(),
            FrameError::TooLarge(_)
        ));
    }

    #[tokio::test]
    async fn truncated_payload_is_an_error() {
        let mut wire = Vec::new();
        write_frame(&mut wire, &Frame::new(MessageType::Data, vec![1, 2, 3, 4]))
            .await
            .unwrap();
        wire.truncate(wire.len() - 2);
        assert!(matches!(
            read_frame(&mut &wire[..]).await.unwrap_err(),
            FrameError::Io(_)
        ));
    }

    #[test]
    fn unknown_type_is_preserved() {
        let frame = Frame {
            frame_type: 0xAB,
            payload: Vec::new(),
        };
        assert_eq!(frame.message_type(), None);
    }
}
