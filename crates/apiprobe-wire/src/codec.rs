//! Frame codec for byte-stream transports.

use apiprobe_core::{DEFAULT_MAX_FRAME_SIZE, Framing};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::FrameError;

/// Splits a byte stream into frames and writes frames back out.
///
/// Partial input stays buffered inside the `Framed` read buffer between
/// calls, so a frame may arrive over any number of reads.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    framing: Framing,
    max_frame_size: usize,
    /// Resume offset for delimiter scanning.
    next_index: usize,
}

impl FrameCodec {
    /// Creates a codec with the default size limit.
    pub fn new(framing: Framing) -> Self {
        Self::with_max_frame_size(framing, DEFAULT_MAX_FRAME_SIZE)
    }

    /// Creates a codec that rejects frames larger than `max_frame_size`.
    pub fn with_max_frame_size(framing: Framing, max_frame_size: usize) -> Self {
        Self {
            framing,
            max_frame_size,
            next_index: 0,
        }
    }

    /// Configured framing.
    pub fn framing(&self) -> &Framing {
        &self.framing
    }

    /// Largest frame accepted.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

/// Largest value an unsigned big-endian prefix of `width` bytes can hold.
fn prefix_limit(width: usize) -> u64 {
    if width >= 8 {
        u64::MAX
    } else {
        (1u64 << (8 * width)) - 1
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &self.framing {
            Framing::Fixed { length } => {
                let length = *length;
                if src.len() < length {
                    src.reserve(length - src.len());
                    return Ok(None);
                }
                Ok(Some(src.split_to(length).freeze()))
            }
            Framing::Delimited { delimiter } => {
                let start = self.next_index.min(src.len());
                match find(&src[start..], delimiter) {
                    Some(offset) => {
                        let end = start + offset;
                        self.next_index = 0;
                        if end > self.max_frame_size {
                            return Err(FrameError::FrameTooLarge {
                                size: end,
                                max: self.max_frame_size,
                            });
                        }
                        let frame = src.split_to(end).freeze();
                        src.advance(delimiter.len());
                        Ok(Some(frame))
                    }
                    None => {
                        if src.len() > self.max_frame_size + delimiter.len() {
                            return Err(FrameError::FrameTooLarge {
                                size: src.len(),
                                max: self.max_frame_size,
                            });
                        }
                        // A delimiter may straddle the next read.
                        self.next_index = src
                            .len()
                            .saturating_sub(delimiter.len().saturating_sub(1));
                        Ok(None)
                    }
                }
            }
            Framing::LengthPrefixed { width } => {
                let width = *width;
                if src.len() < width {
                    return Ok(None);
                }
                let declared = (&src[..width]).get_uint(width);
                let length = usize::try_from(declared)
                    .ok()
                    .filter(|len| *len <= self.max_frame_size)
                    .ok_or(FrameError::FrameTooLarge {
                        size: usize::try_from(declared).unwrap_or(usize::MAX),
                        max: self.max_frame_size,
                    })?;
                if src.len() < width + length {
                    src.reserve(width + length - src.len());
                    return Ok(None);
                }
                src.advance(width);
                Ok(Some(src.split_to(length).freeze()))
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            None => Err(FrameError::Truncated {
                buffered: buf.len(),
            }),
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size: item.len(),
                max: self.max_frame_size,
            });
        }
        match &self.framing {
            Framing::Fixed { length } => {
                if item.len() != *length {
                    return Err(FrameError::LengthMismatch {
                        expected: *length,
                        actual: item.len(),
                    });
                }
                dst.extend_from_slice(&item);
            }
            Framing::Delimited { delimiter } => {
                if find(&item, delimiter).is_some() {
                    return Err(FrameError::DelimiterInPayload);
                }
                dst.reserve(item.len() + delimiter.len());
                dst.extend_from_slice(&item);
                dst.extend_from_slice(delimiter);
            }
            Framing::LengthPrefixed { width } => {
                let limit = prefix_limit(*width);
                if item.len() as u64 > limit {
                    return Err(FrameError::FrameTooLarge {
                        size: item.len(),
                        max: usize::try_from(limit).unwrap_or(usize::MAX),
                    });
                }
                dst.reserve(width + item.len());
                dst.put_uint(item.len() as u64, *width);
                dst.extend_from_slice(&item);
            }
        }
        Ok(())
    }
}

/// Frames a single payload.
pub fn encode_frame(codec: &mut FrameCodec, payload: Bytes) -> Result<Bytes, FrameError> {
    let mut dst = BytesMut::new();
    codec.encode(payload, &mut dst)?;
    Ok(dst.freeze())
}

/// Decodes exactly one frame from a complete message.
///
/// Used when frames travel inside transport messages that already have
/// boundaries, so an incomplete or overlong message is an error.
pub fn decode_exact(codec: &mut FrameCodec, message: &[u8]) -> Result<Bytes, FrameError> {
    let mut buf = BytesMut::from(message);
    let frame = codec
        .decode_eof(&mut buf)?
        .ok_or(FrameError::Truncated { buffered: 0 })?;
    if !buf.is_empty() {
        return Err(FrameError::TrailingBytes {
            remaining: buf.len(),
        });
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn length_prefixed(width: usize) -> FrameCodec {
        FrameCodec::new(Framing::LengthPrefixed { width })
    }

    #[test]
    fn test_length_prefixed_ping() {
        let mut codec = length_prefixed(4);
        let framed = encode_frame(&mut codec, Bytes::from_static(b"ping")).unwrap();
        assert_eq!(&framed[..], b"\x00\x00\x00\x04ping");

        let mut buf = BytesMut::from(&framed[..3]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&framed[3..6]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&framed[6..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "ping");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_length_prefix_limit_by_width() {
        let mut codec = length_prefixed(1);
        let err = encode_frame(&mut codec, Bytes::from(vec![0u8; 256])).unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { max: 255, .. }));
        assert!(encode_frame(&mut codec, Bytes::from(vec![0u8; 255])).is_ok());
    }

    #[test]
    fn test_declared_length_over_max_rejected() {
        let mut codec = FrameCodec::with_max_frame_size(Framing::LengthPrefixed { width: 4 }, 8);
        let mut buf = BytesMut::from(&b"\x00\x00\x01\x00"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(FrameError::FrameTooLarge { size: 256, max: 8 })
        ));
    }

    #[test]
    fn test_fixed_frames() {
        let mut codec = FrameCodec::new(Framing::Fixed { length: 3 });
        let mut buf = BytesMut::from(&b"abcdefg"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "abc");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "def");
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(matches!(
            codec.decode_eof(&mut buf),
            Err(FrameError::Truncated { buffered: 1 })
        ));

        assert!(matches!(
            encode_frame(&mut codec, Bytes::from_static(b"toolong")),
            Err(FrameError::LengthMismatch {
                expected: 3,
                actual: 7
            })
        ));
    }

    #[test]
    fn test_delimiter_straddles_reads() {
        let mut codec = FrameCodec::new(Framing::Delimited {
            delimiter: Bytes::from_static(b"\r\n"),
        });
        let mut buf = BytesMut::from(&b"hello\r"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"\nworld\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "hello");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "world");
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_delimiter_in_payload_rejected() {
        let mut codec = FrameCodec::new(Framing::Delimited {
            delimiter: Bytes::from_static(b"\n"),
        });
        assert!(matches!(
            encode_frame(&mut codec, Bytes::from_static(b"a\nb")),
            Err(FrameError::DelimiterInPayload)
        ));
    }

    #[test]
    fn test_unterminated_delimited_frame_over_max() {
        let mut codec = FrameCodec::with_max_frame_size(
            Framing::Delimited {
                delimiter: Bytes::from_static(b"\n"),
            },
            4,
        );
        let mut buf = BytesMut::from(&b"abcdefgh"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(FrameError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_decode_exact() {
        let mut codec = length_prefixed(2);
        assert_eq!(
            decode_exact(&mut codec, b"\x00\x02hi").unwrap(),
            Bytes::from_static(b"hi")
        );
        assert!(matches!(
            decode_exact(&mut codec, b"\x00\x02hi!"),
            Err(FrameError::TrailingBytes { remaining: 1 })
        ));
        assert!(matches!(
            decode_exact(&mut codec, b"\x00\x05hi"),
            Err(FrameError::Truncated { .. })
        ));
    }
}
