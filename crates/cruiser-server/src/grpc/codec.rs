//! Raw byte-frame codec.
//!
//! The bridge proxies gRPC messages without parsing them, so the codec
//! passes each length-delimited message through as an opaque payload.

use bytes::{Buf, BufMut, Bytes};
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::Status;

/// One gRPC message as opaque bytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    /// The message payload, excluding the gRPC length prefix.
    pub payload: Bytes,
}

impl Frame {
    /// Wrap a payload.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }
}

/// Codec passing payloads through untouched.
#[derive(Debug, Clone, Default)]
pub struct RawCodec;

impl Codec for RawCodec {
    type Encode = Frame;
    type Decode = Frame;
    type Encoder = RawEncoder;
    type Decoder = RawDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        RawEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        RawDecoder
    }
}

/// Encoder half of [`RawCodec`].
#[derive(Debug)]
pub struct RawEncoder;

impl Encoder for RawEncoder {
    type Item = Frame;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        dst.put(item.payload);
        Ok(())
    }
}

/// Decoder half of [`RawCodec`].
#[derive(Debug)]
pub struct RawDecoder;

impl Decoder for RawDecoder {
    type Item = Frame;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        // The transport hands us exactly one length-delimited message.
        let payload = src.copy_to_bytes(src.remaining());
        Ok(Some(Frame { payload }))
    }
}
