//! A minimal uncompressed frame codec for exercising the `Framed`
//! construction path in tests. The real SPDY/2 wire format (zlib header
//! blocks included) lives outside the session core, behind the same
//! `Decoder`/`Encoder` contract.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use spdy_mux::frame::{
    DataFrame, GoAwayFrame, HeadersFrame, PingFrame, RstStreamFrame, SynReplyFrame,
    SynStreamFrame,
};
use spdy_mux::{Frame, Headers, SpdyError, StatusCode};
use tokio_util::codec::{Decoder, Encoder};

/// kind + flags + stream id + aux + priority + payload length.
const HEADER_LEN: usize = 1 + 1 + 4 + 4 + 1 + 4;

#[derive(Debug, Default, Clone)]
pub struct TestCodec;

fn encode_headers(headers: &Headers) -> Bytes {
    let mut buf = BytesMut::new();
    let pairs: Vec<(&str, &str)> = headers
        .iter()
        .flat_map(|(name, values)| values.iter().map(move |v| (name, v.as_str())))
        .collect();
    buf.put_u32(pairs.len() as u32);
    for (name, value) in pairs {
        buf.put_u32(name.len() as u32);
        buf.put_slice(name.as_bytes());
        buf.put_u32(value.len() as u32);
        buf.put_slice(value.as_bytes());
    }
    buf.freeze()
}

fn decode_headers(mut payload: Bytes) -> Result<Headers, SpdyError> {
    let take_string = |payload: &mut Bytes| -> Result<String, SpdyError> {
        if payload.remaining() < 4 {
            return Err(SpdyError::Decode("truncated header block".into()));
        }
        let len = payload.get_u32() as usize;
        if payload.remaining() < len {
            return Err(SpdyError::Decode("truncated header block".into()));
        }
        String::from_utf8(payload.split_to(len).to_vec())
            .map_err(|_| SpdyError::Decode("header block is not utf-8".into()))
    };

    if payload.remaining() < 4 {
        return Err(SpdyError::Decode("truncated header block".into()));
    }
    let count = payload.get_u32();
    let mut headers = Headers::new();
    for _ in 0..count {
        let name = take_string(&mut payload)?;
        let value = take_string(&mut payload)?;
        headers.add(name, value);
    }
    Ok(headers)
}

impl Encoder<Frame> for TestCodec {
    type Error = SpdyError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), SpdyError> {
        let (kind, fin, id, aux, priority, payload) = match &frame {
            Frame::Data(f) => (1u8, f.fin, f.stream_id, 0, 0, f.data.clone()),
            Frame::SynStream(f) => (
                2,
                f.fin,
                f.stream_id,
                f.associated_stream_id,
                f.priority,
                encode_headers(&f.headers),
            ),
            Frame::SynReply(f) => (3, f.fin, f.stream_id, 0, 0, encode_headers(&f.headers)),
            Frame::Headers(f) => (4, f.fin, f.stream_id, 0, 0, encode_headers(&f.headers)),
            Frame::RstStream(f) => (5, false, f.stream_id, f.status.as_u32(), 0, Bytes::new()),
            Frame::Ping(f) => (6, false, f.id, 0, 0, Bytes::new()),
            Frame::Settings => (7, false, 0, 0, 0, Bytes::new()),
            Frame::Noop => (8, false, 0, 0, 0, Bytes::new()),
            Frame::GoAway(f) => (9, false, 0, f.last_good_stream_id, 0, Bytes::new()),
        };
        dst.reserve(HEADER_LEN + payload.len());
        dst.put_u8(kind);
        dst.put_u8(fin as u8);
        dst.put_u32(id);
        dst.put_u32(aux);
        dst.put_u8(priority);
        dst.put_u32(payload.len() as u32);
        dst.put_slice(&payload);
        Ok(())
    }
}

impl Decoder for TestCodec {
    type Item = Frame;
    type Error = SpdyError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, SpdyError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        let payload_len =
            u32::from_be_bytes([src[11], src[12], src[13], src[14]]) as usize;
        if src.len() < HEADER_LEN + payload_len {
            src.reserve(HEADER_LEN + payload_len - src.len());
            return Ok(None);
        }

        let mut header = src.split_to(HEADER_LEN);
        let kind = header.get_u8();
        let fin = header.get_u8() != 0;
        let id = header.get_u32();
        let aux = header.get_u32();
        let priority = header.get_u8();
        let _payload_len = header.get_u32();
        let payload = src.split_to(payload_len).freeze();

        let frame = match kind {
            1 => Frame::Data(DataFrame { stream_id: id, data: payload, fin }),
            2 => Frame::SynStream(SynStreamFrame {
                stream_id: id,
                associated_stream_id: aux,
                priority,
                headers: decode_headers(payload)?,
                fin,
            }),
            3 => Frame::SynReply(SynReplyFrame {
                stream_id: id,
                headers: decode_headers(payload)?,
                fin,
            }),
            4 => Frame::Headers(HeadersFrame {
                stream_id: id,
                headers: decode_headers(payload)?,
                fin,
            }),
            5 => Frame::RstStream(RstStreamFrame {
                stream_id: id,
                status: StatusCode::from_u32(aux)
                    .ok_or_else(|| SpdyError::Decode(format!("unknown status code {aux}")))?,
            }),
            6 => Frame::Ping(PingFrame { id }),
            7 => Frame::Settings,
            8 => Frame::Noop,
            9 => Frame::GoAway(GoAwayFrame { last_good_stream_id: aux }),
            other => return Err(SpdyError::Decode(format!("unknown frame kind {other}"))),
        };
        Ok(Some(frame))
    }
}
