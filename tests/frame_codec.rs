//! Wire-format tests for `encode`, `decode` and `StompCodec`.

use bytes::BytesMut;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stompline::{
    Command, Frame, ProtocolError, StompCodec, decode, decode_with_limit, encode,
};
use tokio_util::codec::Decoder;

fn message(dest: &str, body: &str) -> Frame {
    Frame::new(Command::Message)
        .header("destination", dest)
        .header("message-id", "ID:broker-1")
        .header("subscription", "sub-1")
        .set_body(body.as_bytes().to_vec())
}

fn sample_frames() -> Vec<Frame> {
    vec![
        Frame::new(Command::Connect)
            .header("accept-version", "1.0,1.1,1.2")
            .header("host", "activemq")
            .header("heart-beat", "0,0"),
        Frame::new(Command::Connected).header("version", "1.2"),
        Frame::new(Command::Subscribe)
            .header("destination", "/queue/Q")
            .header("id", "sub-1")
            .header("ack", "auto"),
        Frame::new(Command::Send)
            .header("destination", "/queue/Q")
            .header("content-type", "text/plain")
            .header("content-length", "5")
            .set_body(b"hello".to_vec()),
        message("/queue/Q", "payload with spaces and\nnewlines"),
        Frame::new(Command::Disconnect),
        Frame::new(Command::Error)
            .header("message", "bad destination")
            .set_body(b"details".to_vec()),
    ]
}

// =============================================================================
// Encoding
// =============================================================================

#[test]
fn encode_connect_is_bit_exact() {
    let f = Frame::new(Command::Connect)
        .header("accept-version", "1.0,1.1,1.2")
        .header("host", "activemq")
        .header("heart-beat", "0,0");
    assert_eq!(
        encode(&f),
        b"CONNECT\naccept-version:1.0,1.1,1.2\nhost:activemq\nheart-beat:0,0\n\n\0".to_vec()
    );
}

#[test]
fn encode_send_with_content_length_writes_body_verbatim() {
    let f = Frame::new(Command::Send)
        .header("destination", "/queue/Q")
        .header("content-type", "text/plain")
        .header("content-length", "11")
        .set_body(b"a:b\\c\nd\re!".to_vec());
    let mut expected =
        b"SEND\ndestination:/queue/Q\ncontent-type:text/plain\ncontent-length:11\n\n".to_vec();
    expected.extend_from_slice(b"a:b\\c\nd\re!");
    expected.push(0);
    assert_eq!(encode(&f), expected);
}

// =============================================================================
// Round trip
// =============================================================================

#[test]
fn decode_inverts_encode() {
    for f in sample_frames() {
        let bytes = encode(&f);
        let (decoded, consumed) = decode(&bytes, 0).expect("decode").expect("complete");
        assert_eq!(decoded, f);
        assert_eq!(consumed, bytes.len());
    }
}

#[test]
fn binary_body_survives_with_content_length() {
    let f = Frame::new(Command::Message)
        .header("content-length", "3")
        .set_body(vec![b'a', 0, b'b']);
    let bytes = encode(&f);
    let (decoded, _) = decode(&bytes, 0).unwrap().unwrap();
    assert_eq!(decoded.body, vec![b'a', 0, b'b']);
}

#[test]
fn header_value_ending_in_cr_survives() {
    let f = Frame::new(Command::Message).header("k", "v\r");
    let bytes = encode(&f);
    let (decoded, _) = decode(&bytes, 0).unwrap().unwrap();
    assert_eq!(decoded.headers, vec![("k".to_string(), "v\r".to_string())]);
}

// =============================================================================
// Partial reads
// =============================================================================

#[test]
fn every_split_point_yields_same_frame() {
    for f in sample_frames() {
        let bytes = encode(&f);
        for split in 0..=bytes.len() {
            let mut codec = StompCodec::new();
            let mut buf = BytesMut::new();

            buf.extend_from_slice(&bytes[..split]);
            let first = codec.decode(&mut buf).expect("decode");
            if split < bytes.len() {
                assert!(first.is_none(), "frame produced early at split {}", split);
                buf.extend_from_slice(&bytes[split..]);
                let second = codec.decode(&mut buf).expect("decode");
                assert_eq!(second.as_ref(), Some(&f), "split {}", split);
            } else {
                assert_eq!(first.as_ref(), Some(&f));
            }
            assert!(buf.is_empty());
        }
    }
}

#[test]
fn byte_by_byte_content_length() {
    let mut codec = StompCodec::new();
    let raw = b"MESSAGE\ncontent-length:5\n\nhello\0";

    let mut buf = BytesMut::new();
    for i in 0..raw.len() {
        buf.extend_from_slice(&raw[i..i + 1]);
        let res = codec.decode(&mut buf).expect("decode failed");
        if i < raw.len() - 1 {
            assert!(res.is_none(), "decoder produced item too early at byte {}", i);
        } else {
            assert_eq!(res.expect("frame after final byte").body, b"hello".to_vec());
        }
    }
}

/// Encode several frames back to back and feed them to the decoder in
/// random chunk sizes. The RNG is seeded so the test is deterministic.
#[test]
fn randomized_splits_multiple_frames() {
    let frames = sample_frames();
    let mut encoded = Vec::new();
    for f in &frames {
        encoded.extend_from_slice(&encode(f));
    }

    let mut rng = StdRng::from_seed([0x42; 32]);
    for _ in 0..50 {
        let mut codec = StompCodec::new();
        let mut buf = BytesMut::new();
        let mut decoded = Vec::new();
        let mut off = 0usize;
        while off < encoded.len() {
            let sz = rng.gen_range(1..16).min(encoded.len() - off);
            buf.extend_from_slice(&encoded[off..off + sz]);
            off += sz;
            while let Some(f) = codec.decode(&mut buf).expect("decode") {
                decoded.push(f);
            }
        }
        assert_eq!(decoded, frames);
        assert!(buf.is_empty());
    }
}

// =============================================================================
// Multiple frames in one buffer
// =============================================================================

#[test]
fn two_concatenated_frames_decode_in_order() {
    let a = encode(&message("/queue/Q", "first"));
    let b = encode(&message("/queue/Q", "second"));
    let mut both = a.clone();
    both.extend_from_slice(&b);

    let (first, used_a) = decode(&both, 0).unwrap().unwrap();
    assert_eq!(first.body, b"first".to_vec());
    assert_eq!(used_a, a.len());

    let (second, used_b) = decode(&both, used_a).unwrap().unwrap();
    assert_eq!(second.body, b"second".to_vec());
    assert_eq!(used_b, b.len());

    assert_eq!(decode(&both, used_a + used_b).unwrap(), None);
}

#[test]
fn codec_keeps_trailing_partial_frame() {
    let mut codec = StompCodec::new();
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&encode(&message("/queue/Q", "one")));
    buf.extend_from_slice(b"MESSAGE\ndestination:/queue/Q\n\ntw");

    let first = codec.decode(&mut buf).unwrap().unwrap();
    assert_eq!(first.body, b"one".to_vec());
    assert_eq!(&buf[..], b"MESSAGE\ndestination:/queue/Q\n\ntw");
    assert!(codec.decode(&mut buf).unwrap().is_none());

    buf.extend_from_slice(b"o\0");
    assert_eq!(codec.decode(&mut buf).unwrap().unwrap().body, b"two".to_vec());
}

#[test]
fn eols_between_frames_are_skipped() {
    let mut raw = encode(&message("/queue/Q", "a"));
    raw.extend_from_slice(b"\n\r\n");
    raw.extend_from_slice(&encode(&message("/queue/Q", "b")));

    let mut codec = StompCodec::new();
    let mut buf = BytesMut::from(&raw[..]);
    assert_eq!(codec.decode(&mut buf).unwrap().unwrap().body, b"a".to_vec());
    assert_eq!(codec.decode(&mut buf).unwrap().unwrap().body, b"b".to_vec());
    assert!(buf.is_empty());
}

// =============================================================================
// Errors
// =============================================================================

#[test]
fn oversized_content_length_is_rejected_before_body_arrives() {
    let raw = b"MESSAGE\ncontent-length:17000000\n\n";
    match decode(raw, 0) {
        Err(ProtocolError::FrameTooLarge { size, limit }) => {
            assert_eq!(size, 17_000_000);
            assert_eq!(limit, 16 * 1024 * 1024);
        }
        other => panic!("expected FrameTooLarge, got {:?}", other),
    }
}

#[test]
fn codec_with_small_limit_rejects_declared_length() {
    let mut codec = StompCodec::with_max_frame_size(8);
    let mut buf = BytesMut::from(&b"MESSAGE\ncontent-length:9\n\n"[..]);
    let err = codec.decode(&mut buf).unwrap_err();
    assert!(err.to_string().contains("exceeds limit"), "{}", err);
}

#[test]
fn unterminated_body_past_limit_is_rejected() {
    let mut raw = b"MESSAGE\n\n".to_vec();
    raw.extend(std::iter::repeat_n(b'x', 100));
    assert!(matches!(
        decode_with_limit(&raw, 0, 64),
        Err(ProtocolError::FrameTooLarge { .. })
    ));
    assert_eq!(decode_with_limit(&raw, 0, 1024).unwrap(), None);
}

#[test]
fn unknown_command_is_rejected() {
    assert_eq!(
        decode(b"BEGIN\ntransaction:tx1\n\n\0", 0).unwrap_err(),
        ProtocolError::UnknownCommand("BEGIN".into())
    );
}

#[test]
fn header_without_colon_is_malformed() {
    assert_eq!(
        decode(b"MESSAGE\ndestination\n\n\0", 0).unwrap_err(),
        ProtocolError::MalformedHeader("destination".into())
    );
}

#[test]
fn invalid_content_length_is_error() {
    assert_eq!(
        decode(b"SEND\ncontent-length:xyz\n\nhello\0", 0).unwrap_err(),
        ProtocolError::InvalidContentLength("xyz".into())
    );
}

#[test]
fn content_length_body_must_end_in_nul() {
    assert_eq!(
        decode(b"MESSAGE\ncontent-length:2\n\nabc\0", 0).unwrap_err(),
        ProtocolError::MissingTerminator
    );
}

#[test]
fn invalid_utf8_header_is_error() {
    let raw = b"MESSAGE\ndestination:\xff\xfe\n\n\0";
    assert_eq!(
        decode(raw, 0).unwrap_err(),
        ProtocolError::InvalidUtf8("header")
    );
}
