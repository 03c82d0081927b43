//! # Codec Integration Tests
//!
//! Verifies the public API from the point of view of the transport:
//! - Messages survive encoding unchanged
//! - Back-to-back frames on one stream split cleanly on the length prefix
//! - Arbitrary garbage produces errors, never panics

use bytes::{Buf, BytesMut};
use codec::{
    check_frame_len, ActorId, Frame, Message, ProtocolError, FRAME_MAGIC, LENGTH_PREFIX_SIZE,
    PROTOCOL_VERSION,
};
use proptest::prelude::*;

/// Split a buffer holding several frames the way a reader would
fn split_frames(mut stream: &[u8]) -> Vec<Result<Frame, ProtocolError>> {
    let mut frames = Vec::new();
    while stream.len() >= LENGTH_PREFIX_SIZE {
        let len = stream.get_u32() as usize;
        check_frame_len(len).unwrap();
        let (body, rest) = stream.split_at(len);
        frames.push(Frame::decode(body));
        stream = rest;
    }
    frames
}

#[test]
fn test_codec_public_constants() {
    assert_eq!(FRAME_MAGIC, 0x1A4C);
    assert_eq!(PROTOCOL_VERSION, 1);
}

#[test]
fn test_stream_of_frames_preserves_order() {
    let mut stream = BytesMut::new();
    Frame::Hello {
        actor_id: ActorId::new(1),
    }
    .encode_into(&mut stream);
    for clock in [3u64, 4, 9] {
        Frame::from(Message::new(ActorId::new(1), clock)).encode_into(&mut stream);
    }

    let frames: Vec<Frame> = split_frames(&stream)
        .into_iter()
        .map(|f| f.unwrap())
        .collect();

    assert_eq!(
        frames,
        vec![
            Frame::Hello {
                actor_id: ActorId::new(1)
            },
            Frame::Clock(Message::new(ActorId::new(1), 3)),
            Frame::Clock(Message::new(ActorId::new(1), 4)),
            Frame::Clock(Message::new(ActorId::new(1), 9)),
        ]
    );
}

#[test]
fn test_corrupt_frame_does_not_poison_neighbours() {
    let mut stream = BytesMut::new();
    Frame::from(Message::new(ActorId::new(2), 1)).encode_into(&mut stream);
    let corrupt_start = stream.len();
    Frame::from(Message::new(ActorId::new(2), 2)).encode_into(&mut stream);
    Frame::from(Message::new(ActorId::new(2), 3)).encode_into(&mut stream);

    // Flip a byte inside the second frame's magic
    stream[corrupt_start + LENGTH_PREFIX_SIZE] ^= 0xFF;

    let results = split_frames(&stream);
    assert_eq!(results.len(), 3);
    assert_eq!(
        results[0],
        Ok(Frame::Clock(Message::new(ActorId::new(2), 1)))
    );
    assert!(matches!(results[1], Err(ProtocolError::InvalidMagic { .. })));
    assert_eq!(
        results[2],
        Ok(Frame::Clock(Message::new(ActorId::new(2), 3)))
    );
}

proptest! {
    #[test]
    fn prop_message_payload_is_not_mutated(sender in any::<u32>(), clock in any::<u64>()) {
        let message = Message::new(ActorId::new(sender), clock);
        let bytes = Frame::from(message).encode();
        let decoded = Frame::decode(&bytes[LENGTH_PREFIX_SIZE..]).unwrap();
        prop_assert_eq!(decoded, Frame::Clock(message));
    }

    #[test]
    fn prop_garbage_never_panics(body in proptest::collection::vec(any::<u8>(), 0..64)) {
        let _ = Frame::decode(&body);
    }
}
