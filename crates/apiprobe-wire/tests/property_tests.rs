//! Property-based tests for frame reassembly under arbitrary read splits.

use apiprobe_core::Framing;
use apiprobe_wire::{FrameCodec, encode_frame};
use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use tokio_util::codec::Decoder;

/// Encodes every payload, cuts the byte stream at `cuts`, and feeds the pieces
/// to a fresh decoder one read at a time.
fn reassemble(framing: Framing, payloads: &[Vec<u8>], cuts: &[usize]) -> Vec<Bytes> {
    let mut encoder = FrameCodec::new(framing.clone());
    let mut stream = Vec::new();
    for payload in payloads {
        let frame = encode_frame(&mut encoder, Bytes::from(payload.clone())).unwrap();
        stream.extend_from_slice(&frame);
    }

    let mut points: Vec<usize> = cuts
        .iter()
        .map(|c| if stream.is_empty() { 0 } else { c % stream.len() })
        .collect();
    points.push(stream.len());
    points.sort_unstable();
    points.dedup();

    let mut decoder = FrameCodec::new(framing);
    let mut buf = BytesMut::new();
    let mut frames = Vec::new();
    let mut start = 0;
    for end in points {
        buf.extend_from_slice(&stream[start..end]);
        start = end;
        while let Some(frame) = decoder.decode(&mut buf).unwrap() {
            frames.push(frame);
        }
    }
    assert!(decoder.decode_eof(&mut buf).unwrap().is_none());
    frames
}

fn width_strategy() -> impl Strategy<Value = usize> {
    prop_oneof![Just(1usize), Just(2), Just(4), Just(8)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: length-prefixed frames survive any chunking
    #[test]
    fn prop_length_prefixed_reassembly(
        width in width_strategy(),
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..200), 1..8),
        cuts in prop::collection::vec(any::<usize>(), 0..16),
    ) {
        let frames = reassemble(Framing::LengthPrefixed { width }, &payloads, &cuts);
        let expected: Vec<Bytes> = payloads.into_iter().map(Bytes::from).collect();
        prop_assert_eq!(frames, expected);
    }

    /// Property: delimited frames survive any chunking, including a split
    /// inside a multi-byte delimiter
    #[test]
    fn prop_delimited_reassembly(
        payloads in prop::collection::vec("[a-z0-9 ]{0,64}", 1..8),
        cuts in prop::collection::vec(any::<usize>(), 0..16),
    ) {
        let framing = Framing::Delimited { delimiter: Bytes::from_static(b"\r\n") };
        let raw: Vec<Vec<u8>> = payloads.iter().map(|p| p.as_bytes().to_vec()).collect();
        let frames = reassemble(framing, &raw, &cuts);
        let expected: Vec<Bytes> = raw.into_iter().map(Bytes::from).collect();
        prop_assert_eq!(frames, expected);
    }

    /// Property: fixed frames survive any chunking
    #[test]
    fn prop_fixed_reassembly(
        length in 1usize..32,
        count in 1usize..8,
        seed in any::<u8>(),
        cuts in prop::collection::vec(any::<usize>(), 0..16),
    ) {
        let payloads: Vec<Vec<u8>> = (0..count)
            .map(|i| (0..length).map(|j| seed.wrapping_add((i * length + j) as u8)).collect())
            .collect();
        let frames = reassemble(Framing::Fixed { length }, &payloads, &cuts);
        let expected: Vec<Bytes> = payloads.into_iter().map(Bytes::from).collect();
        prop_assert_eq!(frames, expected);
    }

    /// Property: one write and many writes decode to the same payload
    #[test]
    fn prop_single_and_split_delivery_agree(
        payload in prop::collection::vec(any::<u8>(), 0..512),
        cuts in prop::collection::vec(any::<usize>(), 1..32),
    ) {
        let framing = Framing::LengthPrefixed { width: 4 };
        let whole = reassemble(framing.clone(), std::slice::from_ref(&payload), &[]);
        let split = reassemble(framing, std::slice::from_ref(&payload), &cuts);
        prop_assert_eq!(whole, split);
    }
}
