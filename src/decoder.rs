//! Incremental decoder for newline-delimited JSON bodies.
//!
//! Wire format:
//! ```text
//! {"replies": [...], "is_final_chunk": false}\n
//! {"replies": [...], "is_final_chunk": true}\n
//! ```
//!
//! Chunk boundaries are set by the transport and need not line up with
//! records: one chunk may carry several records, and one record may span
//! many chunks. The decoder buffers bytes until a delimiter completes a
//! record and hands each record out as soon as it is complete.

use bytes::BytesMut;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;

use crate::client::ClientError;

/// Byte terminating every record.
pub const DELIMITER: u8 = b'\n';

/// Stateful record decoder for one streaming call.
///
/// Between chunks the buffer holds only the unterminated tail of the
/// stream. Emitted records are removed from it and never seen again.
///
/// # Example
/// ```
/// use charai::decoder::RecordDecoder;
/// use serde_json::{json, Value};
///
/// let mut decoder = RecordDecoder::<Value>::new();
/// assert!(decoder.decode(b"{\"a\":1").next().is_none());
///
/// let records: Vec<Value> = decoder
///     .decode(b"}\n{\"b\":2}\n")
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(records, vec![json!({"a": 1}), json!({"b": 2})]);
/// assert!(decoder.finish().is_ok());
/// ```
#[derive(Debug)]
pub struct RecordDecoder<T = Value> {
    buffer: BytesMut,
    /// Prefix of `buffer` already known to contain no delimiter.
    scanned: usize,
    _record: PhantomData<fn() -> T>,
}

impl<T> Default for RecordDecoder<T> {
    fn default() -> Self {
        Self {
            buffer: BytesMut::new(),
            scanned: 0,
            _record: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> RecordDecoder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk to the buffer without decoding anything.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Append a chunk and iterate over every record it completes.
    ///
    /// Records left unread in the iterator stay buffered and are returned by
    /// later calls.
    pub fn decode(&mut self, chunk: &[u8]) -> Records<'_, T> {
        self.push(chunk);
        Records { decoder: self }
    }

    /// Take the next complete record out of the buffer.
    ///
    /// Returns `None` once the buffer holds no further delimiter. Blank
    /// records (consecutive delimiters or whitespace-only lines) are skipped.
    /// A payload that is not valid JSON yields
    /// [`ClientError::MalformedRecord`]; it is consumed either way, so the
    /// caller may keep decoding after it.
    pub fn next_record(&mut self) -> Option<Result<T, ClientError>> {
        loop {
            let Some(offset) = self.buffer[self.scanned..]
                .iter()
                .position(|&byte| byte == DELIMITER)
            else {
                self.scanned = self.buffer.len();
                return None;
            };

            let line = self.buffer.split_to(self.scanned + offset + 1);
            self.scanned = 0;

            let payload = line[..line.len() - 1].trim_ascii();
            if payload.is_empty() {
                continue;
            }

            tracing::trace!(len = payload.len(), "record complete");
            return Some(
                serde_json::from_slice(payload)
                    .map_err(|e| ClientError::malformed_record(e, payload)),
            );
        }
    }

    /// Number of buffered bytes not yet part of an emitted record.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffer holds the start of a record.
    pub fn has_partial(&self) -> bool {
        !self.buffer[..].trim_ascii().is_empty()
    }

    /// End the decode session.
    ///
    /// Call once the transport is exhausted and [`next_record`](Self::next_record)
    /// has returned `None`. Leftover non-whitespace bytes are an unterminated
    /// record and yield [`ClientError::TruncatedStream`]; they are discarded,
    /// never decoded.
    pub fn finish(&mut self) -> Result<(), ClientError> {
        let truncated = self.has_partial();
        let buffered = self.buffer.len();
        self.buffer.clear();
        self.scanned = 0;

        if truncated {
            Err(ClientError::TruncatedStream { buffered })
        } else {
            Ok(())
        }
    }
}

/// Iterator over the records completed by one [`RecordDecoder::decode`] call.
#[derive(Debug)]
pub struct Records<'a, T> {
    decoder: &'a mut RecordDecoder<T>,
}

impl<T: DeserializeOwned> Iterator for Records<'_, T> {
    type Item = Result<T, ClientError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decoder.next_record()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde::Deserialize;
    use serde_json::json;

    fn decode_all(decoder: &mut RecordDecoder, chunk: &[u8]) -> Vec<Value> {
        decoder
            .decode(chunk)
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_two_records_in_one_chunk() {
        let mut decoder = RecordDecoder::new();
        let records = decode_all(&mut decoder, b"{\"a\":1}\n{\"b\":2}\n");
        assert_eq!(records, vec![json!({"a": 1}), json!({"b": 2})]);
        assert_eq!(decoder.buffered(), 0);
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn test_record_split_across_three_chunks() {
        let mut decoder = RecordDecoder::new();
        assert!(decode_all(&mut decoder, b"{\"a\":1").is_empty());
        assert!(decode_all(&mut decoder, b"2,\"b\":3}").is_empty());
        assert_eq!(decode_all(&mut decoder, b"\n"), vec![json!({"a": 12, "b": 3})]);
    }

    #[test]
    fn test_second_record_started_in_earlier_chunk() {
        let mut decoder = RecordDecoder::new();
        assert_eq!(decode_all(&mut decoder, b"{\"a\":1}\n{\"b\""), vec![json!({"a": 1})]);
        assert_eq!(
            decode_all(&mut decoder, b":2}\n{\"c\":3}\n{"),
            vec![json!({"b": 2}), json!({"c": 3})]
        );
        assert_eq!(decoder.buffered(), 1);
    }

    #[test]
    fn test_empty_chunk() {
        let mut decoder = RecordDecoder::new();
        assert!(decode_all(&mut decoder, b"").is_empty());
        assert_eq!(decoder.buffered(), 0);
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn test_delimiter_only_chunks() {
        let mut decoder = RecordDecoder::new();
        assert!(decode_all(&mut decoder, b"\n").is_empty());
        assert!(decode_all(&mut decoder, b"\n\n\r\n  \n").is_empty());
        assert_eq!(
            decode_all(&mut decoder, b"{\"a\":1}\n\n\n{\"b\":2}\n"),
            vec![json!({"a": 1}), json!({"b": 2})]
        );
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn test_surrounding_whitespace_is_stripped() {
        let mut decoder = RecordDecoder::new();
        assert_eq!(decode_all(&mut decoder, b"  {\"a\":1} \r\n"), vec![json!({"a": 1})]);
    }

    #[test]
    fn test_large_record_accumulates() {
        let text = "x".repeat(64 * 1024);
        let payload = serde_json::to_vec(&json!({ "text": text })).unwrap();

        let mut decoder = RecordDecoder::new();
        for piece in payload.chunks(7) {
            assert!(decode_all(&mut decoder, piece).is_empty());
        }
        assert_eq!(decoder.buffered(), payload.len());

        let records = decode_all(&mut decoder, b"\n");
        assert_eq!(records, vec![json!({ "text": text })]);
    }

    #[test]
    fn test_malformed_record_does_not_poison_decoder() {
        let mut decoder = RecordDecoder::<Value>::new();
        let mut records = decoder.decode(b"{\"a\":\n{\"b\":2}\n");

        let first = records.next().unwrap();
        assert!(matches!(first, Err(ClientError::MalformedRecord { .. })));
        assert_eq!(records.next().unwrap().unwrap(), json!({"b": 2}));
        assert!(records.next().is_none());
    }

    #[test]
    fn test_finish_with_unterminated_record() {
        let mut decoder = RecordDecoder::<Value>::new();
        assert!(decoder.decode(b"{\"a\":1}\n{\"b\":2}").next().is_some());
        assert!(decoder.has_partial());

        match decoder.finish() {
            Err(ClientError::TruncatedStream { buffered }) => assert_eq!(buffered, 7),
            other => panic!("expected truncated stream, got {:?}", other),
        }
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_finish_with_trailing_whitespace() {
        let mut decoder = RecordDecoder::<Value>::new();
        assert!(decoder.decode(b"{\"a\":1}\n  \r").next().is_some());
        assert!(!decoder.has_partial());
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn test_typed_records() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Tick {
            n: u32,
        }

        let mut decoder = RecordDecoder::<Tick>::new();
        let ticks: Vec<Tick> = decoder
            .decode(b"{\"n\":1}\n{\"n\":2}\n")
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(ticks, vec![Tick { n: 1 }, Tick { n: 2 }]);
    }

    #[test]
    fn test_unread_records_stay_buffered() {
        let mut decoder = RecordDecoder::<Value>::new();
        let first = decoder.decode(b"{\"a\":1}\n{\"b\":2}\n").next();
        assert_eq!(first.unwrap().unwrap(), json!({"a": 1}));

        assert_eq!(decode_all(&mut decoder, b""), vec![json!({"b": 2})]);
    }

    fn sample_stream() -> (Vec<u8>, Vec<Value>) {
        let records = vec![
            json!({"replies": [{"text": "Hel"}], "is_final_chunk": false}),
            json!({"replies": [{"text": "Hello, wörld\n"}], "is_final_chunk": false}),
            json!([1, 2, 3]),
            json!("plain string"),
            json!({"replies": [{"text": "Hello, wörld!"}], "is_final_chunk": true}),
        ];
        let mut bytes = Vec::new();
        for record in &records {
            bytes.extend(serde_json::to_vec(record).unwrap());
            bytes.push(DELIMITER);
        }
        (bytes, records)
    }

    fn decode_segmented(bytes: &[u8], cuts: &[usize]) -> Vec<Value> {
        let mut decoder = RecordDecoder::new();
        let mut records = Vec::new();
        let mut start = 0;
        for &cut in cuts.iter().chain(std::iter::once(&bytes.len())) {
            records.extend(decode_all(&mut decoder, &bytes[start..cut]));
            start = cut;
        }
        decoder.finish().unwrap();
        records
    }

    #[test]
    fn test_one_byte_per_chunk() {
        let (bytes, expected) = sample_stream();
        let cuts: Vec<usize> = (1..bytes.len()).collect();
        assert_eq!(decode_segmented(&bytes, &cuts), expected);
    }

    proptest! {
        #[test]
        fn prop_segmentation_does_not_change_records(
            cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..32)
        ) {
            let (bytes, expected) = sample_stream();
            let mut cuts: Vec<usize> = cuts.into_iter().map(|i| i.index(bytes.len() + 1)).collect();
            cuts.sort_unstable();

            prop_assert_eq!(decode_segmented(&bytes, &cuts), expected);
        }
    }
}
