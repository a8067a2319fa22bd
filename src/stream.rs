//! Drives a [`RecordDecoder`] over an asynchronous chunk stream.
//!
//! Records are yielded as soon as the chunk completing them arrives; the
//! only suspension point is the wait for the next chunk.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::pin::Pin;

use crate::client::ClientError;
use crate::decoder::RecordDecoder;

/// What to do with a record whose payload is not valid JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MalformedPolicy {
    /// Yield the error and end the stream. A bad record usually means the
    /// framing is out of sync.
    #[default]
    Abort,
    /// Log the error and keep decoding the following records.
    Skip,
}

/// Extension trait turning a stream of byte chunks into a stream of records.
///
/// # Example
/// ```
/// use bytes::Bytes;
/// use charai::stream::{MalformedPolicy, RecordStreamExt};
/// use futures::{stream, StreamExt};
/// use serde_json::Value;
///
/// # futures::executor::block_on(async {
/// let chunks = stream::iter(vec![
///     Ok(Bytes::from_static(b"{\"a\":1}\n{\"b\"")),
///     Ok(Bytes::from_static(b":2}\n")),
/// ]);
///
/// let records: Vec<Value> = chunks
///     .records(MalformedPolicy::Abort)
///     .map(|r| r.unwrap())
///     .collect()
///     .await;
/// assert_eq!(records.len(), 2);
/// # });
/// ```
pub trait RecordStreamExt: Stream<Item = Result<Bytes, ClientError>> + Send + Sized + 'static {
    /// Decode the chunks as newline-delimited JSON records.
    ///
    /// A transport error is yielded once and ends the stream, as does a
    /// malformed record under [`MalformedPolicy::Abort`]. If the chunks end
    /// inside a record, [`ClientError::TruncatedStream`] is the final item.
    /// Dropping the returned stream drops the chunk source with it.
    fn records<T>(self, policy: MalformedPolicy) -> impl Stream<Item = Result<T, ClientError>> + Send
    where
        T: DeserializeOwned + Send + 'static,
    {
        decode_records(self, policy)
    }
}

impl<S> RecordStreamExt for S where S: Stream<Item = Result<Bytes, ClientError>> + Send + 'static {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Reading,
    SourceEnded,
    Done,
}

struct DecodeState<S, T> {
    chunks: Pin<Box<S>>,
    decoder: RecordDecoder<T>,
    policy: MalformedPolicy,
    phase: Phase,
}

fn decode_records<S, T>(chunks: S, policy: MalformedPolicy) -> impl Stream<Item = Result<T, ClientError>> + Send
where
    S: Stream<Item = Result<Bytes, ClientError>> + Send + 'static,
    T: DeserializeOwned + Send + 'static,
{
    let state = DecodeState {
        chunks: Box::pin(chunks),
        decoder: RecordDecoder::<T>::new(),
        policy,
        phase: Phase::Reading,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.phase == Phase::Done {
                return None;
            }

            // Hand out everything already complete before waiting on the transport
            match state.decoder.next_record() {
                Some(Ok(record)) => return Some((Ok(record), state)),
                Some(Err(e)) => match state.policy {
                    MalformedPolicy::Abort => {
                        state.phase = Phase::Done;
                        return Some((Err(e), state));
                    }
                    MalformedPolicy::Skip => {
                        tracing::warn!(error = %e, "skipping malformed record");
                        continue;
                    }
                },
                None => {}
            }

            if state.phase == Phase::SourceEnded {
                state.phase = Phase::Done;
                return match state.decoder.finish() {
                    Ok(()) => None,
                    Err(e) => {
                        tracing::warn!(error = %e, "stream ended inside a record");
                        Some((Err(e), state))
                    }
                };
            }

            match state.chunks.next().await {
                Some(Ok(chunk)) => {
                    tracing::trace!(len = chunk.len(), buffered = state.decoder.buffered(), "chunk");
                    state.decoder.push(&chunk);
                }
                Some(Err(e)) => {
                    state.phase = Phase::Done;
                    return Some((Err(e), state));
                }
                None => state.phase = Phase::SourceEnded,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use futures::FutureExt;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, ClientError>> + Send + 'static {
        let parts: Vec<_> = parts.iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))).collect();
        stream::iter(parts)
    }

    #[tokio::test]
    async fn test_records_across_chunks() {
        let records: Vec<Result<Value, ClientError>> = chunks(&["{\"a\":1}\n{\"b\"", ":2}\n", "", "\n\n{\"c\":3}\n"])
            .records(MalformedPolicy::Abort)
            .collect()
            .await;

        let records: Vec<Value> = records.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(records, vec![json!({"a": 1}), json!({"b": 2}), json!({"c": 3})]);
    }

    #[tokio::test]
    async fn test_nothing_emitted_before_delimiter_arrives() {
        let (tx, rx) = mpsc::unbounded::<Result<Bytes, ClientError>>();
        let mut records = Box::pin(rx.records::<Value>(MalformedPolicy::Abort));

        tx.unbounded_send(Ok(Bytes::from_static(b"{\"a\":1"))).unwrap();
        assert!(records.next().now_or_never().is_none());

        tx.unbounded_send(Ok(Bytes::from_static(b"2,\"b\":3}"))).unwrap();
        assert!(records.next().now_or_never().is_none());

        tx.unbounded_send(Ok(Bytes::from_static(b"\n"))).unwrap();
        let record = records.next().await.unwrap().unwrap();
        assert_eq!(record, json!({"a": 12, "b": 3}));

        drop(tx);
        assert!(records.next().await.is_none());
    }

    #[tokio::test]
    async fn test_truncated_stream_is_surfaced() {
        let mut records = Box::pin(chunks(&["{\"a\":1}\n", "{\"b\":"]).records::<Value>(MalformedPolicy::Abort));

        assert_eq!(records.next().await.unwrap().unwrap(), json!({"a": 1}));
        match records.next().await {
            Some(Err(ClientError::TruncatedStream { buffered })) => assert_eq!(buffered, 5),
            other => panic!("expected truncated stream, got {:?}", other),
        }
        assert!(records.next().await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_record_aborts_by_default() {
        let records: Vec<Result<Value, ClientError>> = chunks(&["{\"a\":1}\nnot json\n{\"b\":2}\n"])
            .records(MalformedPolicy::Abort)
            .collect()
            .await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].as_ref().unwrap(), &json!({"a": 1}));
        assert!(matches!(records[1], Err(ClientError::MalformedRecord { .. })));
    }

    #[test_log::test(tokio::test)]
    async fn test_malformed_record_skipped_on_request() {
        let records: Vec<Result<Value, ClientError>> = chunks(&["{\"a\":1}\nnot json\n{\"b\":2}\n"])
            .records(MalformedPolicy::Skip)
            .collect()
            .await;

        let records: Vec<Value> = records.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(records, vec![json!({"a": 1}), json!({"b": 2})]);
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let parts = vec![
            Ok(Bytes::from_static(b"{\"a\":1}\n{\"b")),
            Err(ClientError::Config("connection reset".to_string())),
            Ok(Bytes::from_static(b"\":2}\n")),
        ];
        let records: Vec<Result<Value, ClientError>> =
            stream::iter(parts).records(MalformedPolicy::Skip).collect().await;

        assert_eq!(records.len(), 2);
        assert!(records[0].is_ok());
        assert!(matches!(records[1], Err(ClientError::Config(_))));
    }

    struct DropFlag<S> {
        inner: S,
        dropped: Arc<AtomicBool>,
    }

    impl<S: Stream + Unpin> Stream for DropFlag<S> {
        type Item = S::Item;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            Pin::new(&mut self.inner).poll_next(cx)
        }
    }

    impl<S> Drop for DropFlag<S> {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_dropping_records_closes_source() {
        let dropped = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded::<Result<Bytes, ClientError>>();
        let source = DropFlag {
            inner: rx,
            dropped: dropped.clone(),
        };

        let mut records = Box::pin(source.records::<Value>(MalformedPolicy::Abort));
        tx.unbounded_send(Ok(Bytes::from_static(b"{\"a\":1}\n{\"partial\""))).unwrap();
        assert!(records.next().await.unwrap().is_ok());
        assert!(!dropped.load(Ordering::SeqCst));

        drop(records);
        assert!(dropped.load(Ordering::SeqCst));
        assert!(tx.is_closed());
    }
}
