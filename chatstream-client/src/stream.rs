//! Pull-based delta sequence over a chunked response body.

use std::{
    fmt,
    pin::Pin,
    task::{Context, Poll},
};

use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    error::{BoxError, ChatClientError, ChatResult},
    frame::{FrameDecoder, StreamFrame},
};

type BoxDeltaStream = Pin<Box<dyn Stream<Item = ChatResult<String>> + Send + 'static>>;

/// Lazy, ordered sequence of reply fragments for one request.
///
/// Yields `Ok(delta)` per well-formed frame, in receipt order, and ends after
/// the `[DONE]` sentinel or the end of the body. A failure is yielded at most
/// once and is always the last item.
///
/// The response body is owned by the stream and released as soon as the
/// stream ends, is cancelled, or is dropped.
#[must_use = "streams do nothing unless polled"]
pub struct DeltaStream {
    inner: Option<BoxDeltaStream>,
    cancel: CancellationToken,
}

impl DeltaStream {
    pub(crate) fn new<S>(inner: S, cancel: CancellationToken) -> Self
    where
        S: Stream<Item = ChatResult<String>> + Send + 'static,
    {
        Self {
            inner: Some(Box::pin(inner)),
            cancel,
        }
    }

    /// Stops the stream now. Fragments decoded but not yet pulled are
    /// discarded and the response body is dropped.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.inner = None;
    }

    /// Token that stops this stream from elsewhere, e.g. a Ctrl+C handler.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// `true` once the stream has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drains the stream and concatenates every fragment.
    ///
    /// # Errors
    /// Returns the first request or transport failure; fragments received
    /// before it are lost to the caller in this form.
    pub async fn collect_text(mut self) -> ChatResult<String> {
        let mut text = String::new();
        while let Some(delta) = self.next().await {
            text.push_str(&delta?);
        }
        Ok(text)
    }
}

impl Stream for DeltaStream {
    type Item = ChatResult<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancel.is_cancelled() {
            self.inner = None;
        }
        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(None);
        };
        let item = inner.as_mut().poll_next(cx);
        if let Poll::Ready(None) = item {
            self.inner = None;
        }
        item
    }
}

impl fmt::Debug for DeltaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeltaStream")
            .field("active", &self.inner.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

enum Step<B, E> {
    Cancelled,
    Chunk(B),
    Failed(E),
    End,
}

/// Decodes a chunked body into content deltas.
///
/// `body` is any stream of byte chunks, such as `reqwest::Response::bytes_stream`.
/// Chunk boundaries may fall anywhere, including inside a line or a
/// multi-byte character. Malformed frames are logged and skipped. A body
/// error is yielded as [`ChatClientError::Transport`] and ends the stream.
pub fn decode_deltas<S, B, E>(body: S, cancel: CancellationToken) -> DeltaStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    let token = cancel.clone();
    let deltas = async_stream::stream! {
        futures_util::pin_mut!(body);
        let mut decoder = FrameDecoder::new();

        loop {
            let step = tokio::select! {
                biased;
                () = token.cancelled() => Step::Cancelled,
                chunk = body.next() => match chunk {
                    Some(Ok(bytes)) => Step::Chunk(bytes),
                    Some(Err(err)) => Step::Failed(err),
                    None => Step::End,
                },
            };

            let at_end = matches!(step, Step::End);
            let frames = match step {
                Step::Cancelled => {
                    debug!("chat stream cancelled by caller");
                    return;
                }
                Step::Failed(err) => {
                    let err = ChatClientError::transport(err);
                    warn!(error = %err, "chat stream failed mid-response");
                    yield Err(err);
                    return;
                }
                Step::Chunk(bytes) => decoder.push(bytes.as_ref()),
                Step::End => decoder.finish(),
            };

            for frame in frames {
                match frame {
                    StreamFrame::Delta(content) => {
                        if token.is_cancelled() {
                            return;
                        }
                        yield Ok(content);
                    }
                    StreamFrame::Done => {
                        debug!("chat stream reached end-of-stream sentinel");
                        return;
                    }
                    StreamFrame::Malformed { payload, error } => {
                        warn!(%error, %payload, "skipping malformed stream frame");
                    }
                    StreamFrame::Ignored => {}
                }
            }

            if at_end {
                debug!("chat stream ended without sentinel");
                return;
            }
        }
    };

    DeltaStream::new(deltas, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::{
        io,
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
    };

    type Chunk = Result<Vec<u8>, io::Error>;

    /// Body wrapper that records when the decoder lets go of it.
    struct ReleaseFlag<S> {
        inner: Pin<Box<S>>,
        released: Arc<AtomicBool>,
    }

    impl<S: Stream> Stream for ReleaseFlag<S> {
        type Item = S::Item;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<S::Item>> {
            self.inner.as_mut().poll_next(cx)
        }
    }

    impl<S> Drop for ReleaseFlag<S> {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    fn tracked<S: Stream>(inner: S) -> (ReleaseFlag<S>, Arc<AtomicBool>) {
        let released = Arc::new(AtomicBool::new(false));
        let body = ReleaseFlag {
            inner: Box::pin(inner),
            released: released.clone(),
        };
        (body, released)
    }

    fn chunks(parts: &[&[u8]]) -> Vec<Chunk> {
        parts.iter().map(|part| Ok(part.to_vec())).collect()
    }

    async fn collect(mut deltas: DeltaStream) -> (Vec<String>, Option<ChatClientError>) {
        let mut out = Vec::new();
        while let Some(item) = deltas.next().await {
            match item {
                Ok(delta) => out.push(delta),
                Err(err) => return (out, Some(err)),
            }
        }
        (out, None)
    }

    #[tokio::test]
    async fn example_split_frame_yields_hello() {
        let body = stream::iter(chunks(&[
            br#"data: {"content":"Hel"#,
            b"lo\"}\n",
            b"data: [DONE]\n",
        ]));

        let (deltas, error) = collect(decode_deltas(body, CancellationToken::new())).await;

        assert_eq!(deltas, vec!["Hello"]);
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn sentinel_stops_before_trailing_frames_and_further_reads() {
        let tail = stream::iter(chunks(&[b"data: {\"content\":\"never read\"}\n"]));
        let body = stream::iter(chunks(&[
            b"data: {\"content\":\"a\"}\ndata: {\"content\":\"b\"}\ndata: [DONE]\ndata: {\"content\":\"c\"}\n",
        ]))
        .chain(tail)
        .chain(stream::once(async { Err(io::Error::other("must not be read")) }));

        let (deltas, error) = collect(decode_deltas(body, CancellationToken::new())).await;

        assert_eq!(deltas, vec!["a", "b"]);
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn end_of_body_without_sentinel_is_normal() {
        let body = stream::iter(chunks(&[
            b"data: {\"content\":\"a\"}\n",
            b"data: {\"content\":\"b\"}\n",
        ]));

        let (deltas, error) = collect(decode_deltas(body, CancellationToken::new())).await;

        assert_eq!(deltas, vec!["a", "b"]);
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn malformed_frame_is_skipped() {
        let body = stream::iter(chunks(&[
            b"data: {\"content\":\"one\"}\ndata: {not json\ndata: {\"content\":\"two\"}\n",
        ]));

        let (deltas, error) = collect(decode_deltas(body, CancellationToken::new())).await;

        assert_eq!(deltas, vec!["one", "two"]);
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn split_multibyte_character_decodes_once() {
        let frame = "data: {\"content\":\"naïve 🦀\"}\n".as_bytes();
        let crab_start = frame
            .windows(4)
            .position(|window| window == "🦀".as_bytes())
            .unwrap();
        let body = stream::iter(vec![
            Ok::<_, io::Error>(frame[..crab_start + 2].to_vec()),
            Ok(frame[crab_start + 2..].to_vec()),
        ]);

        let (deltas, _) = collect(decode_deltas(body, CancellationToken::new())).await;

        assert_eq!(deltas, vec!["naïve 🦀"]);
    }

    #[tokio::test]
    async fn mid_stream_failure_keeps_earlier_fragments() {
        let body = stream::iter(vec![
            Ok(b"data: {\"content\":\"partial \"}\n".to_vec()),
            Ok(b"data: {\"content\":\"reply\"}\ndata: {\"con".to_vec()),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset")),
        ]);

        let mut deltas = decode_deltas(body, CancellationToken::new());
        let mut received = Vec::new();
        let mut failure = None;
        while let Some(item) = deltas.next().await {
            match item {
                Ok(delta) => received.push(delta),
                Err(err) => failure = Some(err),
            }
        }

        assert_eq!(received, vec!["partial ", "reply"]);
        assert!(failure.is_some_and(|err| err.is_transport()));
        assert!(deltas.next().await.is_none());
    }

    #[tokio::test]
    async fn cancel_discards_queued_fragments() {
        let body = stream::iter(chunks(&[
            b"data: {\"content\":\"1\"}\ndata: {\"content\":\"2\"}\ndata: {\"content\":\"3\"}\n",
        ]))
        .chain(stream::pending());

        let mut deltas = decode_deltas(body, CancellationToken::new());
        assert_eq!(deltas.next().await.unwrap().unwrap(), "1");

        deltas.cancel();

        assert!(deltas.is_cancelled());
        assert!(deltas.next().await.is_none());
        assert!(deltas.next().await.is_none());
    }

    #[tokio::test]
    async fn external_token_wakes_a_pending_read() {
        let body =
            stream::iter(chunks(&[b"data: {\"content\":\"first\"}\n"])).chain(stream::pending());
        let mut deltas = decode_deltas(body, CancellationToken::new());
        let token = deltas.cancel_token();

        assert_eq!(deltas.next().await.unwrap().unwrap(), "first");

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            token.cancel();
        });
        let next = tokio::time::timeout(std::time::Duration::from_secs(5), deltas.next())
            .await
            .expect("cancellation must end the pending read");

        assert!(next.is_none());
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn collect_text_concatenates_in_order() {
        let body = stream::iter(chunks(&[
            b"data: {\"content\":\"a\"}\ndata: {\"content\":\"\"}\n",
            b"data: {\"content\":\"b\"}\ndata: [DONE]\n",
        ]));

        let text = decode_deltas(body, CancellationToken::new())
            .collect_text()
            .await
            .unwrap();

        assert_eq!(text, "ab");
    }

    #[tokio::test]
    async fn body_is_released_after_sentinel() {
        let (body, released) = tracked(
            stream::iter(chunks(&[b"data: {\"content\":\"a\"}\ndata: [DONE]\n"]))
                .chain(stream::pending()),
        );
        let mut deltas = decode_deltas(body, CancellationToken::new());

        assert_eq!(deltas.next().await.unwrap().unwrap(), "a");
        assert!(deltas.next().await.is_none());
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn body_is_released_at_end_of_body() {
        let (body, released) = tracked(stream::iter(chunks(&[b"data: {\"content\":\"a\"}\n"])));
        let mut deltas = decode_deltas(body, CancellationToken::new());

        assert_eq!(deltas.next().await.unwrap().unwrap(), "a");
        assert!(deltas.next().await.is_none());
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn body_is_released_on_cancel_without_another_poll() {
        let (body, released) = tracked(
            stream::iter(chunks(&[b"data: {\"content\":\"a\"}\n"])).chain(stream::pending()),
        );
        let mut deltas = decode_deltas(body, CancellationToken::new());
        assert_eq!(deltas.next().await.unwrap().unwrap(), "a");
        assert!(!released.load(Ordering::SeqCst));

        deltas.cancel();

        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn body_is_released_after_external_cancel() {
        let (body, released) = tracked(
            stream::iter(chunks(&[b"data: {\"content\":\"a\"}\n"])).chain(stream::pending()),
        );
        let token = CancellationToken::new();
        let mut deltas = decode_deltas(body, token.clone());
        assert_eq!(deltas.next().await.unwrap().unwrap(), "a");

        token.cancel();

        assert!(deltas.next().await.is_none());
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn body_is_released_after_read_failure() {
        let (body, released) = tracked(stream::iter(vec![
            Ok(b"data: {\"content\":\"a\"}\n".to_vec()),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset")),
        ]));
        let mut deltas = decode_deltas(body, CancellationToken::new());

        assert_eq!(deltas.next().await.unwrap().unwrap(), "a");
        assert!(deltas.next().await.unwrap().is_err());
        assert!(deltas.next().await.is_none());
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn body_is_released_when_stream_is_dropped() {
        let (body, released) = tracked(stream::pending::<Chunk>());
        let deltas = decode_deltas(body, CancellationToken::new());

        drop(deltas);

        assert!(released.load(Ordering::SeqCst));
    }
}
