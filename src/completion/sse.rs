//! Text delta stream over the Messages API server-sent events
//!
//! Raw bytes are first regrouped into whole frames so a frame that is not
//! UTF-8 can be dropped on its own; `eventsource-stream` then parses the
//! `event:`/`data:` lines. On top of it this module yields only the text
//! deltas, ends at the terminal `message_stop` frame without waiting for
//! transport EOF, and skips frames it cannot make sense of.

use std::fmt;
use std::pin::Pin;

use eventsource_stream::{EventStreamError, Eventsource};
use futures::stream::{self, Stream, StreamExt};

use super::types::{ApiErrorResponse, Delta, StreamPayload};
use crate::{Error, Result};

/// Lazy, finite, non-restartable sequence of text deltas
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// What a single frame means to the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Text to append
    Delta(String),
    /// End of message
    Stop,
    /// Provider reported an error mid-stream
    Failure(String),
    /// Nothing useful (ping, block boundaries, sentinel, malformed)
    Skip,
}

/// Classify one SSE frame by its event type and data
#[must_use]
pub fn classify_frame(event_type: &str, data: &str) -> Frame {
    if event_type == "message_stop" {
        return Frame::Stop;
    }

    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Frame::Skip;
    }

    if event_type == "error" {
        return serde_json::from_str::<ApiErrorResponse>(data).map_or_else(
            |_| Frame::Failure(data.to_string()),
            |e| Frame::Failure(e.error.summary()),
        );
    }

    match serde_json::from_str::<StreamPayload>(data) {
        Ok(StreamPayload::ContentBlockDelta {
            delta: Delta::TextDelta { text },
        }) if !text.is_empty() => Frame::Delta(text),
        Ok(StreamPayload::MessageStop) => Frame::Stop,
        Ok(StreamPayload::Error { error }) => Frame::Failure(error.summary()),
        Ok(_) => Frame::Skip,
        Err(e) => {
            tracing::debug!(event_type, error = %e, "skipping malformed stream frame");
            Frame::Skip
        }
    }
}

/// Frame separators, in the line-ending styles SSE allows
const FRAME_SEPARATORS: [&[u8]; 3] = [b"\r\n\r\n", b"\n\n", b"\r\r"];

/// End offset (separator included) of the first complete frame in `buf`
fn frame_end(buf: &[u8]) -> Option<usize> {
    FRAME_SEPARATORS
        .iter()
        .filter_map(|sep| {
            buf.windows(sep.len())
                .position(|w| w == *sep)
                .map(|i| i + sep.len())
        })
        .min()
}

struct FrameSplitter<S> {
    bytes: Pin<Box<S>>,
    buf: Vec<u8>,
    done: bool,
}

/// Regroup arbitrary chunks into whole frames, dropping frames that are not UTF-8
fn utf8_frames<S, B, E>(bytes: S) -> impl Stream<Item = std::result::Result<Vec<u8>, E>> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Send + 'static,
{
    let splitter = FrameSplitter {
        bytes: Box::pin(bytes),
        buf: Vec::new(),
        done: false,
    };

    stream::unfold(splitter, |mut s| async move {
        loop {
            let frame = match frame_end(&s.buf) {
                Some(end) => s.buf.drain(..end).collect::<Vec<u8>>(),
                None if s.done && s.buf.is_empty() => return None,
                None if s.done => std::mem::take(&mut s.buf),
                None => {
                    match s.bytes.next().await {
                        Some(Ok(chunk)) => s.buf.extend_from_slice(chunk.as_ref()),
                        Some(Err(e)) => {
                            s.done = true;
                            s.buf.clear();
                            return Some((Err(e), s));
                        }
                        None => s.done = true,
                    }
                    continue;
                }
            };

            if std::str::from_utf8(&frame).is_ok() {
                return Some((Ok(frame), s));
            }
            tracing::debug!(len = frame.len(), "skipping stream frame that is not UTF-8");
        }
    })
}

/// Turn a response byte stream into a stream of text deltas
///
/// Transport errors, provider `error` frames and unparseable framing end the
/// stream with an `Err`. Frames that are not UTF-8 or not understood are
/// skipped.
pub fn text_deltas<S, B, E>(bytes: S) -> DeltaStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let events = Box::pin(utf8_frames(bytes).eventsource());

    Box::pin(stream::unfold(Some(events), |state| async move {
        let mut events = state?;
        loop {
            match events.next().await {
                None => return None,
                Some(Err(EventStreamError::Transport(e))) => {
                    return Some((
                        Err(Error::Upstream {
                            service: "anthropic",
                            status: 0,
                            body: format!("stream transport error: {e}"),
                        }),
                        None,
                    ));
                }
                Some(Err(e)) => {
                    return Some((
                        Err(Error::Upstream {
                            service: "anthropic",
                            status: 0,
                            body: format!("undecodable event stream: {e}"),
                        }),
                        None,
                    ));
                }
                Some(Ok(event)) => match classify_frame(&event.event, &event.data) {
                    Frame::Delta(text) => return Some((Ok(text), Some(events))),
                    Frame::Stop => return None,
                    Frame::Failure(message) => {
                        return Some((
                            Err(Error::Upstream {
                                service: "anthropic",
                                status: 0,
                                body: message,
                            }),
                            None,
                        ));
                    }
                    Frame::Skip => {}
                },
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;

    /// Feed raw SSE text split into arbitrary chunks
    fn chunked(chunks: &[&str]) -> DeltaStream {
        let owned: Vec<std::result::Result<Vec<u8>, Infallible>> = chunks
            .iter()
            .map(|c| Ok(c.as_bytes().to_vec()))
            .collect();
        text_deltas(stream::iter(owned))
    }

    fn raw_chunks(chunks: Vec<Vec<u8>>) -> DeltaStream {
        let owned: Vec<std::result::Result<Vec<u8>, Infallible>> =
            chunks.into_iter().map(Ok).collect();
        text_deltas(stream::iter(owned))
    }

    async fn collect(mut deltas: DeltaStream) -> Vec<Result<String>> {
        let mut out = Vec::new();
        while let Some(item) = deltas.next().await {
            out.push(item);
        }
        out
    }

    fn delta(text: &str) -> String {
        format!(
            "event: content_block_delta\ndata: {{\"type\":\"content_block_delta\",\"index\":0,\"delta\":{{\"type\":\"text_delta\",\"text\":\"{text}\"}}}}\n\n"
        )
    }

    #[test]
    fn test_classify_frames() {
        assert_eq!(classify_frame("message_stop", "{}"), Frame::Stop);
        assert_eq!(classify_frame("ping", "{\"type\":\"ping\"}"), Frame::Skip);
        assert_eq!(classify_frame("message", "[DONE]"), Frame::Skip);
        assert_eq!(classify_frame("content_block_delta", "{not json"), Frame::Skip);
        assert_eq!(
            classify_frame(
                "content_block_delta",
                r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{"}}"#
            ),
            Frame::Skip
        );
        assert_eq!(
            classify_frame(
                "error",
                r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#
            ),
            Frame::Failure("overloaded_error: Overloaded".to_string())
        );
    }

    #[tokio::test]
    async fn test_deltas_across_chunk_boundaries() {
        let body = format!(
            "event: message_start\ndata: {{\"type\":\"message_start\",\"message\":{{}}}}\n\n{}{}event: message_stop\ndata: {{\"type\":\"message_stop\"}}\n\n",
            delta("Hel"),
            delta("lo!")
        );
        // Split at awkward offsets, including inside a frame and between the two newlines
        let (a, rest) = body.split_at(17);
        let (b, rest) = rest.split_at(60);
        let sep = rest.find("\n\n").unwrap() + 1;
        let (c, d) = rest.split_at(sep);

        let out = collect(chunked(&[a, b, c, d])).await;
        let texts: Vec<String> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(texts, vec!["Hel", "lo!"]);
    }

    #[tokio::test]
    async fn test_stop_frame_ends_stream_early() {
        let body = format!(
            "{}event: message_stop\ndata: {{\"type\":\"message_stop\"}}\n\n{}",
            delta("kept"),
            delta("ignored")
        );
        let out = collect(chunked(&[&body])).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap(), "kept");
    }

    #[tokio::test]
    async fn test_malformed_frames_skipped() {
        let body = format!(
            "event: content_block_delta\ndata: {{broken\n\ndata: [DONE]\n\n{}: comment line\n\n",
            delta("ok")
        );
        let out = collect(chunked(&[&body])).await;
        let texts: Vec<String> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(texts, vec!["ok"]);
    }

    #[tokio::test]
    async fn test_error_frame_fails_stream() {
        let body = format!(
            "{}event: error\ndata: {{\"type\":\"error\",\"error\":{{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}}}\n\n{}",
            delta("partial"),
            delta("never")
        );
        let out = collect(chunked(&[&body])).await;
        assert_eq!(out.len(), 2);
        assert!(out[0].is_ok());
        assert!(matches!(&out[1], Err(Error::Upstream { body, .. }) if body.contains("overloaded_error")));
    }

    #[tokio::test]
    async fn test_non_utf8_frame_skipped_and_stream_continues() {
        let bad = b"event: content_block_delta\ndata: \xff\xfe\n\n".to_vec();
        let stop = b"event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n".to_vec();
        let parts = vec![delta("a").into_bytes(), bad, delta("b").into_bytes(), stop];

        let separate = collect(raw_chunks(parts.clone())).await;
        let texts: Vec<String> = separate.into_iter().map(Result::unwrap).collect();
        assert_eq!(texts, vec!["a", "b"]);

        let joined = collect(raw_chunks(vec![parts.concat()])).await;
        let texts: Vec<String> = joined.into_iter().map(Result::unwrap).collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_multibyte_char_split_across_chunks() {
        let body = delta("héllo").into_bytes();
        let split = body.iter().position(|b| *b == 0xc3).unwrap() + 1;
        let out = collect(raw_chunks(vec![
            body[..split].to_vec(),
            body[split..].to_vec(),
        ]))
        .await;
        let texts: Vec<String> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(texts, vec!["héllo"]);
    }

    #[test]
    fn test_frame_end_line_styles() {
        assert_eq!(frame_end(b"data: x\n\nrest"), Some(9));
        assert_eq!(frame_end(b"data: x\r\n\r\nrest"), Some(11));
        assert_eq!(frame_end(b"data: x\n"), None);
    }

    #[tokio::test]
    async fn test_eof_without_stop_ends_stream() {
        let out = collect(chunked(&[&delta("a"), &delta("b")])).await;
        assert_eq!(out.len(), 2);
    }
}
