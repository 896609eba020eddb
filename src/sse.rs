//! Server-Sent Events (SSE) processing for streamed replies.
//!
//! The streaming send endpoint writes one `data: <text>` event per generated
//! chunk and finishes with `data: [DONE]`.  This module turns the raw byte
//! stream into [`ReplyChunk`]s.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::error::{Error, Result};
use crate::observability::{STREAM_BYTES, STREAM_ERRORS};

/// The end-of-stream marker.
const DONE_MARKER: &str = "[DONE]";

/// One decoded event of a streamed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyChunk {
    /// A piece of assistant text.
    Delta(String),
    /// The reply is complete.
    Done,
}

/// Process a stream of bytes into a stream of reply chunks.
///
/// Bytes are buffered until a full event (terminated by a blank line) is
/// available, so multi-byte characters split across network reads decode
/// correctly.  A trailing event without a terminator is flushed when the
/// byte stream ends.
pub fn process_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<ReplyChunk>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    // Convert transport errors to our error type
    let stream = byte_stream.map(|result| {
        result.map_err(|e| {
            STREAM_ERRORS.click();
            Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e)))
        })
    });

    stream::unfold(
        (stream, Vec::<u8>::new(), false),
        move |(mut stream, mut buffer, finished)| async move {
            if finished {
                return None;
            }
            loop {
                // First check if we have a complete event in the buffer
                if let Some((event, remaining)) = split_event(&buffer) {
                    buffer = remaining;
                    match decode_event(&event) {
                        Some(chunk) => return Some((chunk, (stream, buffer, false))),
                        None => continue,
                    }
                }

                // Read more data
                match stream.next().await {
                    Some(Ok(bytes)) => {
                        STREAM_BYTES.count(bytes.len() as u64);
                        buffer.extend_from_slice(&bytes);
                    }
                    Some(Err(e)) => {
                        return Some((Err(e), (stream, buffer, true)));
                    }
                    None => {
                        // End of stream
                        if buffer.iter().all(u8::is_ascii_whitespace) {
                            return None;
                        }
                        let event = std::mem::take(&mut buffer);
                        return decode_event(&event).map(|chunk| (chunk, (stream, buffer, true)));
                    }
                }
            }
        },
    )
}

/// Split the first blank-line-terminated event off the front of `buffer`.
fn split_event(buffer: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
    let end = buffer.windows(2).position(|w| w == b"\n\n")?;
    Some((buffer[..end].to_vec(), buffer[end + 2..].to_vec()))
}

/// Decode one event.  Returns `None` for events that carry no data (comments,
/// keep-alives).
fn decode_event(event: &[u8]) -> Option<Result<ReplyChunk>> {
    let text = match std::str::from_utf8(event) {
        Ok(text) => text,
        Err(e) => {
            STREAM_ERRORS.click();
            return Some(Err(Error::encoding(
                format!("Invalid UTF-8 in stream: {e}"),
                Some(Box::new(e)),
            )));
        }
    };

    let mut data: Option<String> = None;
    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let payload = if let Some(rest) = line.strip_prefix("data:") {
            rest.strip_prefix(' ').unwrap_or(rest)
        } else if line.starts_with(':')
            || line.starts_with("event:")
            || line.starts_with("id:")
            || line.starts_with("retry:")
        {
            continue;
        } else if data.is_some() {
            // The server writes chunks verbatim, so a chunk containing a
            // newline continues on an unprefixed line.
            line
        } else {
            continue;
        };
        match data.as_mut() {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(payload);
            }
            None => data = Some(payload.to_string()),
        }
    }

    let data = data?;
    if data == DONE_MARKER {
        Some(Ok(ReplyChunk::Done))
    } else {
        Some(Ok(ReplyChunk::Delta(data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::io;

    fn chunks(
        parts: &[&'static [u8]],
    ) -> impl Stream<Item = std::result::Result<Bytes, io::Error>> + Unpin + Send + use<> {
        stream::iter(
            parts
                .iter()
                .map(|part| Ok(Bytes::from_static(part)))
                .collect::<Vec<_>>(),
        )
    }

    async fn collect(parts: &[&'static [u8]]) -> Vec<Result<ReplyChunk>> {
        process_sse(chunks(parts)).collect().await
    }

    #[tokio::test]
    async fn parse_deltas_and_done() {
        let events = collect(&[b"data: Start with \n\ndata: a budget.\n\ndata: [DONE]\n\n"]).await;
        let events: Vec<ReplyChunk> = events.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(
            events,
            vec![
                ReplyChunk::Delta("Start with ".to_string()),
                ReplyChunk::Delta("a budget.".to_string()),
                ReplyChunk::Done,
            ]
        );
    }

    #[tokio::test]
    async fn handle_split_event() {
        // Simulate an event split across multiple chunks
        let events = collect(&[b"da", b"ta: TF", b"SA\n", b"\n"]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].as_ref().unwrap(),
            &ReplyChunk::Delta("TFSA".to_string())
        );
    }

    #[tokio::test]
    async fn handle_split_utf8() {
        let events = collect(&[b"data: caf\xc3", b"\xa9\n\n"]).await;
        assert_eq!(
            events[0].as_ref().unwrap(),
            &ReplyChunk::Delta("caf\u{e9}".to_string())
        );
    }

    #[tokio::test]
    async fn unprefixed_line_continues_data() {
        let events = collect(&[b"data: line one\nline two\n\n"]).await;
        assert_eq!(
            events[0].as_ref().unwrap(),
            &ReplyChunk::Delta("line one\nline two".to_string())
        );
    }

    #[tokio::test]
    async fn skips_comments_and_flushes_trailing_event() {
        let events = collect(&[b": keep-alive\n\ndata: tail"]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].as_ref().unwrap(),
            &ReplyChunk::Delta("tail".to_string())
        );
    }

    #[tokio::test]
    async fn invalid_utf8_is_an_error() {
        let events = collect(&[b"data: \xff\xfe\n\n"]).await;
        assert!(events[0].is_err());
    }

    #[tokio::test]
    async fn transport_error_ends_stream() {
        let parts: Vec<std::result::Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"data: partial\n\n")),
            Err(io::Error::other("reset")),
            Ok(Bytes::from_static(b"data: never\n\n")),
        ];
        let events: Vec<_> = process_sse(stream::iter(parts)).collect().await;
        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        assert!(matches!(events[1], Err(Error::Streaming { .. })));
    }
}
