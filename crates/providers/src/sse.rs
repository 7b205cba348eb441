//! Shared SSE streaming infrastructure for the HTTP adapter implementations.
//!
//! Every streaming adapter (STT, LLM, TTS) follows the same pattern:
//! receive a `reqwest::Response`, buffer chunks, split on `\n\n`, extract
//! `data:` payloads, and feed each payload to an adapter-specific parser.
//! This module extracts that shared logic so each adapter only supplies
//! its own parse function.

use futures_core::Stream;
use std::pin::Pin;
use voice_domain::Result;

/// Extract complete `data:` payloads from an SSE buffer.
///
/// The buffer is drained in-place: consumed bytes are removed and any
/// trailing partial event remains for the next call.
pub(crate) fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    let mut data_lines = Vec::new();

    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos).collect();
        buffer.drain(..2);

        for line in block.lines() {
            let line = line.trim();
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    data_lines.push(data.to_string());
                }
            }
        }
    }

    data_lines
}

/// Build a boxed stream from an SSE `reqwest::Response` and a parser
/// closure. The closure receives each `data:` payload and may observe a
/// cancellation predicate to stop early — the stream checks `cancelled`
/// before each yield and closes the response without draining further.
pub(crate) fn sse_response_stream<T, F>(
    response: reqwest::Response,
    mut parse_data: F,
    cancelled: impl Fn() -> bool + Send + 'static,
    on_io_error: impl Fn(reqwest::Error) -> voice_domain::Error + Send + 'static,
) -> Pin<Box<dyn Stream<Item = Result<T>> + Send + 'static>>
where
    T: Send + 'static,
    F: FnMut(&str) -> Vec<Result<T>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = String::new();

        loop {
            if cancelled() {
                break;
            }

            match response.chunk().await {
                Ok(Some(bytes)) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    for data in drain_data_lines(&mut buffer) {
                        if cancelled() {
                            break;
                        }
                        for event in parse_data(&data) {
                            yield event;
                        }
                    }
                }
                Ok(None) => {
                    if !buffer.trim().is_empty() {
                        buffer.push_str("\n\n");
                        for data in drain_data_lines(&mut buffer) {
                            for event in parse_data(&data) {
                                yield event;
                            }
                        }
                    }
                    break;
                }
                Err(e) => {
                    yield Err(on_io_error(e));
                    break;
                }
            }
        }
    };

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_single_complete_event() {
        let mut buf = String::from("event: message\ndata: hello\n\n");
        let lines = drain_data_lines(&mut buf);
        assert_eq!(lines, vec!["hello"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_partial_event_stays_in_buffer() {
        let mut buf = String::from("data: complete\n\ndata: partial");
        let lines = drain_data_lines(&mut buf);
        assert_eq!(lines, vec!["complete"]);
        assert_eq!(buf, "data: partial");
    }

    #[test]
    fn drain_skips_empty_data_lines() {
        let mut buf = String::from("data: \n\n");
        let lines = drain_data_lines(&mut buf);
        assert!(lines.is_empty());
    }
}
