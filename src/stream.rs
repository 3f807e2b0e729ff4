use anyhow::Result;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;

/// One decoded payload from a reply stream frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamEvent {
    #[serde(default)]
    pub text: Option<String>,
}

const DATA_PREFIX: &str = "data: ";

/// Incremental decoder for the `data: {...}\n\n` framing the message
/// endpoint streams back.
///
/// Bytes are buffered until a complete frame (terminated by a blank line)
/// is available, and only complete frames are decoded as UTF-8. A
/// multi-byte character split across two reads therefore never reaches the
/// text layer in halves: the `\n\n` delimiter cannot occur inside a UTF-8
/// sequence, so frame boundaries are always character boundaries.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of bytes, returning every event completed by it.
    ///
    /// Lines without the `data: ` prefix are ignored. A `data: ` line that
    /// is not valid JSON of shape `{"text": ...}` fails the whole stream.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = find_frame_end(&self.buf) {
            let frame: Vec<u8> = self.buf.drain(..pos + 2).collect();
            let frame = std::str::from_utf8(&frame)?;

            for line in frame.lines() {
                if let Some(payload) = line.trim_end().strip_prefix(DATA_PREFIX) {
                    events.push(serde_json::from_str(payload)?);
                }
            }
        }

        Ok(events)
    }
}

fn find_frame_end(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

/// Drive a reply byte stream to completion, handing every non-empty text
/// delta to `sink` in arrival order.
///
/// Returns `Ok(())` when the underlying stream ends normally and the first
/// transport or decode error otherwise. Each chunk is awaited separately,
/// so callers interleave freely between deltas.
pub async fn pump_reply<S, B, E>(stream: S, mut sink: impl FnMut(&str)) -> Result<()>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut decoder = FrameDecoder::new();

    futures_util::pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        for event in decoder.push(chunk.as_ref())? {
            if let Some(text) = event.text {
                if !text.is_empty() {
                    sink(&text);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::io;

    fn texts(events: Vec<StreamEvent>) -> Vec<String> {
        events.into_iter().filter_map(|e| e.text).collect()
    }

    #[test]
    fn test_decodes_single_frame() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(b"data: {\"text\":\"Hi\"}\n\n").unwrap();
        assert_eq!(texts(events), vec!["Hi"]);
    }

    #[test]
    fn test_concatenation_order_across_chunks() {
        let mut decoder = FrameDecoder::new();
        let mut out = String::new();

        for chunk in [
            b"data: {\"text\":\"Hi\"}\n\n".as_slice(),
            b"data: {\"text\":\" there\"}\n\ndata: {\"text\":\"!\"}\n\n".as_slice(),
        ] {
            for text in texts(decoder.push(chunk).unwrap()) {
                out.push_str(&text);
            }
        }

        assert_eq!(out, "Hi there!");
    }

    #[test]
    fn test_partial_frame_held_until_delimiter() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"text\":\"Hi\"}").unwrap().is_empty());
        assert!(decoder.push(b"\n").unwrap().is_empty());
        let events = decoder.push(b"\n").unwrap();
        assert_eq!(texts(events), vec!["Hi"]);
    }

    #[test]
    fn test_ignores_lines_without_data_prefix() {
        let mut decoder = FrameDecoder::new();
        let events = decoder
            .push(b"event: ping\n\n: comment\n\ndata: {\"text\":\"ok\"}\n\n")
            .unwrap();
        assert_eq!(texts(events), vec!["ok"]);
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        // "д" is 0xD0 0xB4; split it between two reads.
        let frame = "data: {\"text\":\"да\"}\n\n".as_bytes();
        let (head, tail) = frame.split_at(16);
        assert!(std::str::from_utf8(head).is_err(), "split must land mid-character");

        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(head).unwrap().is_empty());
        let events = decoder.push(tail).unwrap();
        assert_eq!(texts(events), vec!["да"]);
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {not json}\n\n").is_err());
    }

    #[test]
    fn test_event_without_text_field() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(b"data: {}\n\n").unwrap();
        assert_eq!(events, vec![StreamEvent { text: None }]);
    }

    #[tokio::test]
    async fn test_pump_collects_deltas_in_order() {
        let chunks: Vec<Result<&[u8], io::Error>> = vec![
            Ok(b"data: {\"text\":\"Hi\"}\n\n"),
            Ok(b"data: {\"text\":\" there\"}\n\n"),
        ];

        let mut out = String::new();
        pump_reply(stream::iter(chunks), |delta| out.push_str(delta))
            .await
            .unwrap();

        assert_eq!(out, "Hi there");
    }

    #[tokio::test]
    async fn test_pump_skips_empty_text_deltas() {
        let chunks: Vec<Result<&[u8], io::Error>> = vec![
            Ok(b"data: {\"text\":\"\"}\n\ndata: {}\n\ndata: {\"text\":\"x\"}\n\n"),
        ];

        let mut deltas = Vec::new();
        pump_reply(stream::iter(chunks), |delta| deltas.push(delta.to_string()))
            .await
            .unwrap();

        assert_eq!(deltas, vec!["x"]);
    }

    #[tokio::test]
    async fn test_pump_surfaces_transport_error_after_partial_output() {
        let chunks: Vec<Result<&[u8], io::Error>> = vec![
            Ok(b"data: {\"text\":\"par\"}\n\n"),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "dropped")),
        ];

        let mut out = String::new();
        let result = pump_reply(stream::iter(chunks), |delta| out.push_str(delta)).await;

        assert!(result.is_err());
        assert_eq!(out, "par");
    }
}
