use serde_json::Value;

use crate::errors::DecodeError;

/// Incremental framer for the streaming chat response body.
///
/// Transport units may split or merge frames arbitrarily; the decoder
/// buffers partial fragments and yields only fully parsed JSON frames, in
/// arrival order. Framing is newline-delimited JSON with tolerance for
/// SSE-style envelopes (`data:` prefixes, comment and field lines).
#[derive(Default)]
pub struct ChunkDecoder {
    buf: Vec<u8>,
}

impl ChunkDecoder {
    /// Feeds one transport unit and returns every frame it completed.
    ///
    /// A line that cannot be parsed as JSON breaks the stream: chunks are
    /// not skippable at this layer, since losing one would corrupt the
    /// accumulated reply.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<Vec<Value>, DecodeError> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some(idx) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=idx).collect();
            if let Some(frame) = parse_line(&line[..line.len() - 1])? {
                frames.push(frame);
            }
        }
        Ok(frames)
    }

    /// Signals end-of-transport.
    ///
    /// A buffered remainder must parse as one final frame; otherwise the
    /// connection closed mid-frame and the stream is broken. An empty (or
    /// envelope-only) remainder is a clean end.
    pub fn finish(&mut self) -> Result<Option<Value>, DecodeError> {
        let rest = std::mem::take(&mut self.buf);
        parse_line(&rest).map_err(|_| DecodeError::TruncatedFrame {
            buffered: rest.len(),
        })
    }
}

/// Parses one framed line; `None` for blank lines and SSE envelope lines
/// that carry no JSON payload.
fn parse_line(line: &[u8]) -> Result<Option<Value>, DecodeError> {
    let text = String::from_utf8_lossy(line);
    let line = text.trim();
    if line.is_empty() || line.starts_with(':') {
        return Ok(None);
    }
    let payload = if let Some(rest) = line.strip_prefix("data:") {
        rest.trim_start()
    } else if is_sse_field(line) {
        // The discriminant travels inside the JSON payload, so SSE event
        // names and bookkeeping fields carry nothing we need.
        return Ok(None);
    } else {
        line
    };
    if payload.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(payload)
        .map(Some)
        .map_err(|e| DecodeError::malformed(e.to_string()))
}

fn is_sse_field(line: &str) -> bool {
    ["event:", "id:", "retry:"]
        .iter()
        .any(|field| line.starts_with(field))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_a_frame_split_across_transport_units() {
        let mut decoder = ChunkDecoder::default();
        let frames = decoder
            .push_bytes(br#"{"type":"text_delta","delta":"Hel"#)
            .expect("partial frame");
        assert!(frames.is_empty());
        let frames = decoder.push_bytes(b"lo\"}\n").expect("completed frame");
        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0].get("delta").and_then(|v| v.as_str()),
            Some("Hello")
        );
    }

    #[test]
    fn yields_multiple_frames_from_one_unit_in_order() {
        let mut decoder = ChunkDecoder::default();
        let frames = decoder
            .push_bytes(b"{\"type\":\"text_delta\",\"delta\":\"a\"}\n{\"type\":\"text_delta\",\"delta\":\"b\"}\n")
            .expect("two frames");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].get("delta").and_then(|v| v.as_str()), Some("a"));
        assert_eq!(frames[1].get("delta").and_then(|v| v.as_str()), Some("b"));
    }

    #[test]
    fn tolerates_sse_envelope_lines() {
        let mut decoder = ChunkDecoder::default();
        let frames = decoder
            .push_bytes(
                b": keepalive\nevent: message\ndata: {\"type\":\"text_delta\",\"delta\":\"hi\"}\n\n",
            )
            .expect("sse-framed unit");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].get("delta").and_then(|v| v.as_str()), Some("hi"));
    }

    #[test]
    fn malformed_line_breaks_the_stream() {
        let mut decoder = ChunkDecoder::default();
        let err = decoder
            .push_bytes(b"{\"type\":\"text_delta\"  oops\n")
            .expect_err("broken frame");
        assert!(matches!(err, DecodeError::MalformedFrame { .. }));
    }

    #[test]
    fn finish_parses_an_unterminated_final_frame() {
        let mut decoder = ChunkDecoder::default();
        decoder
            .push_bytes(br#"{"type":"status","status":"complete","chat_id":42}"#)
            .expect("buffered remainder");
        let frame = decoder.finish().expect("final frame").expect("present");
        assert_eq!(
            frame.get("status").and_then(|v| v.as_str()),
            Some("complete")
        );
    }

    #[test]
    fn finish_rejects_a_partial_remainder() {
        let mut decoder = ChunkDecoder::default();
        decoder
            .push_bytes(br#"{"type":"text_delta","delta":"Hel"#)
            .expect("buffered remainder");
        let err = decoder.finish().expect_err("mid-frame close");
        assert!(matches!(err, DecodeError::TruncatedFrame { buffered } if buffered > 0));
    }

    #[test]
    fn finish_is_clean_on_empty_or_envelope_remainders() {
        let mut decoder = ChunkDecoder::default();
        assert_eq!(decoder.finish().expect("empty"), None);
        decoder.push_bytes(b": closing").expect("comment remainder");
        assert_eq!(decoder.finish().expect("comment only"), None);
    }
}
