//! Incremental line and SSE framing for streamed provider responses.

use askweb_core::{Error, Result};

/// Buffers bytes and yields complete `\n`-terminated lines (without the terminator).
///
/// Bytes are held until a line is complete, so a multibyte character split across
/// network chunks is decoded whole.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = decode_line(line)?;
            out.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        Ok(out)
    }

    /// Whatever is left once the stream ends (a final line with no terminator).
    pub fn finish(&mut self) -> Result<Option<String>> {
        let rest = decode_line(std::mem::take(&mut self.buf))?;
        if rest.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(rest))
        }
    }
}

fn decode_line(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| Error::Upstream(format!("invalid utf-8 in stream: {e}")))
}

/// Extracts `data:` payloads from a server-sent event stream.
///
/// Events may be split across chunks, and a chunk may carry several events.
/// Non-data fields (`event:`, `id:`, comments) are ignored.
#[derive(Debug, Default)]
pub struct SseDecoder {
    lines: LineBuffer,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>> {
        Ok(self
            .lines
            .push(bytes)?
            .iter()
            .filter_map(|l| data_payload(l))
            .collect())
    }

    pub fn finish(&mut self) -> Result<Vec<String>> {
        Ok(self
            .lines
            .finish()?
            .iter()
            .flat_map(|rest| rest.lines())
            .filter_map(data_payload)
            .collect())
    }
}

fn data_payload(line: &str) -> Option<String> {
    let line = line.trim();
    line.strip_prefix("data:").map(|p| p.trim().to_string())
}
