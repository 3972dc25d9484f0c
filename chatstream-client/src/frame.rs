//! Line framing for the `data: ` event stream.

use shared::models::{DONE_SENTINEL, FRAME_PREFIX, StreamDelta};

use crate::decoder::Utf8StreamDecoder;

/// One decoded line of the wire protocol.
#[derive(Debug)]
pub(crate) enum StreamFrame {
    /// A well-formed delta; carries its `content`.
    Delta(String),
    /// The `[DONE]` sentinel.
    Done,
    /// A `data: ` line whose payload did not parse.
    Malformed {
        payload: String,
        error: serde_json::Error,
    },
    /// Anything else: blank keep-alive lines, comments, other fields.
    Ignored,
}

/// Classifies a single complete line (without its `\n`).
pub(crate) fn parse_line(line: &str) -> StreamFrame {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let Some(payload) = line.strip_prefix(FRAME_PREFIX) else {
        return StreamFrame::Ignored;
    };
    if payload == DONE_SENTINEL {
        return StreamFrame::Done;
    }
    match serde_json::from_str::<StreamDelta>(payload) {
        Ok(delta) => StreamFrame::Delta(delta.content),
        Err(error) => StreamFrame::Malformed {
            payload: payload.to_string(),
            error,
        },
    }
}

/// Turns raw body chunks into frames, holding partial lines back until they
/// complete.
///
/// Once the sentinel is seen the decoder is finished: the rest of the chunk
/// is dropped and further input is ignored.
#[derive(Debug, Default)]
pub(crate) struct FrameDecoder {
    text: Utf8StreamDecoder,
    buffer: String,
    /// Prefix of `buffer` already known to hold no newline.
    scanned: usize,
    done: bool,
}

impl FrameDecoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feeds one body chunk and returns the frames it completed, in order.
    /// [`StreamFrame::Ignored`] lines are not returned.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<StreamFrame> {
        if self.done {
            return Vec::new();
        }
        let text = self.text.decode(chunk);
        self.buffer.push_str(&text);
        self.drain_complete_lines()
    }

    /// Signals end of body. A final line without a trailing newline is
    /// still treated as a frame.
    pub(crate) fn finish(&mut self) -> Vec<StreamFrame> {
        if self.done {
            return Vec::new();
        }
        let tail = self.text.finish();
        self.buffer.push_str(&tail);

        let mut frames = self.drain_complete_lines();
        if !self.done && !self.buffer.is_empty() {
            let last = std::mem::take(&mut self.buffer);
            self.scanned = 0;
            match parse_line(&last) {
                StreamFrame::Ignored => {}
                frame => frames.push(frame),
            }
        }
        self.done = true;
        frames
    }

    fn drain_complete_lines(&mut self) -> Vec<StreamFrame> {
        let mut frames = Vec::new();
        let mut consumed = 0;
        let mut search_from = self.scanned;
        while let Some(offset) = self.buffer[search_from..].find('\n') {
            let end = search_from + offset;
            let frame = parse_line(&self.buffer[consumed..end]);
            consumed = end + 1;
            search_from = consumed;
            match frame {
                StreamFrame::Ignored => {}
                StreamFrame::Done => {
                    self.done = true;
                    frames.push(StreamFrame::Done);
                    break;
                }
                frame => frames.push(frame),
            }
        }

        if self.done {
            self.buffer.clear();
        } else {
            self.buffer.drain(..consumed);
        }
        self.scanned = self.buffer.len();
        frames
    }
}
