//! Incremental token streams from line-delimited HTTP bodies

use futures_util::stream::{self, BoxStream, Stream, StreamExt};

use crate::error::{Error, Result};

/// Answer text as it is generated, one fragment per item
pub type TokenStream = BoxStream<'static, Result<String>>;

struct LineState<S> {
    inner: S,
    buffer: Vec<u8>,
    finished: bool,
}

impl<S> LineState<S> {
    /// Next complete, non-blank line in the buffer
    fn take_line(&mut self) -> Option<String> {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                return Some(line);
            }
        }
        None
    }

    fn take_rest(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&raw).trim().to_string();
        (!line.is_empty()).then_some(line)
    }
}

/// Split a byte stream into trimmed lines.
///
/// Lines may straddle chunk boundaries. A trailing line without a newline is
/// still yielded. The stream ends after the first transport error.
pub(crate) fn lines<S, B, E>(inner: S) -> impl Stream<Item = Result<String>> + Send + 'static
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<Error> + Send + 'static,
{
    let state = LineState {
        inner,
        buffer: Vec::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.take_line() {
                return Some((Ok(line), state));
            }
            if state.finished {
                return state.take_rest().map(|line| (Ok(line), state));
            }
            match state.inner.next().await {
                Some(Ok(bytes)) => state.buffer.extend_from_slice(bytes.as_ref()),
                Some(Err(e)) => {
                    state.finished = true;
                    state.buffer.clear();
                    return Some((Err(e.into()), state));
                }
                None => state.finished = true,
            }
        }
    })
}
