//! Line-oriented draining of subprocess output.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{info, warn};

use crate::logging::FUZZER_OUTPUT_TARGET;

/// Drain `reader` to EOF, logging each line and handing it to `on_line`.
///
/// Lines are split on `\n` with a trailing `\r` removed. Invalid UTF-8 is
/// replaced rather than treated as an error so the pipe keeps draining. A
/// read error ends the stream early; it is logged, not returned.
///
/// Returns the number of lines read.
pub async fn stream_output<R, F>(reader: R, stream: &'static str, mut on_line: F) -> usize
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut count: usize = 0;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = decode_line(&buf);
                info!(target: FUZZER_OUTPUT_TARGET, stream, line = %line, "fuzzer output");
                on_line(&line);
                count = count.saturating_add(1);
            }
            Err(e) => {
                warn!(stream, error = %e, "failed to read fuzzer output");
                break;
            }
        }
    }

    count
}

fn decode_line(raw: &[u8]) -> String {
    let trimmed = raw.strip_suffix(b"\n").unwrap_or(raw);
    let trimmed = trimmed.strip_suffix(b"\r").unwrap_or(trimmed);
    String::from_utf8_lossy(trimmed).into_owned()
}
