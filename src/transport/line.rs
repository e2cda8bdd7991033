//! Line-delimited JSON over a byte stream.
//!
//! One request per input line, one response per output line, strictly in
//! arrival order. Blank lines are skipped without a response; end of input
//! ends the channel silently.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::error::RpcError;
use crate::protocol::{RpcRequest, RpcResponse};

#[derive(Debug)]
enum LineState {
    /// Waiting for the next line.
    Idle,
    Parsing(String),
    Dispatching(RpcRequest),
    Responding(RpcResponse),
    /// End of input.
    Closed,
}

/// Counters reported when the channel closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineStats {
    pub requests: u64,
    pub parse_errors: u64,
}

/// Drives one request/response exchange at a time over `reader`/`writer`.
#[derive(Debug)]
pub struct LineChannel<R, W> {
    reader: R,
    writer: W,
    dispatcher: Dispatcher,
}

impl<R, W> LineChannel<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, dispatcher: Dispatcher) -> Self {
        Self {
            reader,
            writer,
            dispatcher,
        }
    }

    /// Runs until end of input. Only I/O failures are returned as errors;
    /// malformed requests are answered in-band.
    pub async fn run(mut self) -> std::io::Result<LineStats> {
        let mut stats = LineStats::default();
        let mut state = LineState::Idle;
        let mut line = Vec::new();

        loop {
            state = match state {
                LineState::Idle => {
                    line.clear();
                    if self.reader.read_until(b'\n', &mut line).await? == 0 {
                        LineState::Closed
                    } else {
                        match std::str::from_utf8(&line) {
                            Ok(text) if text.trim().is_empty() => LineState::Idle,
                            Ok(text) => LineState::Parsing(text.trim().to_string()),
                            Err(e) => {
                                stats.parse_errors += 1;
                                warn!(name: "line.parse_error", error = %e, "Request line is not UTF-8");
                                let error = RpcError::Parse {
                                    message: format!("request line is not valid UTF-8: {e}"),
                                };
                                LineState::Responding(RpcResponse::failure(None, &error))
                            }
                        }
                    }
                }
                LineState::Parsing(text) => match RpcRequest::parse(&text) {
                    Ok(request) => LineState::Dispatching(request),
                    Err(error) => {
                        stats.parse_errors += 1;
                        warn!(name: "line.parse_error", error = %error, "Malformed request line");
                        LineState::Responding(RpcResponse::failure(None, &error))
                    }
                },
                LineState::Dispatching(request) => {
                    stats.requests += 1;
                    debug!(name: "line.request", method = %request.method, "Dispatching");
                    LineState::Responding(self.dispatcher.dispatch(request).await)
                }
                LineState::Responding(response) => {
                    let mut out = response.to_line();
                    out.push('\n');
                    self.writer.write_all(out.as_bytes()).await?;
                    self.writer.flush().await?;
                    LineState::Idle
                }
                LineState::Closed => break,
            };
        }

        info!(
            name: "line.closed",
            requests = stats.requests,
            parse_errors = stats.parse_errors,
            "Input closed"
        );
        Ok(stats)
    }
}

/// The process's stdin/stdout.
pub fn stdio(dispatcher: Dispatcher) -> LineChannel<BufReader<Stdin>, Stdout> {
    LineChannel::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), dispatcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ServerContext;
    use crate::services::StaticFetcher;
    use crate::tools::dispatcher;

    async fn run(input: &str) -> (Vec<serde_json::Value>, LineStats) {
        run_bytes(input.as_bytes()).await
    }

    async fn run_bytes(input: &[u8]) -> (Vec<serde_json::Value>, LineStats) {
        let dispatcher = dispatcher(&ServerContext::offline(StaticFetcher::new())).unwrap();
        let mut output = Vec::new();
        let stats = LineChannel::new(input, &mut output, dispatcher)
            .run()
            .await
            .unwrap();
        let lines = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        (lines, stats)
    }

    #[tokio::test]
    async fn blank_lines_are_skipped_and_order_is_kept() {
        let input = "\n{\"id\":1,\"method\":\"tools/list\"}\n   \n{\"id\":2,\"method\":\"initialize\"}\n";
        let (responses, stats) = run(input).await;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[1]["id"], 2);
        assert_eq!(stats, LineStats { requests: 2, parse_errors: 0 });
    }

    #[tokio::test]
    async fn parse_errors_are_answered_and_the_channel_continues() {
        let input = "garbage\n{\"method\":\"tools/list\"}";
        let (responses, stats) = run(input).await;
        assert_eq!(responses[0]["error"]["code"], -32700);
        assert!(responses[1]["result"]["tools"].is_array());
        assert_eq!(stats.parse_errors, 1);
    }

    #[tokio::test]
    async fn invalid_utf8_line_is_a_parse_error() {
        let mut input = b"{\"id\":1,\"method\":\"tools/list\"}\n".to_vec();
        input.extend_from_slice(b"{\"method\":\"\xff\xfe\"}\n");
        input.extend_from_slice(b"{\"id\":3,\"method\":\"initialize\"}\n");

        let (responses, stats) = run_bytes(&input).await;
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[1]["error"]["code"], -32700);
        assert_eq!(responses[2]["id"], 3);
        assert_eq!(responses[2]["result"]["server_info"]["name"], "agentic-web-scraper");
        assert_eq!(stats, LineStats { requests: 2, parse_errors: 1 });
    }

    #[tokio::test]
    async fn empty_input_writes_nothing() {
        let (responses, stats) = run("").await;
        assert!(responses.is_empty());
        assert_eq!(stats, LineStats::default());
    }
}
