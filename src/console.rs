//! Interactive console for trying tools by hand.

use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};

use crate::dispatch::Dispatcher;
use crate::protocol::{RpcRequest, RpcResponse};

const HELP: &str = "Available commands:
  scrape <url>         Scrape a single URL
  research <question>  Run an interactive research pass
  tools                List available tools
  help                 Show this help
  quit                 Exit";

/// A console input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Scrape(String),
    Research(String),
    Tools,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let (head, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(h, r)| (h, r.trim()));

        match (head.to_lowercase().as_str(), rest) {
            ("", _) => Self::Empty,
            ("quit" | "exit" | "q", "") => Self::Quit,
            ("help", "") => Self::Help,
            ("tools", "") => Self::Tools,
            ("scrape", target) if !target.is_empty() => Self::Scrape(target.to_string()),
            ("research", question) if !question.is_empty() => Self::Research(question.to_string()),
            _ => Self::Unknown(line.to_string()),
        }
    }
}

/// Read-eval-print loop over `reader`/`writer`.
#[derive(Debug)]
pub struct Console<R, W> {
    reader: R,
    writer: W,
    dispatcher: Dispatcher,
}

impl<R, W> Console<R, W>
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

    /// Runs until `quit` or end of input.
    pub async fn run(mut self) -> std::io::Result<()> {
        self.print(&format!("Agentic Web Scraper console\n{HELP}\n")).await?;
        let mut line = String::new();

        loop {
            self.print("\n> ").await?;
            line.clear();
            if self.reader.read_line(&mut line).await? == 0 {
                break;
            }

            let output = match Command::parse(&line) {
                Command::Quit => break,
                Command::Empty => continue,
                Command::Help => HELP.to_string(),
                Command::Tools => {
                    let names: Vec<&str> = self
                        .dispatcher
                        .registry()
                        .list()
                        .iter()
                        .map(|c| c.name.as_str())
                        .collect();
                    format!("Available tools: {}", names.join(", "))
                }
                Command::Scrape(url) => {
                    let request = RpcRequest::call(
                        "scrape_url",
                        json!({"url": url, "output_format": "markdown"}),
                    );
                    render(&self.dispatcher.dispatch(request).await, "data")
                }
                Command::Research(question) => {
                    let request =
                        RpcRequest::call("research_interactive", json!({"question": question}));
                    render(&self.dispatcher.dispatch(request).await, "summary")
                }
                Command::Unknown(_) => {
                    "Unknown command. Type 'help' for available commands.".to_string()
                }
            };
            self.print(&format!("\n{output}\n")).await?;
        }
        Ok(())
    }

    async fn print(&mut self, text: &str) -> std::io::Result<()> {
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.flush().await
    }
}

/// Text field `field` of a successful result, otherwise the error or the
/// whole result as pretty JSON.
fn render(response: &RpcResponse, field: &str) -> String {
    if let Some(error) = &response.error {
        return format!("Error: {}", error.message);
    }
    let result = response.result.as_ref().unwrap_or(&Value::Null);
    match (result["success"].as_bool(), result[field].as_str()) {
        (Some(true), Some(text)) => text.to_string(),
        (Some(false), _) => format!(
            "Error: {}",
            result["error"].as_str().unwrap_or("request failed")
        ),
        _ => serde_json::to_string_pretty(result).unwrap_or_default(),
    }
}

/// Console on the process's stdin/stdout.
pub fn stdio(dispatcher: Dispatcher) -> Console<BufReader<Stdin>, Stdout> {
    Console::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), dispatcher)
}
