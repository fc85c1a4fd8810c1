use anyhow::Result;
use futures::StreamExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::chat::{Assistant, Chunk, Conversation, Role, assemble};

const HELP: &str = "/help     Show help\n/reset    Start a new conversation\n/history  Show the conversation so far\n/quit     Quit (also /exit)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    Reset,
    History,
    Quit,
    Unknown,
}

pub async fn print_help<W: AsyncWrite + Unpin>(out: &mut W) -> Result<()> {
    out.write_all(HELP.as_bytes()).await?;
    out.write_all(b"\n").await?;
    Ok(())
}

/// `None` for ordinary chat input.
pub fn handle_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if !line.starts_with('/') {
        return None;
    }
    Some(match line {
        "/help" => Command::Help,
        "/reset" => Command::Reset,
        "/history" => Command::History,
        "/quit" | "/exit" => Command::Quit,
        _ => Command::Unknown,
    })
}

async fn print_turn<W: AsyncWrite + Unpin>(out: &mut W, role: Role, content: &str) -> Result<()> {
    out.write_all(format!("{} {content}\n", role.avatar()).as_bytes())
        .await?;
    Ok(())
}

/// Terminal chat. Fragments are written to `out` as they arrive; failures are
/// also written to `err`.
pub async fn run_cli_loop<R, W, E>(
    assistant: &Assistant,
    greeting: &str,
    input: R,
    out: &mut W,
    err: &mut E,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    let mut conversation = Conversation::new(greeting);
    out.write_all(b"ByteChat (CLI) - type /help for commands\n")
        .await?;
    print_turn(out, Role::Assistant, greeting).await?;
    out.flush().await?;

    let mut lines = input.lines();
    loop {
        out.write_all(format!("{} > ", Role::User.avatar()).as_bytes())
            .await?;
        out.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match handle_command(&line) {
            Some(Command::Quit) => break,
            Some(Command::Help) => print_help(out).await?,
            Some(Command::Reset) => {
                conversation = Conversation::new(greeting);
                print_turn(out, Role::Assistant, greeting).await?;
            }
            Some(Command::History) => {
                for turn in conversation.turns() {
                    print_turn(out, turn.role, &turn.content).await?;
                }
            }
            Some(Command::Unknown) => {
                err.write_all(format!("Unknown command: {}\n", line.trim()).as_bytes())
                    .await?;
                err.flush().await?;
            }
            None => {
                conversation.push_user(line);
                let mut stream = assistant.respond(&conversation, CancellationToken::new());
                let mut chunks = Vec::new();
                out.write_all(format!("{} ", Role::Assistant.avatar()).as_bytes())
                    .await?;
                while let Some(chunk) = stream.next().await {
                    out.write_all(chunk.text().as_bytes()).await?;
                    out.flush().await?;
                    if let Chunk::Failure(msg) = &chunk {
                        warn!(error = %msg, "reply failed");
                        err.write_all(format!("[error] {msg}\n").as_bytes())
                            .await?;
                        err.flush().await?;
                    }
                    chunks.push(chunk);
                }
                out.write_all(b"\n").await?;
                let reply = assemble(&chunks);
                debug!(len = reply.len(), "reply assembled");
                if !reply.is_empty() {
                    conversation.push_assistant(reply);
                }
            }
        }
        out.flush().await?;
    }
    Ok(())
}
