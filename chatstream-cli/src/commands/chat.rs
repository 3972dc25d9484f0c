//! Interactive chat and one-shot questions.

use std::io::{self, Write};

use anyhow::{Context, Result};
use client::{Conversation, ExchangeOutcome, StreamingChatClient, run_exchange, validate_input};
use futures_util::StreamExt;
use shared::{config::ClientConfig, models::ConversationId};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    signal,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const EXIT_COMMANDS: [&str; 2] = ["/exit", "/quit"];

/// Cancels `token` on the first Ctrl+C. Abort the handle once the reply ends.
fn cancel_on_interrupt(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            debug!("interrupt received; stopping reply");
            token.cancel();
        }
    })
}

fn print_flush(text: &str) {
    let mut stdout = io::stdout().lock();
    // A closed stdout only loses display output; the reply is still recorded.
    let _ = stdout.write_all(text.as_bytes());
    let _ = stdout.flush();
}

/// Runs a read-eval-print chat loop on stdin until EOF, `/exit` or Ctrl+C at
/// the prompt. Ctrl+C while a reply streams stops only that reply.
///
/// # Errors
/// Returns an error if the client cannot be built or stdin cannot be read.
pub async fn run_chat(config: &ClientConfig) -> Result<()> {
    let client = StreamingChatClient::new(config).context("failed to create chat client")?;
    let mut conversation = Conversation::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    info!(
        conversation_id = %conversation.id(),
        server = %config.api_base_url,
        "chat session started"
    );
    println!("Connected to {}. Type /exit to quit.", config.api_base_url);

    loop {
        print_flush("you> ");
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read input")?,
            _ = signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        if EXIT_COMMANDS.contains(&line.trim()) {
            break;
        }
        if let Err(err) = validate_input(&line) {
            eprintln!("{err}");
            continue;
        }

        let cancel = CancellationToken::new();
        let interrupt = cancel_on_interrupt(cancel.clone());
        print_flush("assistant> ");
        let outcome = run_exchange(&client, &mut conversation, &line, cancel, print_flush).await;
        interrupt.abort();

        match outcome? {
            ExchangeOutcome::Completed => println!(),
            ExchangeOutcome::Cancelled => println!(" [stopped]"),
            ExchangeOutcome::Failed(err) => {
                println!();
                eprintln!("error: {err}");
                if let Some(apology) = conversation.messages().last() {
                    println!("assistant> {}", apology.content);
                }
            }
        }
    }

    info!(
        conversation_id = %conversation.id(),
        messages = conversation.messages().len(),
        "chat session ended"
    );
    Ok(())
}

/// Sends one message and prints the reply, streamed or whole.
///
/// # Errors
/// Returns an error for invalid input, a failed request, or an interrupted
/// stream. Text printed before an interruption stays on screen.
pub async fn ask(config: &ClientConfig, message: &str, stream: bool) -> Result<()> {
    let text = validate_input(message)?;
    let client = StreamingChatClient::new(config).context("failed to create chat client")?;
    let conversation_id = ConversationId::generate();

    if !stream {
        let reply = client.send_message(text, Some(&conversation_id)).await?;
        println!("{}", reply.content);
        return Ok(());
    }

    let mut deltas = client.open(text, &conversation_id);
    let interrupt = cancel_on_interrupt(deltas.cancel_token());
    let mut result = Ok(());
    while let Some(delta) = deltas.next().await {
        match delta {
            Ok(delta) => print_flush(&delta),
            Err(err) => {
                result = Err(err);
                break;
            }
        }
    }
    interrupt.abort();
    println!();

    result.map_err(anyhow::Error::from)
}
