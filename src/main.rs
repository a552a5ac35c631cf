//! Minimal terminal front-end: prints controller events, reads lines from
//! stdin. `/next` asks for a new partner, `/quit` leaves.

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use rcc::{ChatMode, SampleCapture, Session, SessionConfig, UiEvent};

#[derive(Parser)]
#[command(name = "rcc", about = "Anonymous random chat client")]
struct Args {
    /// Nickname shown to partners (at least 2 characters)
    nickname: String,

    /// Matchmaking server base URL
    #[arg(long, default_value = "ws://127.0.0.1:8000")]
    server: String,

    /// Ask for a video pairing instead of text
    #[arg(long)]
    video: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let mode = if args.video {
        ChatMode::Video
    } else {
        ChatMode::Text
    };

    let config = SessionConfig {
        server_url: args.server,
        ..Default::default()
    };

    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
    let handle = match Session::start(config, &SampleCapture, ui_tx, &args.nickname, mode).await {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("could not start: {e}");
            std::process::exit(1);
        }
    };

    let renderer = tokio::spawn(async move {
        while let Some(event) = ui_rx.recv().await {
            match event {
                UiEvent::System(message) => println!("* {message}"),
                UiEvent::Message(entry) => {
                    if entry.mine {
                        println!("you: {}", entry.text);
                    } else {
                        println!("{}: {}", entry.nickname, entry.text);
                    }
                }
                UiEvent::TranscriptCleared => println!("* --- transcript cleared ---"),
                UiEvent::PartnerOnline { nickname } => println!("* {nickname} is online"),
                UiEvent::PartnerCleared => println!("* searching for a partner..."),
                UiEvent::RemoteTyping(true) => println!("* partner is typing..."),
                UiEvent::RemoteTyping(false) => {}
                UiEvent::LocalPreview(_) => println!("* local preview ready"),
                UiEvent::RemoteMedia(track) => {
                    println!("* remote media: {}", track.codec().capability.mime_type)
                }
                UiEvent::RemoteMediaCleared => println!("* remote media ended"),
                UiEvent::ChannelLost => println!("* connection lost"),
                UiEvent::Closed => break,
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => match line.trim() {
                    "" => {}
                    "/quit" => {
                        handle.leave();
                        break;
                    }
                    "/next" => handle.next(),
                    text => {
                        handle.keystroke();
                        handle.send_message(text);
                    }
                },
                Ok(None) | Err(_) => {
                    handle.leave();
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                handle.leave();
                break;
            }
        }
    }

    handle.closed().await;
    let _ = renderer.await;
}
