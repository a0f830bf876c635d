//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p wander_client -- [--config client.json] [--addr 127.0.0.1:3000] [--name Alice] [--room map2] [--tick-hz 20] [--idle]
//!
//! `--config` loads a JSON [`ClientConfig`]; the other flags override it.
//!
//! The client connects, joins the default room (or `--room`), and wanders
//! around at random unless `--idle` is given. Remote players and chat are
//! logged as they arrive.
//!
//! Console commands:
//!   say <message>  - Send chat message
//!   name <name>    - Change display name
//!   room <key>     - Switch room
//!   rooms          - List rooms
//!   who            - Players in the current room
//!   status         - Show client status
//!   quit           - Exit client

use std::env;
use std::io::{BufRead, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::info;
use wander_client::client::{ClientState, WanderClient};
use wander_client::input::InputState;
use wander_shared::config::ClientConfig;

struct Args {
    cfg: ClientConfig,
    room: Option<String>,
    idle: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = env::args().collect();
    let cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => ClientConfig::from_json_file(Path::new(&args[i + 1]))?,
        _ => ClientConfig::default(),
    };
    let mut out = Args {
        cfg,
        room: None,
        idle: false,
    };
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => i += 2,
            "--addr" if i + 1 < args.len() => {
                out.cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                out.cfg.player_name = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                out.cfg.tick_hz = args[i + 1].parse().unwrap_or(out.cfg.tick_hz);
                i += 2;
            }
            "--room" if i + 1 < args.len() => {
                out.room = Some(args[i + 1].clone());
                i += 2;
            }
            "--idle" => {
                out.idle = true;
                i += 1;
            }
            _ => i += 1,
        }
    }
    Ok(out)
}

/// Random-walk input that changes direction every couple of seconds.
struct Wander {
    input: InputState,
    until_change: f32,
}

impl Wander {
    fn new() -> Self {
        Self {
            input: InputState::default(),
            until_change: 0.0,
        }
    }

    fn next(&mut self, rng: &mut impl Rng, dt: f32) -> InputState {
        self.until_change -= dt;
        if self.until_change <= 0.0 {
            self.input = InputState {
                forward: rng.gen_range(-0.2..=1.0),
                right: rng.gen_range(-0.5..=0.5),
                turn: rng.gen_range(-1.0..=1.0),
            };
            self.until_change = rng.gen_range(1.0..=3.0);
        }
        self.input
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args()?;
    let cfg = args.cfg;
    info!(server = %cfg.server_addr, name = %cfg.player_name, "Starting client");

    let mut client = WanderClient::connect(&cfg).await.context("connect")?;
    if let Some(room) = &args.room {
        client.switch_room(room).await?;
    }

    // Set up console input channel.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Client connected. Type 'status' for info, 'quit' to exit.");
    println!();

    let tick_hz = cfg.tick_hz.max(1);
    let dt = 1.0 / tick_hz as f32;
    let mut ticker = tokio::time::interval(Duration::from_secs_f32(dt));
    let mut rng = rand::thread_rng();
    let mut wander = Wander::new();

    loop {
        // Process console commands.
        while let Ok(line) = console_rx.try_recv() {
            if matches!(line.as_str(), "quit" | "exit") {
                info!("Quitting");
                return Ok(());
            }
            match client.exec_console(&line).await {
                Ok(output) => {
                    for line in output {
                        println!("{line}");
                    }
                }
                Err(e) => println!("Error: {e}"),
            }
        }

        // Apply whatever arrived since the last tick.
        if let Err(e) = client.drain(Duration::from_millis(1)).await {
            println!("Connection error: {e}");
        }

        if client.state == ClientState::Disconnected {
            println!("Disconnected from server.");
            break;
        }

        if let ClientState::InRoom(_) = client.state {
            let input = if args.idle {
                InputState::default()
            } else {
                wander.next(&mut rng, dt)
            };
            client.tick(input, dt).await?;
        }

        ticker.tick().await;
    }

    Ok(())
}
