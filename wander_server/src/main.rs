//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p wander_server -- [--config server.json] [--addr 0.0.0.0:3000] [--port 3000] [--dump-config]
//!
//! Precedence: built-in defaults, then the config file, then the `PORT`
//! environment variable, then CLI flags.
//!
//! Console commands:
//!   status       - Player count per room
//!   rooms        - Room catalog with occupancy
//!   who <room>   - Players in a room
//!   quit         - Shutdown server

use std::env;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::info;
use wander_server::RoomServer;
use wander_shared::config::ServerConfig;

struct Args {
    config: Option<PathBuf>,
    addr: Option<String>,
    port: Option<String>,
    dump_config: bool,
}

fn parse_args() -> Args {
    let mut out = Args {
        config: None,
        addr: None,
        port: None,
        dump_config: false,
    };
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                out.config = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--addr" if i + 1 < args.len() => {
                out.addr = Some(args[i + 1].clone());
                i += 2;
            }
            "--port" if i + 1 < args.len() => {
                out.port = Some(args[i + 1].clone());
                i += 2;
            }
            "--dump-config" => {
                out.dump_config = true;
                i += 1;
            }
            _ => i += 1,
        }
    }
    out
}

fn load_config(args: &Args) -> anyhow::Result<ServerConfig> {
    let mut cfg = match &args.config {
        Some(path) => ServerConfig::from_json_file(path)?,
        None => ServerConfig::default(),
    };
    cfg.apply_port(env::var("PORT").ok().as_deref())
        .context("PORT")?;
    if let Some(addr) = &args.addr {
        cfg.apply_addr(addr).context("--addr")?;
    }
    if let Some(port) = &args.port {
        cfg.apply_port(Some(port)).context("--port")?;
    }
    cfg.validate()?;
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args();
    let cfg = load_config(&args)?;
    if args.dump_config {
        println!("{}", serde_json::to_string_pretty(&cfg)?);
        return Ok(());
    }
    info!(addr = %cfg.listen_addr(), default_room = %cfg.default_room, "Starting server");

    let server = RoomServer::bind(cfg).await.context("bind server")?;
    let handle = server.spawn()?;
    info!(local = %handle.local_addr(), "Server running");

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

    println!("Server ready. Type 'status', 'rooms', 'who <room>', or 'quit'.");
    println!();

    loop {
        tokio::select! {
            line = console_rx.recv() => {
                let Some(line) = line else {
                    // stdin closed; keep serving until ctrl-c.
                    tokio::signal::ctrl_c().await.context("ctrl-c")?;
                    break;
                };
                let quitting = matches!(line.as_str(), "quit" | "exit");
                match handle.exec_console(&line).await {
                    Ok(output) => {
                        for line in output {
                            println!("{line}");
                        }
                    }
                    Err(e) => println!("Error: {e}"),
                }
                if quitting {
                    return handle.wait().await;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    handle.shutdown().await
}
