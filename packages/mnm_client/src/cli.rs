use std::io::BufRead;
use std::path::Path;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{info, warn};

use mnm_client::config::{FileConfig, MnmConfig, ServerConfig, SessionConfig, load_config};
use mnm_client::{
    Envelope, HttpFetcher, JsonLinesRenderer, Session, SessionHandle, channel, decode_multi,
    decode_single,
};

use crate::{ConnectArgs, DecodeArgs};

/// Run one session until the server closes the channel or the user interrupts.
///
/// Each stdin line is sent as an envelope, e.g. `{"op":"navigate_history","navigate":{"history":-1}}`.
pub async fn connect_command(config: &MnmConfig, args: ConnectArgs) -> Result<()> {
    let mut fc: FileConfig = load_config(&config.data_dir)
        .extract()
        .with_context(|| format!("Invalid config: {}", config.config_toml_path().display()))?;
    if let Some(host) = args.host {
        fc.server.host = host;
    }
    if let Some(port) = args.port {
        fc.server.port = port;
    }
    if let Some(service) = args.service {
        fc.server.service = service;
    }

    let server = ServerConfig::from_file(&fc.server)?;
    let session_config = SessionConfig::from_file(&fc.session);
    info!(page = %server.page_url, push = %server.push_url, "starting session");

    let fetcher = HttpFetcher::new(server.page_url.clone());
    let (session, outbound) = Session::new(session_config, fetcher, JsonLinesRenderer);
    let handle = session.handle();

    let connected = channel::connect(&server.push_url, handle.clone(), outbound).await;
    if let Err(e) = &connected {
        warn!(error = %e, "push channel failed to connect");
    }
    if let Some(service) = args.notices {
        handle.notice_open(service);
    }

    let lines = spawn_line_reader(std::io::BufReader::new(std::io::stdin()));
    tokio::spawn(forward_lines(lines, handle.clone()));
    let ctrl_c = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.shutdown();
        }
    });

    session.run().await;
    connected.with_context(|| format!("Failed to connect to {}", server.push_url))?;
    Ok(())
}

/// Read lines on a plain thread so runtime shutdown never waits on a blocked read.
fn spawn_line_reader<R: BufRead + Send + 'static>(input: R) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(64);
    std::thread::spawn(move || {
        for line in input.lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn forward_lines(mut lines: mpsc::Receiver<String>, handle: SessionHandle) {
    while let Some(line) = lines.recv().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Envelope>(line) {
            Ok(envelope) => handle.send(envelope),
            Err(e) => eprintln!("invalid envelope: {e}"),
        }
    }
}

/// Decode a saved response body and print the records as JSON.
pub fn decode_command(args: &DecodeArgs) -> Result<()> {
    println!("{}", decode_file(&args.file, args.single)?);
    Ok(())
}

fn decode_file(path: &Path, single: bool) -> Result<String> {
    let body = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let body = Bytes::from(body);

    let json = if single {
        serde_json::to_string_pretty(&decode_single(body)?)?
    } else {
        serde_json::to_string_pretty(&decode_multi(body)?)?
    };
    Ok(json)
}
