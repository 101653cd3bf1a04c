//! Pipe device CLI demo
//!
//! Lines typed on stdin are written to `scullpipe0`; several reader tasks
//! drain it in small chunks. An empty line stops the writer, after which the
//! readers are interrupted through their cancellation tokens.

use std::io::{self, BufRead};

use scull::{AccessMode, DeviceId, DeviceRegistry, OpenOptions, ScullConfig, ScullError};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = ScullConfig::from_env()?;
    let registry = DeviceRegistry::new(&config)?;
    let stop = CancellationToken::new();

    let mut writer = registry
        .open(
            DeviceId::Pipe(0),
            OpenOptions::new().access(AccessMode::WriteOnly),
        )
        .await?;

    let mut readers = Vec::new();
    for name in ["r1", "r2", "r3"] {
        let reader = registry
            .open(
                DeviceId::Pipe(0),
                OpenOptions::new()
                    .access(AccessMode::ReadOnly)
                    .cancel_token(stop.child_token()),
            )
            .await?;
        readers.push(tokio::spawn(read_all(name, reader)));
    }

    let writer_task = tokio::spawn(async move {
        println!("Enter text (empty line to quit):");
        let lines: Vec<String> = io::stdin()
            .lock()
            .lines()
            .map_while(Result::ok)
            .take_while(|line| !line.trim().is_empty())
            .collect();

        for line in lines {
            let mut rest = line.trim().as_bytes();
            while !rest.is_empty() {
                match writer.write(rest).await {
                    Ok(n) => rest = &rest[n..],
                    Err(e) => {
                        eprintln!("Write error: {e}");
                        return;
                    }
                }
            }
        }

        if let Err(e) = writer.close().await {
            eprintln!("Close error: {e}");
        }
        println!("Writer closed");
    });

    writer_task.await?;
    // Readers never see EOF on a pipe; give them a moment to drain.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    stop.cancel();
    futures::future::join_all(readers).await;

    println!("All tasks completed");
    Ok(())
}

async fn read_all(name: &'static str, mut reader: scull::File) {
    let mut buf = [0u8; 4];

    loop {
        match reader.read(&mut buf).await {
            Ok(n) => {
                let data = String::from_utf8_lossy(&buf[..n]);
                println!("({name}): {data}");
            }
            Err(ScullError::Interrupted) => {
                println!("({name}) interrupted");
                break;
            }
            Err(e) => {
                eprintln!("({name}) Error: {e}");
                break;
            }
        }
    }

    // The token is already cancelled, so close() would be interrupted too;
    // dropping releases the reader side uninterruptibly.
    drop(reader);
}
