//! # CLI - RiptideKV Interactive Shell
//!
//! A REPL-style command-line interface for the RiptideKV storage engine.
//! Reads commands from stdin, executes them against the engine, and prints
//! results to stdout. Designed for both interactive use and scripted testing
//! (pipe commands via stdin).
//!
//! ## Commands
//!
//! ```text
//! SET key value         Insert or update a key-value pair
//! GET key               Look up a key (prints value or "(nil)")
//! DEL key                Delete a key (writes a tombstone)
//! SCAN [start] [end]    Range scan (inclusive start, exclusive end)
//! FLUSH                 Force flush memtable to SSTable
//! COMPACT                Trigger manual compaction
//! STATS                 Print engine statistics
//! EXIT / QUIT           Shut down gracefully
//! ```
//!
//! ## Configuration
//!
//! All settings are controlled via environment variables, see
//! [`config::EngineConfig::from_env`].

use anyhow::Result;
use config::EngineConfig;
use engine::Engine;
use std::io::{self, BufRead, Write};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = EngineConfig::from_env();
    let engine = Engine::open(config.clone())?;
    engine.start_compaction_scheduler();

    println!(
        "RiptideKV started (seq={}, wal_dir={}, sst_dir={}, flush={}KiB, l0_trigger={})",
        engine.seq(),
        config.wal_dir.display(),
        config.sst_dir.display(),
        config.flush_threshold / 1024,
        config.l0_compaction_trigger
    );
    println!("Commands: SET key value | GET key | DEL key | SCAN [start] [end]");
    println!("          COMPACT | FLUSH | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "SET" => {
                    if let Some(k) = parts.next() {
                        let v: String = parts.collect::<Vec<&str>>().join(" ");
                        if v.is_empty() {
                            println!("ERR usage: SET key value");
                        } else {
                            match engine.put(k.as_bytes().to_vec(), v.as_bytes().to_vec()).await {
                                Ok(()) => println!("OK"),
                                Err(e) => println!("ERR set failed: {}", e),
                            }
                        }
                    } else {
                        println!("ERR usage: SET key value");
                    }
                }
                "GET" => {
                    if let Some(k) = parts.next() {
                        match engine.get(k.as_bytes()).await {
                            Ok(Some((_seq, v))) => println!("{}", String::from_utf8_lossy(&v)),
                            Ok(None) => println!("(nil)"),
                            Err(e) => println!("ERR read failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: GET key");
                    }
                }
                "DEL" => {
                    if let Some(k) = parts.next() {
                        match engine.delete(k.as_bytes().to_vec()).await {
                            Ok(()) => println!("OK"),
                            Err(e) => println!("ERR del failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: DEL key");
                    }
                }
                "SCAN" => {
                    let start = parts.next().map(str::as_bytes);
                    let end = parts.next().map(str::as_bytes);
                    match engine.scan(start, end, None).await {
                        Ok(results) => {
                            if results.is_empty() {
                                println!("(empty)");
                            } else {
                                for (k, v) in &results {
                                    println!(
                                        "{} -> {}",
                                        String::from_utf8_lossy(k),
                                        String::from_utf8_lossy(v)
                                    );
                                }
                                println!("({} entries)", results.len());
                            }
                        }
                        Err(e) => println!("ERR scan failed: {}", e),
                    }
                }
                "COMPACT" => match engine.compact().await {
                    Ok(()) => println!("OK {}", format_level_counts(&engine).await),
                    Err(e) => println!("ERR compact failed: {}", e),
                },
                "FLUSH" => match engine.flush().await {
                    Ok(()) => println!("OK {}", format_level_counts(&engine).await),
                    Err(e) => println!("ERR flush failed: {}", e),
                },
                "STATS" => {
                    println!("{:?}", engine.stats().await);
                }
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {}", other);
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}

async fn format_level_counts(engine: &Engine) -> String {
    let stats = engine.stats().await;
    let levels: Vec<String> = stats
        .level_sstable_counts
        .iter()
        .enumerate()
        .map(|(level, count)| format!("L{}={}", level, count))
        .collect();
    format!("({})", levels.join(", "))
}
