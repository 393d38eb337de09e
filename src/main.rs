//! Demo application for Line Lens.
//!
//! Watches a directory, shows the badge for every entry directly under it,
//! and prints badge updates as files change.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use line_lens::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("line_lens=debug".parse()?))
        .init();

    let root = match std::env::args().nth(1) {
        Some(arg) => PathBuf::from(arg),
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let root = root
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", root.display()))?;

    println!("=== Line Lens ===\n");
    println!("Watching: {}\n", root.display());

    let (engine, rx) = DecorationEngineBuilder::new()
        .root(root.clone())
        .buffer_size(256)
        .build();

    let mut view = BadgeViewBuilder::new(engine.clone())
        .on_badges_changed(Box::new(|changes| {
            for (path, decoration) in changes {
                match decoration {
                    Some(d) => println!("[{:>5}] {}  ({})", d.badge, path.display(), d.tooltip),
                    None => println!("[  ...] {}", path.display()),
                }
            }
        }))
        .on_message(Box::new(|message| match message {
            HostMessage::Info(text) => println!("{text}"),
            HostMessage::Status(text) => println!("  {text}"),
        }))
        .build();
    view.listen(rx);

    let mut entries = vec![root.clone()];
    let mut listing = tokio::fs::read_dir(&root).await?;
    while let Some(entry) = listing.next_entry().await? {
        entries.push(entry.path());
    }
    entries.sort();
    view.handle().show(&entries).await;

    let mut watcher = WorkspaceWatcher::new(200, 1000)?;
    watcher.watch(&root)?;
    if watcher.is_using_polling(&root) {
        println!("Note: Using polling fallback for this path\n");
    }

    let scan = engine.clone();
    tokio::spawn(async move {
        scan.initialize().await;
    });

    println!("Press Ctrl+C to exit\n");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
        _ = line_lens::run_watcher_loop(&mut watcher, &engine, 50) => {}
    }

    view.stop().await;
    engine.dispose();
    println!("Done!");

    Ok(())
}
