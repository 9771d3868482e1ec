use std::io::BufRead;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Operator stop signal: Ctrl-C, or `q` + Enter on stdin.
pub fn spawn_stop_listeners() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    let tx = Arc::new(tx);

    let ctrl_c_tx = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("stop: ctrl-c");
            let _ = ctrl_c_tx.send(true);
        }
    });

    // Plain thread: a pending blocking stdin read must not hold up runtime shutdown.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if is_quit(&line) {
                info!("stop: quit key");
                let _ = tx.send(true);
                break;
            }
        }
    });

    rx
}

fn is_quit(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("q")
}
