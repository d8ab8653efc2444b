// CLI interactive commands: watch, prompt, notify

use std::io::{BufRead, Write};
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

use crate::app::App;
use crate::controller::NO_ALARM_RUNNING;

pub const QUESTION: &str = "Turn off the running alarm? [y/N] ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    TimedOut,
}

pub fn is_yes(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Feed stdin lines into a channel from a plain thread. A pending read must
/// not keep the runtime alive at exit, so this stays off tokio's blocking
/// pool.
pub fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Print the question and wait up to `timeout` for an answer.
/// A closed input counts as "no".
pub async fn ask(lines: &mut mpsc::UnboundedReceiver<String>, timeout: Duration) -> Answer {
    print!("{}", QUESTION);
    let _ = std::io::stdout().flush();

    match tokio::time::timeout(timeout, lines.recv()).await {
        Ok(Some(line)) if is_yes(&line) => Answer::Yes,
        Ok(_) => Answer::No,
        Err(_) => {
            println!();
            Answer::TimedOut
        }
    }
}

async fn prompt_once(
    app: &App,
    lines: &mut mpsc::UnboundedReceiver<String>,
    timeout: Duration,
) -> anyhow::Result<()> {
    match ask(lines, timeout).await {
        Answer::Yes => {
            if !app.controller.kill()? {
                eprintln!("{}", NO_ALARM_RUNNING);
            }
        }
        Answer::No => tracing::debug!("Alarm left running"),
        Answer::TimedOut => tracing::info!("Prompt dismissed after {:?}", timeout),
    }
    Ok(())
}

/// One watcher round. Errors are reported and the watcher keeps going.
async fn on_wake(app: &App, lines: &mut mpsc::UnboundedReceiver<String>, timeout: Duration) {
    if let Err(e) = prompt_once(app, lines, timeout).await {
        tracing::warn!("Failed to turn off alarm: {}", e);
        eprintln!("Error: {}", e);
    }
}

/// ffalarms prompt
pub async fn cmd_prompt(app: &App, timeout: Option<u64>) -> anyhow::Result<()> {
    let timeout = Duration::from_secs(timeout.unwrap_or(app.config.prompt_timeout_secs));
    let mut lines = stdin_lines();
    prompt_once(app, &mut lines, timeout).await
}

/// ffalarms watch
pub async fn cmd_watch(app: &App) -> anyhow::Result<()> {
    let mut wake = signal(SignalKind::user_defined1())?;
    let mut lines = stdin_lines();
    let timeout = Duration::from_secs(app.config.prompt_timeout_secs);

    println!("Waiting for alarms (pid {}), Ctrl+C to quit", std::process::id());
    loop {
        tokio::select! {
            _ = wake.recv() => {
                println!("Alarm!");
                on_wake(app, &mut lines, timeout).await;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Watcher shutting down");
                return Ok(());
            }
        }
    }
}

/// ffalarms notify
pub fn cmd_notify(app: &App) -> anyhow::Result<()> {
    if !app.controller.notify_watcher(&app.config.app_name) {
        anyhow::bail!("No watcher is running");
    }
    Ok(())
}
