//! Headless mode runner - engine plus NDJSON stdout and line commands on stdin

use sfleet_app::{signals, EngineEvent, EngineHandle, UsbWatcher};
use sfleet_core::prelude::*;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

use super::commands::{parse_command, Command};
use super::HeadlessEvent;
use crate::startup::Startup;

/// Run the engine until `quit` or a termination signal
pub async fn run_headless(startup: Startup) -> Result<()> {
    info!("═══════════════════════════════════════════════════════");
    info!("scrcpy-fleet starting in HEADLESS mode");
    info!("scrcpy: {:?}", startup.tools.scrcpy);
    info!("adb: {:?}", startup.tools.adb);
    info!("═══════════════════════════════════════════════════════");

    let engine = startup.build_engine();
    let handle = engine.handle();
    let mut events = handle.subscribe();

    signals::spawn_signal_handler(handle.sender());

    // Registry as loaded, before the first poll
    HeadlessEvent::devices(&handle.devices()).emit();

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(32);
    std::thread::spawn(move || {
        spawn_stdin_reader_blocking(cmd_tx);
    });

    // Dropped on return, which stops it
    let _usb_watcher = start_usb_watcher(&startup, &handle);

    let engine_task = tokio::spawn(engine.run());

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(EngineEvent::Shutdown) => {
                    HeadlessEvent::from(&EngineEvent::Shutdown).emit();
                    break;
                }
                Ok(event) => HeadlessEvent::from(&event).emit(),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Headless output lagged, skipped {} event(s)", skipped);
                    HeadlessEvent::devices(&handle.devices()).emit();
                }
                Err(RecvError::Closed) => {
                    info!("Engine event stream closed");
                    break;
                }
            },
            Some(command) = cmd_rx.recv() => {
                dispatch(command, &handle).await;
            }
        }
    }

    if let Err(e) = engine_task.await {
        error!("Engine task failed: {}", e);
    }

    info!("scrcpy-fleet headless mode exiting");
    Ok(())
}

/// Early discovery on USB attach/detach. Without it the poll interval alone
/// drives discovery.
fn start_usb_watcher(startup: &Startup, handle: &EngineHandle) -> UsbWatcher {
    let mut watcher = UsbWatcher::new(startup.hotplug_config());
    match watcher.start(handle.sender()) {
        Ok(()) => debug!("USB hot-plug watcher started"),
        Err(e) if e.is_recoverable() => warn!(
            "{}; polling every {:?} only",
            e,
            startup.poll_interval()
        ),
        Err(e) => error!("USB hot-plug watcher failed: {}", e),
    }
    watcher
}

async fn dispatch(command: Command, handle: &EngineHandle) {
    debug!("Stdin command: {:?}", command);
    if let Err(e) = command.dispatch(handle).await {
        if e.is_recoverable() {
            warn!("Command failed: {}", e);
        } else {
            error!("Command failed: {}", e);
        }
        HeadlessEvent::error(e.to_string(), e.is_fatal()).emit();
    }
}

/// Read stdin line by line on a plain thread and forward parsed commands
fn spawn_stdin_reader_blocking(cmd_tx: mpsc::Sender<Command>) {
    use std::io::BufRead;

    let stdin = std::io::stdin();
    let reader = stdin.lock();

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        };

        match parse_command(&line) {
            Ok(Some(command)) => {
                let quit = command == Command::Quit;
                if cmd_tx.blocking_send(command).is_err() {
                    break;
                }
                if quit {
                    info!("Stdin: quit requested");
                    break;
                }
            }
            Ok(None) => {}
            Err(message) => {
                warn!("Invalid stdin command: {}", message);
                HeadlessEvent::error(message, false).emit();
            }
        }
    }

    info!("Stdin reader exiting");
}
