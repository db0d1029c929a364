//! Destinations that actually put a logo on screen.

use std::path::PathBuf;
use std::process::Stdio;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::ServerError;
use crate::resolver::ResolvedLogo;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("player process failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<OutputError> for ServerError {
    fn from(e: OutputError) -> Self {
        ServerError::Internal(format!("playback output: {e}"))
    }
}

pub trait PlaybackOutput: Send + Sync {
    fn play<'a>(&'a self, logo: &'a ResolvedLogo) -> BoxFuture<'a, Result<(), OutputError>>;

    fn stop(&self) -> BoxFuture<'_, Result<(), OutputError>>;
}

/// Output that only records transitions in the log.
pub struct LogOutput;

impl PlaybackOutput for LogOutput {
    fn play<'a>(&'a self, logo: &'a ResolvedLogo) -> BoxFuture<'a, Result<(), OutputError>> {
        Box::pin(async move {
            info!(logo_id = %logo.id, path = %logo.path, "Playing logo");
            Ok(())
        })
    }

    fn stop(&self) -> BoxFuture<'_, Result<(), OutputError>> {
        Box::pin(async move {
            info!("Playback stopped");
            Ok(())
        })
    }
}

/// Output driving an external player: one child process per logo on air.
pub struct CommandOutput {
    program: PathBuf,
    child: Mutex<Option<Child>>,
}

impl CommandOutput {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            child: Mutex::new(None),
        }
    }
}

async fn halt(slot: &mut Option<Child>) -> Result<(), OutputError> {
    if let Some(mut child) = slot.take() {
        // The player may already have exited on its own.
        if child.try_wait()?.is_none() {
            child.kill().await?;
        }
    }
    Ok(())
}

impl PlaybackOutput for CommandOutput {
    fn play<'a>(&'a self, logo: &'a ResolvedLogo) -> BoxFuture<'a, Result<(), OutputError>> {
        Box::pin(async move {
            let mut slot = self.child.lock().await;
            halt(&mut slot).await?;

            let child = Command::new(&self.program)
                .arg(&logo.path)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .spawn()?;
            debug!(pid = ?child.id(), logo_id = %logo.id, "Player started");
            *slot = Some(child);
            Ok(())
        })
    }

    fn stop(&self) -> BoxFuture<'_, Result<(), OutputError>> {
        Box::pin(async move {
            let mut slot = self.child.lock().await;
            halt(&mut slot).await
        })
    }
}
