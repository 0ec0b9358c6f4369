// Owner audio cues: play `<dir>/<owner>.mp3` through an external player
// when a new owner goes on the clock. Playback problems are logged only.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::AudioConfig;

pub fn clip_path(dir: &Path, owner: &str) -> PathBuf {
    dir.join(format!("{}.mp3", owner.trim().to_lowercase()))
}

pub struct AudioCue {
    enabled: bool,
    command: String,
    args: Vec<String>,
    dir: PathBuf,
}

impl AudioCue {
    pub fn from_config(config: &AudioConfig) -> Self {
        Self {
            enabled: config.enabled,
            command: config.player_command.clone(),
            args: config.player_args.clone(),
            dir: PathBuf::from(&config.dir),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Start playing `owner`'s clip without waiting for it to finish.
    /// Returns whether a player process was started.
    pub fn announce(&self, owner: &str) -> bool {
        if !self.enabled || self.command.trim().is_empty() {
            return false;
        }

        let path = clip_path(&self.dir, owner);
        if !path.is_file() {
            warn!("No audio clip for {owner} at {}", path.display());
            return false;
        }

        let spawned = Command::new(&self.command)
            .args(&self.args)
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false)
            .spawn();

        match spawned {
            Ok(mut child) => {
                debug!("Playing {}", path.display());
                tokio::spawn(async move {
                    match child.wait().await {
                        Ok(status) if !status.success() => {
                            warn!("Audio player exited with {status}");
                        }
                        Err(e) => warn!("Audio player failed: {e}"),
                        Ok(_) => {}
                    }
                });
                true
            }
            Err(e) => {
                warn!("Failed to start audio player `{}`: {e}", self.command);
                false
            }
        }
    }
}
