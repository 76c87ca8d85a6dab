//! Toggled persistent recording of the frame stream.
//!
//! Frames are raw rgb24; encoding is delegated to an ffmpeg child fed on
//! stdin, the same subprocess arrangement the capture side uses. Each
//! session writes one file named by its start timestamp.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use image::RgbImage;
use log::{info, warn};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("ffmpeg not found; it is required for recording")]
    FfmpegNotFound,
    #[error("failed to create recording directory '{path}': {source}")]
    CreateDirFailed { path: PathBuf, source: std::io::Error },
    #[error("failed to start encoder for '{path}': {source}")]
    SpawnFailed { path: PathBuf, source: std::io::Error },
    #[error("recording write failed: {0}")]
    WriteFailed(#[from] std::io::Error),
}

/// Output file for a session starting at `started`.
pub fn session_path(directory: &Path, started: &DateTime<Local>) -> PathBuf {
    directory.join(format!("{}.mp4", started.format("%Y-%m-%d_%H-%M-%S")))
}

struct RecordingSession {
    child: Child,
    stdin: Option<ChildStdin>,
    path: PathBuf,
    started: Instant,
}

/// Owns the toggled recording session.
pub struct Recorder {
    directory: PathBuf,
    fps: u32,
    width: u32,
    height: u32,
    session: Option<RecordingSession>,
}

impl Recorder {
    pub fn new(directory: PathBuf, fps: u32, width: u32, height: u32) -> Self {
        Self { directory, fps, width, height, session: None }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Open a new session named by the current wall-clock time.
    ///
    /// A failure here leaves no partially-open resource behind; the caller
    /// reverts the recording flag. Starting while active is a no-op.
    pub fn start(&mut self) -> Result<(), RecorderError> {
        if self.session.is_some() {
            return Ok(());
        }

        std::fs::create_dir_all(&self.directory).map_err(|e| RecorderError::CreateDirFailed {
            path: self.directory.clone(),
            source: e,
        })?;
        let path = session_path(&self.directory, &Local::now());

        let size = format!("{}x{}", self.width, self.height);
        let mut child = Command::new("ffmpeg")
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-y",
                "-f",
                "rawvideo",
                "-pixel_format",
                "rgb24",
                "-video_size",
                &size,
                "-framerate",
                &self.fps.to_string(),
                "-i",
                "-",
                "-pix_fmt",
                "yuv420p",
            ])
            .arg(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RecorderError::FfmpegNotFound
                } else {
                    RecorderError::SpawnFailed { path: path.clone(), source: e }
                }
            })?;

        let stdin = child.stdin.take();
        info!("Recording started. Saving to {}", path.display());
        self.session = Some(RecordingSession { child, stdin, path, started: Instant::now() });
        Ok(())
    }

    /// Forward one frame to the active session; a no-op while inactive.
    pub fn write_frame(&mut self, frame: &RgbImage) -> Result<(), RecorderError> {
        if let Some(session) = &mut self.session {
            if let Some(stdin) = &mut session.stdin {
                stdin.write_all(frame.as_raw())?;
            }
        }
        Ok(())
    }

    /// Flush and close the active session, reporting its duration and
    /// final path. Stopping while inactive is a no-op.
    pub fn stop(&mut self) -> Option<PathBuf> {
        let mut session = self.session.take()?;

        // Closing stdin lets the encoder drain and finalize the container.
        drop(session.stdin.take());
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match session.child.try_wait() {
                Ok(Some(status)) => {
                    if !status.success() {
                        warn!("Recording encoder exited with {:?}", status.code());
                    }
                    break;
                }
                Ok(None) => {
                    if Instant::now() > deadline {
                        warn!("Recording encoder did not exit; killing it");
                        let _ = session.child.kill();
                        let _ = session.child.wait();
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    warn!("Failed to wait for recording encoder: {}", e);
                    break;
                }
            }
        }

        let elapsed = session.started.elapsed();
        info!(
            "Recording stopped after {:.1}s. Saved to {}",
            elapsed.as_secs_f64(),
            session.path.display()
        );
        Some(session.path)
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if self.is_active() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_session_path_uses_start_timestamp() {
        let started = Local.with_ymd_and_hms(2026, 8, 7, 14, 30, 5).unwrap();
        let path = session_path(Path::new("recordings"), &started);
        assert_eq!(path, Path::new("recordings/2026-08-07_14-30-05.mp4"));
    }

    #[test]
    fn test_inactive_recorder_noops() {
        let mut rec = Recorder::new(PathBuf::from("recordings"), 60, 64, 64);
        assert!(!rec.is_active());
        assert!(rec.stop().is_none());
        let frame = RgbImage::new(64, 64);
        // Writing while inactive must not fail
        rec.write_frame(&frame).unwrap();
    }

    #[test]
    fn test_unwritable_directory_fails_cleanly() {
        // A file where the directory should be makes create_dir_all fail
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let mut rec = Recorder::new(blocker, 60, 64, 64);
        let err = rec.start().unwrap_err();
        assert!(matches!(err, RecorderError::CreateDirFailed { .. }));
        assert!(!rec.is_active());
    }
}
