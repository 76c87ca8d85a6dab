//! Frame acquisition from a capture device or a replayed file.
//!
//! An ffmpeg child decodes the source to raw rgb24 on its stdout; the loop
//! reads one frame per iteration. File replay is paced to real time and
//! ends the stream at EOF; device capture paces itself at the device rate.
//! The blocking `read_frame` call is the loop's pacing point; a producer
//! thread feeding a bounded channel could replace it behind the same
//! frame-per-call contract if acquisition latency ever becomes a problem.

use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use image::RgbImage;
use log::{debug, info, warn};
use serde::Deserialize;
use thiserror::Error;

/// Where frames come from: a capture device index or a video file.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Source {
    Device(u32),
    File(PathBuf),
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Device(index) => write!(f, "device {}", index),
            Source::File(path) => write!(f, "file {}", path.display()),
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("ffmpeg not found; it is required for frame acquisition")]
    FfmpegNotFound,
    #[error("failed to start decoder: {0}")]
    SpawnFailed(std::io::Error),
    #[error("frame read failed: {0}")]
    ReadFailed(std::io::Error),
    #[error("video source failed:\n{stderr}")]
    SourceFailed { stderr: String },
    #[error("device capture is not supported on this platform")]
    UnsupportedPlatform,
}

/// A running decode child yielding fixed-size rgb24 frames.
pub struct FrameSource {
    child: Child,
    stdout: ChildStdout,
    stderr_thread: Option<JoinHandle<Vec<String>>>,
    width: u32,
    height: u32,
}

impl FrameSource {
    /// Spawn the decoder for `source`, scaling its output to the requested
    /// frame size.
    pub fn open(source: &Source, width: u32, height: u32) -> Result<Self, CaptureError> {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error"]);

        match source {
            Source::File(path) => {
                info!("Opening video file {}...", path.display());
                // -re paces the replay at the file's native rate
                cmd.arg("-re").arg("-i").arg(path);
            }
            Source::Device(index) => {
                info!("Opening camera {}...", index);
                device_input_args(&mut cmd, *index)?;
            }
        }

        let size = format!("{}x{}", width, height);
        cmd.args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-s", &size, "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CaptureError::FfmpegNotFound
            } else {
                CaptureError::SpawnFailed(e)
            }
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CaptureError::SpawnFailed(std::io::Error::other("no decoder stdout")))?;

        // Collect stderr on a side thread so a chatty decoder can't block
        let stderr_thread = child.stderr.take().map(|stderr| {
            thread::spawn(move || {
                let reader = BufReader::new(stderr);
                let mut lines = Vec::new();
                for line in reader.lines() {
                    match line {
                        Ok(l) => {
                            debug!("[ffmpeg] {}", l);
                            lines.push(l);
                        }
                        Err(_) => break,
                    }
                }
                lines
            })
        });

        Ok(Self { child, stdout, stderr_thread, width, height })
    }

    /// Read the next frame.
    ///
    /// `Ok(None)` means the source ended cleanly (replay EOF or a closed
    /// device); a decoder that died mid-stream surfaces its stderr.
    pub fn read_frame(&mut self) -> Result<Option<RgbImage>, CaptureError> {
        let mut buf = vec![0u8; self.width as usize * self.height as usize * 3];
        match self.stdout.read_exact(&mut buf) {
            Ok(()) => RgbImage::from_raw(self.width, self.height, buf)
                .map(Some)
                .ok_or_else(|| {
                    CaptureError::ReadFailed(std::io::Error::other("frame buffer size mismatch"))
                }),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                let status = self.child.wait().map_err(CaptureError::ReadFailed)?;
                if status.success() {
                    Ok(None)
                } else {
                    Err(CaptureError::SourceFailed { stderr: self.take_stderr().join("\n") })
                }
            }
            Err(e) => Err(CaptureError::ReadFailed(e)),
        }
    }

    /// Terminate the decoder: SIGINT first, then a bounded wait, then kill.
    pub fn shutdown(&mut self) {
        if matches!(self.child.try_wait(), Ok(Some(_))) {
            return;
        }

        #[cfg(unix)]
        unsafe {
            libc::kill(self.child.id() as i32, libc::SIGINT);
        }
        #[cfg(not(unix))]
        {
            let _ = self.child.kill();
        }

        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) => {
                    if Instant::now() > deadline {
                        let _ = self.child.kill();
                        let _ = self.child.wait();
                        break;
                    }
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    warn!("Failed to wait for decoder: {}", e);
                    break;
                }
            }
        }
    }

    fn take_stderr(&mut self) -> Vec<String> {
        self.stderr_thread
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default()
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(target_os = "linux")]
fn device_input_args(cmd: &mut Command, index: u32) -> Result<(), CaptureError> {
    cmd.args(["-f", "v4l2", "-i"]).arg(format!("/dev/video{}", index));
    Ok(())
}

#[cfg(target_os = "macos")]
fn device_input_args(cmd: &mut Command, index: u32) -> Result<(), CaptureError> {
    cmd.args(["-f", "avfoundation", "-framerate", "30", "-i"]).arg(index.to_string());
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn device_input_args(_cmd: &mut Command, _index: u32) -> Result<(), CaptureError> {
    Err(CaptureError::UnsupportedPlatform)
}
