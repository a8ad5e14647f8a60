// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/vigil

//! Frame sources - ffmpeg capture, image sequences, synthetic demo frames

use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, Sender};
use image::Rgb;
use rand::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{Result, VigilError};
use crate::vision::Frame;

/// Yields decoded frames on demand
pub trait FrameSource: Send {
    fn describe(&self) -> String;

    fn is_open(&self) -> bool;

    /// Next frame; `Ok(None)` at end of stream
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Pick a source for a camera identifier: a directory or still image is
/// read as an image sequence, anything else goes through ffmpeg.
pub fn open_source(source: &str, width: u32, height: u32) -> Result<Box<dyn FrameSource>> {
    let path = Path::new(source);
    if path.is_dir() || (path.is_file() && is_image_file(path)) {
        return Ok(Box::new(ImageSequenceSource::open(path)?));
    }
    Ok(Box::new(FfmpegSource::spawn(source, width, height)?))
}

pub(crate) fn parse_device_index(source: &str) -> Option<u32> {
    if let Ok(index) = source.parse::<u32>() {
        return Some(index);
    }
    source
        .strip_prefix("/dev/video")
        .filter(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        .and_then(|rest| rest.parse().ok())
}

/// Arguments for an ffmpeg process that writes rgb24 frames to stdout
pub(crate) fn ffmpeg_args(source: &str, width: u32, height: u32) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostdin"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    if let Some(index) = parse_device_index(source) {
        args.extend(["-f".into(), "video4linux2".into(), "-i".into(), format!("/dev/video{index}")]);
    } else {
        if source.starts_with("rtsp://") {
            args.extend(["-rtsp_transport".into(), "tcp".into()]);
        }
        args.extend(["-i".into(), source.to_string()]);
    }

    args.extend([
        "-an".into(),
        "-vf".into(),
        format!("scale={width}:{height}"),
        "-pix_fmt".into(),
        "rgb24".into(),
        "-f".into(),
        "rawvideo".into(),
        "-".into(),
    ]);
    args
}

type FrameMessage = std::result::Result<Frame, String>;

/// Camera, stream or video file decoded by an ffmpeg subprocess
pub struct FfmpegSource {
    source: String,
    child: Child,
    frames: Receiver<FrameMessage>,
    open: bool,
}

impl FfmpegSource {
    pub fn spawn(source: &str, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(VigilError::Capture(format!("invalid capture size {width}x{height}")));
        }

        let mut child = Command::new("ffmpeg")
            .args(ffmpeg_args(source, width, height))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| VigilError::Capture(format!("failed to start ffmpeg: {e}")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VigilError::Capture("failed to capture ffmpeg stdout".into()))?;

        let (tx, rx) = bounded(4);
        thread::Builder::new()
            .name("vigil-capture".into())
            .spawn(move || read_raw_frames(stdout, width, height, tx))?;

        info!("Capturing {} at {}x{} via ffmpeg", source, width, height);
        Ok(Self {
            source: source.to_string(),
            child,
            frames: rx,
            open: true,
        })
    }
}

fn read_raw_frames(mut stdout: impl Read, width: u32, height: u32, tx: Sender<FrameMessage>) {
    let frame_bytes = width as usize * height as usize * 3;
    loop {
        let mut buffer = vec![0u8; frame_bytes];
        match stdout.read_exact(&mut buffer) {
            Ok(()) => {
                let Some(frame) = Frame::from_raw(width, height, buffer) else {
                    let _ = tx.send(Err("frame buffer size mismatch".into()));
                    break;
                };
                if tx.send(Ok(frame)).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                debug!("ffmpeg stream ended");
                break;
            }
            Err(e) => {
                let _ = tx.send(Err(e.to_string()));
                break;
            }
        }
    }
}

impl FrameSource for FfmpegSource {
    fn describe(&self) -> String {
        format!("ffmpeg:{}", self.source)
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.open {
            return Ok(None);
        }
        match self.frames.recv() {
            Ok(Ok(frame)) => Ok(Some(frame)),
            Ok(Err(message)) => {
                self.open = false;
                Err(VigilError::Capture(message))
            }
            Err(_) => {
                self.open = false;
                Ok(None)
            }
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            debug!("ffmpeg already exited: {}", e);
        }
        let _ = self.child.wait();
    }
}

/// Still images from a directory (sorted by name) or a single file
#[derive(Debug)]
pub struct ImageSequenceSource {
    origin: PathBuf,
    files: Vec<PathBuf>,
    position: usize,
}

impl ImageSequenceSource {
    pub fn open(path: &Path) -> Result<Self> {
        let mut files = if path.is_dir() {
            std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_image_file(p))
                .collect::<Vec<_>>()
        } else if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            return Err(VigilError::Capture(format!("{:?} is not an image or directory", path)));
        };
        files.sort();

        if files.is_empty() {
            warn!("No images found in {:?}", path);
        } else {
            info!("Reading {} image(s) from {:?}", files.len(), path);
        }
        Ok(Self {
            origin: path.to_path_buf(),
            files,
            position: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn describe(&self) -> String {
        format!("images:{}", self.origin.display())
    }

    fn is_open(&self) -> bool {
        self.position < self.files.len()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.position) else {
            return Ok(None);
        };
        self.position += 1;
        let frame = image::open(path)
            .map_err(|e| VigilError::Capture(format!("{}: {e}", path.display())))?
            .to_rgb8();
        Ok(Some(frame))
    }
}

/// Noisy frames with a colored block sweeping across, for demo runs
pub struct SyntheticSource {
    width: u32,
    height: u32,
    block: Rgb<u8>,
    frame_index: u64,
    limit: Option<u64>,
    interval: Duration,
    rng: StdRng,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(4),
            height: height.max(4),
            block: Rgb([220, 20, 60]),
            frame_index: 0,
            limit: None,
            interval: Duration::ZERO,
            rng: StdRng::from_entropy(),
        }
    }

    /// Fixed seed for reproducible frames
    pub fn seeded(width: u32, height: u32, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ..Self::new(width, height)
        }
    }

    pub fn with_block_color(mut self, color: [u8; 3]) -> Self {
        self.block = Rgb(color);
        self
    }

    /// End the stream after `frames` frames
    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    /// Pace frames like a live camera
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn render(&mut self) -> Frame {
        let (w, h) = (self.width, self.height);
        let mut frame = Frame::from_fn(w, h, |_, y| {
            let shade = (40 + y * 60 / h) as u8;
            Rgb([shade, shade, shade.saturating_add(10)])
        });
        for pixel in frame.pixels_mut() {
            let noise: i16 = self.rng.gen_range(-8..=8);
            for channel in pixel.0.iter_mut() {
                *channel = (*channel as i16 + noise).clamp(0, 255) as u8;
            }
        }

        let block_w = (w / 4).max(1);
        let block_h = (h / 3).max(1);
        let travel = (w - block_w).max(1) as u64;
        let x0 = ((self.frame_index * 8) % travel) as u32;
        let y0 = (h - block_h) / 2;
        for y in y0..y0 + block_h {
            for x in x0..x0 + block_w {
                frame.put_pixel(x, y, self.block);
            }
        }
        frame
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        format!("synthetic:{}x{}", self.width, self.height)
    }

    fn is_open(&self) -> bool {
        self.limit.map(|limit| self.frame_index < limit).unwrap_or(true)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.is_open() {
            return Ok(None);
        }
        if !self.interval.is_zero() {
            thread::sleep(self.interval);
        }
        let frame = self.render();
        self.frame_index += 1;
        Ok(Some(frame))
    }
}
