// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/vigil

//! Alarm sound playback

use std::path::Path;

use tracing::info;
#[cfg(not(feature = "audio"))]
use tracing::warn;

use crate::error::Result;
#[cfg(feature = "audio")]
use crate::error::VigilError;

/// Blocking sound playback
pub trait AudioOutput: Send {
    fn name(&self) -> &str;

    /// Play the file to completion
    fn play_blocking(&mut self, path: &Path) -> Result<()>;
}

/// Pick the playback backend once at startup
pub fn audio_output(enabled: bool) -> Box<dyn AudioOutput> {
    if !enabled {
        return Box::new(SilentAudio);
    }

    #[cfg(feature = "audio")]
    {
        Box::new(CpalAudio)
    }

    #[cfg(not(feature = "audio"))]
    {
        warn!("Audio support not compiled in (enable the 'audio' feature); alarm sound will be skipped");
        Box::new(SilentAudio)
    }
}

/// Used when audio is disabled or unavailable
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentAudio;

impl AudioOutput for SilentAudio {
    fn name(&self) -> &str {
        "silent"
    }

    fn play_blocking(&mut self, path: &Path) -> Result<()> {
        info!("Audio output disabled; not playing {:?}", path);
        Ok(())
    }
}

/// Decoded WAV clip, planar channels scaled to [-1, 1]
#[cfg(feature = "audio")]
#[derive(Debug, Clone, PartialEq)]
pub struct WavClip {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

#[cfg(feature = "audio")]
fn hw(e: impl std::fmt::Display) -> VigilError {
    VigilError::Hardware(e.to_string())
}

#[cfg(feature = "audio")]
impl WavClip {
    /// Decode integer PCM (8 to 32 bit) or float WAV data
    pub fn open(path: &Path) -> Result<Self> {
        let mut reader = hound::WavReader::open(path).map_err(hw)?;
        let spec = reader.spec();
        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(VigilError::Hardware(format!("{:?} has no channels or sample rate", path)));
        }

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<Vec<f32>, _>>(),
            hound::SampleFormat::Int => {
                let scale = (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<Vec<f32>, _>>()
            }
        }
        .map_err(hw)?;

        let count = spec.channels as usize;
        let mut channels = vec![Vec::with_capacity(interleaved.len() / count); count];
        for frame in interleaved.chunks_exact(count) {
            for (channel, value) in channels.iter_mut().zip(frame) {
                channel.push(*value);
            }
        }

        Ok(Self {
            sample_rate: spec.sample_rate,
            channels,
        })
    }

    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Interleaved samples for an output device.
    ///
    /// Mono is duplicated across outputs and multi-channel clips are folded
    /// for a mono device before resampling.
    pub fn render(&self, out_rate: u32, out_channels: u16) -> Result<Vec<f32>> {
        let out_channels = out_channels.max(1) as usize;
        if self.frames() == 0 || out_rate == 0 {
            return Ok(Vec::new());
        }

        let mapped: Vec<Vec<f32>> = if out_channels == 1 && self.channels.len() > 1 {
            let n = self.channels.len() as f32;
            vec![(0..self.frames())
                .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() / n)
                .collect()]
        } else {
            (0..out_channels)
                .map(|ch| self.channels[ch % self.channels.len()].clone())
                .collect()
        };

        let planar = resample(mapped, self.sample_rate, out_rate)?;
        let frames = planar.first().map_or(0, Vec::len);
        let mut out = Vec::with_capacity(frames * out_channels);
        for i in 0..frames {
            out.extend(planar.iter().map(|c| c[i]));
        }
        Ok(out)
    }
}

#[cfg(feature = "audio")]
const RESAMPLE_CHUNK: usize = 1024;

/// Sinc resampling of planar channels
#[cfg(feature = "audio")]
fn resample(channels: Vec<Vec<f32>>, from: u32, to: u32) -> Result<Vec<Vec<f32>>> {
    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
    };

    if from == to {
        return Ok(channels);
    }

    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler =
        SincFixedIn::<f32>::new(to as f64 / from as f64, 1.0, params, RESAMPLE_CHUNK, channels.len()).map_err(hw)?;

    let frames = channels.first().map_or(0, Vec::len);
    let mut out = vec![Vec::new(); channels.len()];
    let mut append = |chunk: Vec<Vec<f32>>| {
        for (dst, src) in out.iter_mut().zip(chunk) {
            dst.extend(src);
        }
    };

    let mut pos = 0;
    while pos + resampler.input_frames_next() <= frames {
        let n = resampler.input_frames_next();
        let input: Vec<&[f32]> = channels.iter().map(|c| &c[pos..pos + n]).collect();
        append(resampler.process(input.as_slice(), None).map_err(hw)?);
        pos += n;
    }
    if pos < frames {
        let input: Vec<&[f32]> = channels.iter().map(|c| &c[pos..]).collect();
        append(resampler.process_partial(Some(input.as_slice()), None).map_err(hw)?);
    }
    // flush the filter delay
    append(resampler.process_partial(None::<&[&[f32]]>, None).map_err(hw)?);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_output_succeeds() {
        let mut audio = audio_output(false);
        assert_eq!(audio.name(), "silent");
        assert!(audio.play_blocking(Path::new("/nonexistent.wav")).is_ok());
    }

    #[cfg(feature = "audio")]
    mod wav {
        use super::super::*;
        use std::path::PathBuf;

        fn write_wav(name: &str, channels: u16, rate: u32, samples: &[i16]) -> PathBuf {
            let dir = std::env::temp_dir().join(format!("vigil-wav-{}", uuid::Uuid::new_v4()));
            std::fs::create_dir_all(&dir).unwrap();
            let path = dir.join(name);
            let spec = hound::WavSpec {
                channels,
                sample_rate: rate,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };
            let mut writer = hound::WavWriter::create(&path, spec).unwrap();
            for s in samples {
                writer.write_sample(*s).unwrap();
            }
            writer.finalize().unwrap();
            path
        }

        fn cleanup(path: &Path) {
            if let Some(dir) = path.parent() {
                std::fs::remove_dir_all(dir).ok();
            }
        }

        #[test]
        fn test_decode_pcm16_scales_and_splits_channels() {
            let path = write_wav("stereo.wav", 2, 8_000, &[0, 16_384, -32_768, 32_767]);
            let clip = WavClip::open(&path).unwrap();
            assert_eq!(clip.sample_rate, 8_000);
            assert_eq!(clip.channels.len(), 2);
            assert_eq!(clip.frames(), 2);
            assert_eq!(clip.channels[0], vec![0.0, -1.0]);
            assert_eq!(clip.channels[1][0], 0.5);
            cleanup(&path);
        }

        #[test]
        fn test_open_rejects_non_wave() {
            let dir = std::env::temp_dir().join(format!("vigil-wav-{}", uuid::Uuid::new_v4()));
            std::fs::create_dir_all(&dir).unwrap();
            let path = dir.join("sound.wav");
            std::fs::write(&path, b"OggS not a wav file").unwrap();
            assert!(matches!(WavClip::open(&path), Err(VigilError::Hardware(_))));
            std::fs::remove_dir_all(&dir).ok();
        }

        #[test]
        fn test_render_same_rate_duplicates_mono() {
            let clip = WavClip {
                sample_rate: 8_000,
                channels: vec![vec![0.0, 0.5, -0.5]],
            };
            let out = clip.render(8_000, 2).unwrap();
            assert_eq!(out, vec![0.0, 0.0, 0.5, 0.5, -0.5, -0.5]);
        }

        #[test]
        fn test_render_folds_stereo_to_mono() {
            let clip = WavClip {
                sample_rate: 8_000,
                channels: vec![vec![1.0, 0.0], vec![0.0, -1.0]],
            };
            assert_eq!(clip.render(8_000, 1).unwrap(), vec![0.5, -0.5]);
        }

        #[test]
        fn test_render_resamples_to_device_rate() {
            let clip = WavClip {
                sample_rate: 8_000,
                channels: vec![(0..4_000).map(|i| (i as f32 * 0.05).sin() * 0.5).collect()],
            };
            let out = clip.render(16_000, 1).unwrap();
            let expected = 8_000.0;
            assert!(
                (out.len() as f64 - expected).abs() < expected * 0.1,
                "got {} samples",
                out.len()
            );
            assert!(out.iter().all(|v| v.abs() <= 1.0));
        }
    }
}
