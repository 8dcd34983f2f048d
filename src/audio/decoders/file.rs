use log::{debug, warn};
use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

use crate::audio::AudioDecoder;
use crate::error::DecodeError;
use crate::models::AudioFormat;

/// File decoder for every container and codec symphonia supports
pub struct SymphoniaDecoder {
    path: PathBuf,
    stream: Option<OpenStream>,
    format: AudioFormat,
    total_frames: Option<u64>,
    position: u64,
}

struct OpenStream {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
    sample_buf: Option<SampleBuffer<f32>>,
    /// Interleaved samples decoded but not yet handed out
    pending: Vec<f32>,
    pending_offset: usize,
    /// Frames to drop from the next packets after an inexact seek
    skip_frames: u64,
}

impl SymphoniaDecoder {
    /// Open `path` and probe its first audio track
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DecodeError> {
        let mut decoder = Self {
            path: path.as_ref().to_path_buf(),
            stream: None,
            format: AudioFormat::new(0, 0),
            total_frames: None,
            position: 0,
        };
        decoder.open()?;
        Ok(decoder)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn probe(&mut self) -> Result<OpenStream, DecodeError> {
        let file = File::open(&self.path)
            .map_err(|e| DecodeError::DecodeFailed(format!("Failed to open file: {}", e)))?;
        let media_source = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = self.path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, media_source, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| DecodeError::UnsupportedFormat {
                format: format!("Probe failed: {}", e),
            })?;
        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::UnsupportedFormat {
                format: "No audio track found".to_string(),
            })?;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::UnsupportedFormat {
                format: format!("No decoder for track: {}", e),
            })?;

        let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
        let channels = track.codec_params.channels.map(|c| c.count() as u16).unwrap_or(2);
        self.format = AudioFormat::new(sample_rate, channels);
        self.total_frames = track.codec_params.n_frames;

        debug!(
            "Opened {} ({}, {} frames)",
            self.path.display(),
            self.format,
            self.total_frames.map_or_else(|| "unknown".to_string(), |n| n.to_string())
        );

        Ok(OpenStream {
            track_id: track.id,
            time_base: track.codec_params.time_base,
            decoder,
            reader,
            sample_buf: None,
            pending: Vec::new(),
            pending_offset: 0,
            skip_frames: 0,
        })
    }
}

impl OpenStream {
    /// Decode the next packet of our track into `pending`. Returns false at end of stream.
    fn refill(&mut self, channels: usize) -> Result<bool, DecodeError> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(err) => {
                    return Err(DecodeError::DecodeFailed(format!("Failed to read packet: {}", err)));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(err)) => {
                    warn!("Skipping undecodable packet: {}", err);
                    continue;
                }
                Err(err) => {
                    return Err(DecodeError::DecodeFailed(format!("Failed to decode packet: {}", err)));
                }
            };

            let spec = *decoded.spec();
            let capacity = decoded.capacity();
            let too_small = self
                .sample_buf
                .as_ref()
                .map_or(true, |buf| buf.capacity() < capacity * spec.channels.count());
            if too_small {
                self.sample_buf = Some(SampleBuffer::new(capacity as u64, spec));
            }
            let Some(sample_buf) = self.sample_buf.as_mut() else {
                continue;
            };
            sample_buf.copy_interleaved_ref(decoded);

            let samples = sample_buf.samples();
            let frames = samples.len() / channels.max(1);
            let skip = (self.skip_frames.min(frames as u64)) as usize;
            self.skip_frames -= skip as u64;

            self.pending.clear();
            self.pending.extend_from_slice(&samples[skip * channels..frames * channels]);
            self.pending_offset = 0;

            if !self.pending.is_empty() {
                return Ok(true);
            }
        }
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn open(&mut self) -> Result<(), DecodeError> {
        if self.stream.is_none() {
            let stream = self.probe()?;
            self.stream = Some(stream);
            self.position = 0;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), DecodeError> {
        self.stream = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn total_frames(&self) -> Option<u64> {
        self.total_frames
    }

    fn current_frame(&self) -> u64 {
        self.position
    }

    fn read_frames(&mut self, buffer: &mut [f32], frames: usize) -> Result<usize, DecodeError> {
        let channels = (self.format.channels as usize).max(1);
        let stream = self.stream.as_mut().ok_or(DecodeError::NotOpen)?;
        let frames = frames.min(buffer.len() / channels);
        let mut produced = 0;

        while produced < frames {
            let available = (stream.pending.len() - stream.pending_offset) / channels;
            if available == 0 {
                if !stream.refill(channels)? {
                    break;
                }
                continue;
            }

            let take = available.min(frames - produced);
            let src = &stream.pending[stream.pending_offset..stream.pending_offset + take * channels];
            buffer[produced * channels..(produced + take) * channels].copy_from_slice(src);
            stream.pending_offset += take * channels;
            produced += take;
        }

        self.position += produced as u64;
        Ok(produced)
    }

    fn supports_seeking(&self) -> bool {
        true
    }

    fn seek_to_frame(&mut self, frame: u64) -> Result<u64, DecodeError> {
        let sample_rate = self.format.sample_rate.max(1) as u64;
        let time = Time::new(frame / sample_rate, (frame % sample_rate) as f64 / sample_rate as f64);

        let stream = self.stream.as_mut().ok_or(DecodeError::NotOpen)?;
        let seeked = stream
            .reader
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time,
                    track_id: Some(stream.track_id),
                },
            )
            .map_err(|e| DecodeError::SeekError(format!("Seek to frame {} failed: {}", frame, e)))?;

        stream.decoder.reset();
        stream.pending.clear();
        stream.pending_offset = 0;
        stream.skip_frames = ts_to_frames(
            seeked.required_ts.saturating_sub(seeked.actual_ts),
            self.format.sample_rate,
            stream.time_base,
        );
        self.position = frame;
        Ok(frame)
    }

    fn description(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Convert a duration in track time base units to frames
fn ts_to_frames(ts: u64, sample_rate: u32, time_base: Option<TimeBase>) -> u64 {
    match time_base {
        Some(tb) if tb.denom != 0 => (ts as u128 * sample_rate as u128 * tb.numer as u128 / tb.denom as u128) as u64,
        _ => ts,
    }
}
