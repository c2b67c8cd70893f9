//! 16-bit PCM block readers.
//!
//! Analysis reads media as a stream of interleaved little-endian `i16` blocks.
//! [`FilePcmSource`] decodes files with Symphonia; [`MemoryPcmSource`] serves
//! samples that are already in memory (tests, generated signals).

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions};
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use crate::partition::TimeSpan;

/// Sample encoding of the blocks handed to the analyzer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PcmEncoding {
    LinearPcm,
}

/// Output settings requested from the decoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PcmOutputSettings {
    pub encoding: PcmEncoding,
    pub bit_depth: u16,
    pub big_endian: bool,
    pub float: bool,
    pub interleaved: bool,
}

impl PcmOutputSettings {
    /// Interleaved, little-endian, signed 16-bit integers.
    pub const LINEAR_16: PcmOutputSettings = PcmOutputSettings {
        encoding: PcmEncoding::LinearPcm,
        bit_depth: 16,
        big_endian: false,
        float: false,
        interleaved: true,
    };
}

impl Default for PcmOutputSettings {
    fn default() -> Self {
        Self::LINEAR_16
    }
}

/// Layout of the sample stream produced by a [`PcmBlockReader`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub settings: PcmOutputSettings,
}

impl PcmFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            settings: PcmOutputSettings::LINEAR_16,
        }
    }

    /// Frames covered by `duration`, rounded to the nearest frame.
    pub fn frames_for(&self, duration: Duration) -> u64 {
        (duration.as_secs_f64() * self.sample_rate as f64).round() as u64
    }

    /// Interleaved samples (frames × channels) covered by `duration`.
    pub fn samples_for(&self, duration: Duration) -> usize {
        (self.frames_for(duration) as usize).saturating_mul(self.channels as usize)
    }
}

/// Sequential reader of interleaved `i16` sample blocks.
pub trait PcmBlockReader: Send {
    fn format(&self) -> PcmFormat;

    /// Total interleaved samples this reader is expected to yield, `0` when unknown.
    fn expected_samples(&self) -> usize;

    /// Next block of samples, `Ok(None)` at end of stream.
    fn next_block(&mut self) -> Result<Option<Vec<i16>>>;
}

/// Media that can be opened (repeatedly) for reading, optionally restricted to a span.
pub trait PcmSource: Send + Sync {
    /// Short label used in logs.
    fn describe(&self) -> String;

    /// Total media duration, when known.
    fn duration(&self) -> Option<Duration>;

    /// Open a fresh reader positioned at `span.start` that stops after `span.duration`.
    fn open(&self, span: Option<TimeSpan>) -> Result<Box<dyn PcmBlockReader>>;
}

/// Metadata captured while probing a file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SourceInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub duration: Option<Duration>,
    /// Codec name (best-effort).
    pub codec: Option<String>,
}

/// Symphonia-backed source for an audio file on disk.
#[derive(Clone, Debug)]
pub struct FilePcmSource {
    path: PathBuf,
    info: SourceInfo,
}

impl FilePcmSource {
    /// Probe `path` and capture its stream layout.
    ///
    /// Fails when the file cannot be opened, the container is not recognised, or
    /// the default track does not declare a sample rate and channel layout.
    pub fn open_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let format = probe_file(&path)?;
        let track = format
            .default_track()
            .ok_or_else(|| anyhow!("No default audio track"))?;
        let info = source_info_from_params(&track.codec_params)?;
        tracing::debug!(
            path = %path.display(),
            sample_rate = info.sample_rate,
            channels = info.channels,
            codec = info.codec.as_deref().unwrap_or("unknown"),
            "probed media"
        );
        Ok(Self { path, info })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> &SourceInfo {
        &self.info
    }
}

impl PcmSource for FilePcmSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn duration(&self) -> Option<Duration> {
        self.info.duration
    }

    fn open(&self, span: Option<TimeSpan>) -> Result<Box<dyn PcmBlockReader>> {
        let mut format = probe_file(&self.path)?;
        let track = format
            .default_track()
            .ok_or_else(|| anyhow!("No default audio track"))?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();
        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .with_context(|| format!("create decoder for {}", self.path.display()))?;
        let pcm = PcmFormat::new(self.info.sample_rate, self.info.channels);

        let mut skip_samples = 0usize;
        if let Some(span) = span {
            if !span.start.is_zero() {
                let time = Time::new(
                    span.start.as_secs(),
                    f64::from(span.start.subsec_nanos()) / 1_000_000_000.0,
                );
                let seeked = format
                    .seek(
                        SeekMode::Accurate,
                        SeekTo::Time {
                            time,
                            track_id: Some(track_id),
                        },
                    )
                    .with_context(|| format!("seek {} to {:?}", self.path.display(), span.start))?;
                let lead_frames = seeked.required_ts.saturating_sub(seeked.actual_ts) as usize;
                skip_samples = lead_frames.saturating_mul(pcm.channels as usize);
            }
        }

        let (expected, remaining) = match span {
            Some(span) => {
                let samples = pcm.samples_for(span.duration);
                (samples, Some(samples))
            }
            None => {
                let frames = codec_params.n_frames.unwrap_or(0) as usize;
                (frames.saturating_mul(pcm.channels as usize), None)
            }
        };

        Ok(Box::new(SymphoniaBlockReader {
            format,
            decoder,
            track_id,
            pcm,
            expected,
            remaining,
            skip_samples,
        }))
    }
}

struct SymphoniaBlockReader {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    pcm: PcmFormat,
    expected: usize,
    remaining: Option<usize>,
    skip_samples: usize,
}

impl PcmBlockReader for SymphoniaBlockReader {
    fn format(&self) -> PcmFormat {
        self.pcm
    }

    fn expected_samples(&self) -> usize {
        self.expected
    }

    fn next_block(&mut self) -> Result<Option<Vec<i16>>> {
        loop {
            if self.remaining == Some(0) {
                return Ok(None);
            }

            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(_) => return Ok(None), // EOF
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(_) => continue,
            };

            let mut sample_buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, *decoded.spec());
            sample_buf.copy_interleaved_ref(decoded);
            let mut samples = sample_buf.samples();

            if self.skip_samples > 0 {
                let skipped = self.skip_samples.min(samples.len());
                samples = &samples[skipped..];
                self.skip_samples -= skipped;
            }
            if let Some(remaining) = self.remaining.as_mut() {
                if samples.len() > *remaining {
                    samples = &samples[..*remaining];
                }
                *remaining -= samples.len();
            }
            if samples.is_empty() {
                continue;
            }
            return Ok(Some(samples.to_vec()));
        }
    }
}

fn probe_file(path: &Path) -> Result<Box<dyn FormatReader>> {
    let file = File::open(path).with_context(|| format!("open {:?}", path))?;
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("probe {:?}", path))?;
    Ok(probed.format)
}

fn source_info_from_params(params: &CodecParameters) -> Result<SourceInfo> {
    let sample_rate = params
        .sample_rate
        .ok_or_else(|| anyhow!("Unknown sample rate"))?;
    let channels = params
        .channels
        .ok_or_else(|| anyhow!("Unknown channels"))?
        .count();
    Ok(SourceInfo {
        sample_rate,
        channels: u16::try_from(channels).context("channel count")?,
        duration: duration_from_codec_params(params),
        codec: codec_name_from_params(params),
    })
}

/// Best-effort duration from codec metadata.
///
/// Returns `None` if the container does not provide total frames or sample rate.
fn duration_from_codec_params(params: &CodecParameters) -> Option<Duration> {
    let frames = params.n_frames?;
    let rate = params.sample_rate? as u64;
    if rate == 0 {
        return None;
    }
    Some(Duration::from_nanos(
        (frames as u128 * 1_000_000_000 / rate as u128).min(u64::MAX as u128) as u64,
    ))
}

fn codec_name_from_params(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name.to_string())
}

/// In-memory interleaved samples served in fixed-size blocks.
#[derive(Clone, Debug)]
pub struct MemoryPcmSource {
    format: PcmFormat,
    samples: Arc<[i16]>,
    block_frames: usize,
}

impl MemoryPcmSource {
    pub fn new(sample_rate: u32, channels: u16, samples: impl Into<Arc<[i16]>>) -> Self {
        Self {
            format: PcmFormat::new(sample_rate, channels),
            samples: samples.into(),
            block_frames: 1024,
        }
    }

    /// Frames per block returned by `next_block`.
    pub fn with_block_frames(mut self, block_frames: usize) -> Self {
        self.block_frames = block_frames.max(1);
        self
    }

    fn channels(&self) -> usize {
        self.format.channels.max(1) as usize
    }
}

impl PcmSource for MemoryPcmSource {
    fn describe(&self) -> String {
        format!(
            "memory ({} samples @ {} Hz)",
            self.samples.len(),
            self.format.sample_rate
        )
    }

    fn duration(&self) -> Option<Duration> {
        if self.format.sample_rate == 0 {
            return None;
        }
        let frames = (self.samples.len() / self.channels()) as f64;
        Some(Duration::from_secs_f64(frames / self.format.sample_rate as f64))
    }

    fn open(&self, span: Option<TimeSpan>) -> Result<Box<dyn PcmBlockReader>> {
        if self.format.sample_rate == 0 {
            return Err(anyhow!("Unknown sample rate"));
        }
        let channels = self.channels();
        let (start, end) = match span {
            Some(span) => {
                let start = (self.format.frames_for(span.start) as usize).saturating_mul(channels);
                let len = self.format.samples_for(span.duration);
                let start = start.min(self.samples.len());
                (start, start.saturating_add(len).min(self.samples.len()))
            }
            None => (0, self.samples.len()),
        };
        Ok(Box::new(MemoryBlockReader {
            format: self.format,
            samples: self.samples.clone(),
            pos: start,
            end,
            block: self.block_frames.saturating_mul(channels),
        }))
    }
}

struct MemoryBlockReader {
    format: PcmFormat,
    samples: Arc<[i16]>,
    pos: usize,
    end: usize,
    block: usize,
}

impl PcmBlockReader for MemoryBlockReader {
    fn format(&self) -> PcmFormat {
        self.format
    }

    fn expected_samples(&self) -> usize {
        self.end - self.pos.min(self.end)
    }

    fn next_block(&mut self) -> Result<Option<Vec<i16>>> {
        if self.pos >= self.end {
            return Ok(None);
        }
        let next = (self.pos + self.block).min(self.end);
        let block = self.samples[self.pos..next].to_vec();
        self.pos = next;
        Ok(Some(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symphonia::core::codecs::*;

    fn write_test_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
        let data_len = (samples.len() * 2) as u32;
        let mut bytes = Vec::with_capacity(44 + samples.len() * 2);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * channels as u32 * 2).to_le_bytes());
        bytes.extend_from_slice(&(channels * 2).to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        std::fs::write(path, bytes).unwrap();
    }

    fn temp_wav(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("wavechunk-{name}-{}.wav", std::process::id()))
    }

    fn read_all(reader: &mut dyn PcmBlockReader) -> Vec<i16> {
        let mut out = Vec::new();
        while let Some(block) = reader.next_block().unwrap() {
            assert!(!block.is_empty());
            out.extend(block);
        }
        out
    }

    #[test]
    fn file_source_reads_whole_wav() {
        let path = temp_wav("whole");
        let samples: Vec<i16> = (0..8000).map(|i| ((i % 400) * 50 - 10_000) as i16).collect();
        write_test_wav(&path, 8000, 1, &samples);

        let source = FilePcmSource::open_path(&path).unwrap();
        assert_eq!(source.info().sample_rate, 8000);
        assert_eq!(source.info().channels, 1);
        assert_eq!(source.duration(), Some(Duration::from_secs(1)));

        let mut reader = source.open(None).unwrap();
        assert_eq!(reader.expected_samples(), 8000);
        assert_eq!(reader.format().settings, PcmOutputSettings::LINEAR_16);
        assert_eq!(read_all(reader.as_mut()), samples);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn file_source_honours_span() {
        let path = temp_wav("span");
        let samples: Vec<i16> = (0..8000).map(|i| (i % 3000) as i16).collect();
        write_test_wav(&path, 8000, 1, &samples);

        let source = FilePcmSource::open_path(&path).unwrap();
        let span = TimeSpan::new(Duration::from_millis(500), Duration::from_millis(250));
        let mut reader = source.open(Some(span)).unwrap();
        assert_eq!(reader.expected_samples(), 2000);
        assert_eq!(read_all(reader.as_mut()), samples[4000..6000].to_vec());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn file_source_rejects_missing_and_garbage_files() {
        assert!(FilePcmSource::open_path("/definitely/not/here.wav").is_err());

        let path = temp_wav("garbage");
        std::fs::write(&path, b"this is not audio at all").unwrap();
        assert!(FilePcmSource::open_path(&path).is_err());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn memory_source_serves_blocks_and_spans() {
        let samples: Vec<i16> = (0..1000).collect();
        let source = MemoryPcmSource::new(100, 2, samples.clone()).with_block_frames(64);
        assert_eq!(source.duration(), Some(Duration::from_secs(5)));

        let mut reader = source.open(None).unwrap();
        assert_eq!(reader.expected_samples(), 1000);
        let first = reader.next_block().unwrap().unwrap();
        assert_eq!(first.len(), 128);

        let span = TimeSpan::new(Duration::from_secs(1), Duration::from_secs(2));
        let mut reader = source.open(Some(span)).unwrap();
        assert_eq!(reader.expected_samples(), 400);
        assert_eq!(read_all(reader.as_mut()), samples[200..600].to_vec());
    }

    #[test]
    fn memory_source_clips_span_past_end() {
        let source = MemoryPcmSource::new(10, 1, vec![1i16; 50]);
        let span = TimeSpan::new(Duration::from_secs(4), Duration::from_secs(4));
        let mut reader = source.open(Some(span)).unwrap();
        assert_eq!(read_all(reader.as_mut()).len(), 10);
    }

    #[test]
    fn memory_source_requires_sample_rate() {
        let source = MemoryPcmSource::new(0, 1, vec![0i16; 4]);
        assert!(source.open(None).is_err());
        assert!(source.duration().is_none());
    }

    #[test]
    fn duration_from_codec_params_handles_zero_rate() {
        let mut params = CodecParameters::new();
        params.sample_rate = Some(0);
        params.n_frames = Some(100);
        assert!(duration_from_codec_params(&params).is_none());

        params.sample_rate = Some(48_000);
        params.n_frames = Some(96_000);
        assert_eq!(duration_from_codec_params(&params), Some(Duration::from_secs(2)));
    }

    #[test]
    fn codec_name_from_params_maps_known_codecs() {
        let mut params = CodecParameters::new();
        params.codec = CODEC_TYPE_FLAC;
        assert_eq!(codec_name_from_params(&params), Some("FLAC".to_string()));
        params.codec = CODEC_TYPE_PCM_S16LE;
        assert_eq!(codec_name_from_params(&params), Some("PCM_S16".to_string()));
    }
}
