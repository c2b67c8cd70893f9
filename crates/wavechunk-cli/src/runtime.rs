//! Command runtime.
//!
//! Opens the media, drives a [`WaveformProvider`] over every chunk of the
//! configured layout and reports the results.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use wavechunk::partition::{TimeSpan, partition};
use wavechunk::source::WaveformSource;
use wavechunk::{
    AnalysisSummary, Bitmap, ChunkLayout, FilePcmSource, MediaWaveform, PcmSource, ReadQueue, RenderSettings, TaskQueue,
    TimeRangeWaveform, WaveformProvider,
};
use wavechunk_types::{ChunkReport, Rgba};

use crate::cli::{LayoutArgs, RenderMode};
use crate::config::RenderRunConfig;

const PUMP_INTERVAL: Duration = Duration::from_millis(50);

/// Render every chunk of `config.path`, then optionally rezoom and render again.
///
/// Returns the reports of the last pass in index order.
pub fn run_render(config: &RenderRunConfig, cancel: &Arc<AtomicBool>) -> Result<Vec<ChunkReport>> {
    let file = FilePcmSource::open_path(&config.path)?;
    let info = file.info();
    tracing::info!(
        path = %config.path.display(),
        sample_rate = info.sample_rate,
        channels = info.channels,
        duration_ms = info.duration.map(|d| d.as_millis() as u64),
        codec = info.codec.as_deref().unwrap_or("unknown"),
        "source"
    );
    let media: Arc<dyn PcmSource> = Arc::new(file);

    let queue = TaskQueue::new("wavechunk-tasks")?;
    let read_queue = ReadQueue::new()?;
    let settings = RenderSettings::new(config.engine.style);
    let dsp = config.engine.dsp;

    match config.mode {
        RenderMode::Media => {
            let source = MediaWaveform::new(settings, dsp, read_queue);
            let mut provider = WaveformProvider::new(source, queue);
            render_passes(&mut provider, media, config, cancel)
        }
        RenderMode::TimeRange => {
            let source = TimeRangeWaveform::new(settings, dsp, read_queue);
            let mut provider = WaveformProvider::new(source, queue);
            let reports = render_passes(&mut provider, media, config, cancel)?;
            if config.rezoom_width.is_some() {
                tracing::info!(reused = provider.source().is_reusing(), "rezoom pass");
            }
            Ok(reports)
        }
    }
}

fn render_passes<S>(
    provider: &mut WaveformProvider<S>,
    media: Arc<dyn PcmSource>,
    config: &RenderRunConfig,
    cancel: &Arc<AtomicBool>,
) -> Result<Vec<ChunkReport>>
where
    S: WaveformSource<Input = Arc<dyn PcmSource>>,
{
    let layout = config.engine.layout(config.total_width);
    let mut reports = render_pass(provider, media.clone(), &layout, config, cancel)?;
    if let Some(width) = config.rezoom_width {
        let layout = config.engine.layout(width);
        reports = render_pass(provider, media, &layout, config, cancel)?;
    }
    Ok(reports)
}

/// Configure `provider` for `layout`, request every chunk and wait for all completions.
fn render_pass<S: WaveformSource>(
    provider: &mut WaveformProvider<S>,
    input: S::Input,
    layout: &ChunkLayout,
    config: &RenderRunConfig,
    cancel: &Arc<AtomicBool>,
) -> Result<Vec<ChunkReport>> {
    if layout.is_empty() {
        return Err(anyhow!("timeline width {} yields no chunks", config.total_width));
    }
    let started = Instant::now();
    let generation = provider.configure(
        input,
        layout,
        Some(Box::new(|summary: AnalysisSummary| {
            tracing::info!(
                generation = %summary.generation,
                finished = summary.finished,
                chunks = summary.chunk_count,
                "analysis done"
            );
        })),
    );

    let reports: Rc<RefCell<Vec<ChunkReport>>> = Rc::default();
    let background = config.engine.style.background;
    for index in 0..layout.len() {
        let Some(size) = layout.pixel_size(index) else {
            continue;
        };
        let sink = reports.clone();
        provider.request_render(index, size, move |bitmap, index| {
            sink.borrow_mut()
                .push(chunk_report(index, generation.0, bitmap.as_ref(), background));
        });
    }

    let deadline = started + config.timeout;
    while !provider.is_idle() {
        if cancel.load(Ordering::Relaxed) {
            provider.cancel_all();
            return Err(anyhow!("cancelled"));
        }
        if Instant::now() >= deadline {
            provider.cancel_all();
            return Err(anyhow!("render timed out after {:?}", config.timeout));
        }
        provider.pump_timeout(PUMP_INTERVAL);
    }

    let mut reports = reports.take();
    reports.sort_by_key(|r| r.index);
    tracing::info!(
        %generation,
        chunks = reports.len(),
        rendered = reports.iter().filter(|r| r.width_px.is_some()).count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "render pass complete"
    );
    Ok(reports)
}

fn chunk_report(
    index: usize,
    generation: u64,
    bitmap: Option<&Bitmap>,
    background: Rgba,
) -> ChunkReport {
    ChunkReport {
        index,
        generation,
        width_px: bitmap.map(|b| b.width),
        height_px: bitmap.map(|b| b.height),
        coverage: bitmap.map(|b| b.coverage(background)),
    }
}

/// Print reports as JSON lines or a plain table.
pub fn print_reports(reports: &[ChunkReport], json: bool) -> Result<()> {
    for report in reports {
        if json {
            println!("{}", serde_json::to_string(report)?);
            continue;
        }
        match (report.width_px, report.height_px, report.coverage) {
            (Some(w), Some(h), Some(coverage)) => {
                println!("chunk {:>4}  {w}x{h}  coverage {:.3}", report.index, coverage)
            }
            _ => println!("chunk {:>4}  no image", report.index),
        }
    }
    Ok(())
}

/// Print how a track of `duration_ms` would be cut for a `total_width` timeline.
pub fn run_layout(args: &LayoutArgs) -> Result<()> {
    let layout = ChunkLayout::from_widths(args.total_width, args.item_width, 0.0, args.scale);
    let span = TimeSpan::from_start(Duration::from_millis(args.duration_ms));
    let specs = partition(span, &layout.weights, layout.scale)
        .ok_or_else(|| anyhow!("cannot partition {} ms over width {}", args.duration_ms, args.total_width))?;
    for spec in specs {
        println!(
            "chunk {:>4}  width {:>8.2}  samples {:>6}  start {:>10.3}s  duration {:>8.3}s",
            spec.index,
            spec.weight,
            spec.target_samples,
            spec.extent.start.as_secs_f64(),
            spec.extent.duration.as_secs_f64(),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use wavechunk::EngineConfig;

    fn write_wav(name: &str, rate: u32, samples: &[i16]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("wavechunk-cli-{name}-{}.wav", std::process::id()));
        let data_len = (samples.len() * 2) as u32;
        let mut bytes = Vec::with_capacity(44 + data_len as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&rate.to_le_bytes());
        bytes.extend_from_slice(&(rate * 2).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn run_config(path: PathBuf, mode: RenderMode, rezoom_width: Option<f64>) -> RenderRunConfig {
        RenderRunConfig {
            path,
            mode,
            total_width: 40.0,
            rezoom_width,
            engine: EngineConfig {
                item_width: 10.0,
                height: 8.0,
                scale: 1.0,
                ..EngineConfig::default()
            },
            json: true,
            timeout: Duration::from_secs(10),
        }
    }

    fn loud_tone(len: usize) -> Vec<i16> {
        (0..len)
            .map(|i| if i % 2 == 0 { 20_000 } else { -20_000 })
            .collect()
    }

    #[test]
    fn media_mode_reports_every_chunk() {
        let path = write_wav("media", 8000, &loud_tone(8000));
        let cancel = Arc::new(AtomicBool::new(false));
        let reports = run_render(&run_config(path.clone(), RenderMode::Media, None), &cancel).unwrap();
        std::fs::remove_file(path).ok();

        assert_eq!(reports.len(), 4);
        for (i, report) in reports.iter().enumerate() {
            assert_eq!(report.index, i);
            assert_eq!(report.width_px, Some(10));
            assert_eq!(report.height_px, Some(8));
            assert!(report.coverage.unwrap() > 0.5);
        }
    }

    #[test]
    fn time_range_mode_rezooms() {
        let path = write_wav("ranges", 8000, &loud_tone(8000));
        let cancel = Arc::new(AtomicBool::new(false));
        let reports =
            run_render(&run_config(path.clone(), RenderMode::TimeRange, Some(80.0)), &cancel).unwrap();
        std::fs::remove_file(path).ok();

        assert_eq!(reports.len(), 8);
        assert!(reports.iter().all(|r| r.width_px == Some(10)));
        assert!(reports.iter().all(|r| r.generation == 2));
    }

    #[test]
    fn cancelled_run_fails() {
        let path = write_wav("cancel", 8000, &loud_tone(8000));
        let cancel = Arc::new(AtomicBool::new(true));
        let err = run_render(&run_config(path.clone(), RenderMode::Media, None), &cancel).unwrap_err();
        std::fs::remove_file(path).ok();
        assert!(err.to_string().contains("cancelled"));
    }

    #[test]
    fn missing_file_fails() {
        let cancel = Arc::new(AtomicBool::new(false));
        let config = run_config(PathBuf::from("/nonexistent/track.wav"), RenderMode::Media, None);
        assert!(run_render(&config, &cancel).is_err());
    }

    #[test]
    fn report_for_missing_bitmap_is_empty() {
        let report = chunk_report(3, 1, None, Rgba::TRANSPARENT);
        assert_eq!(report.index, 3);
        assert!(report.width_px.is_none());
        assert!(report.coverage.is_none());
    }
}
