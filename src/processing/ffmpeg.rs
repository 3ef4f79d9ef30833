//! External-process engine
//!
//! Translates a chain into an ffmpeg `-af` filter graph and runs it over a
//! scratch WAV. The child process is polled so a raised cancel flag can kill
//! it mid-run.

use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use super::ProcessingEngine;
use crate::dsp::{OperationChain, OperationKind, OperationSpec};
use crate::engine::{db_to_linear, import_audio, write_wav, AudioBuffer, CancelFlag};
use crate::error::{MixError, Result};

/// How often a running child is checked for exit or cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Loudness range passed to `loudnorm`
const LOUDNORM_LRA: f64 = 11.0;

/// Smallest side level `stereotools` accepts
const MIN_SIDE_LEVEL: f64 = 0.015625;

/// Echo taps quieter than this are dropped
const MIN_TAP_GAIN: f64 = 0.01;

/// Most taps generated for one delay or reverb
const MAX_TAPS: usize = 8;

/// `aecho` rejects delays above this
const MAX_ECHO_MS: f64 = 90000.0;

/// Engine failure code for a non-zero ffmpeg exit
pub const ENGINE_EXIT: &str = "ENGINE_EXIT";

/// Engine failure code for a missing ffmpeg binary
pub const TOOL_UNAVAILABLE: &str = "TOOL_UNAVAILABLE";

/// Engine that shells out to ffmpeg
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    ffmpeg_path: PathBuf,
}

impl FfmpegEngine {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl ProcessingEngine for FfmpegEngine {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn process(&self, buffer: &AudioBuffer, chain: &OperationChain, cancel: &CancelFlag) -> Result<AudioBuffer> {
        let scratch = ScratchDir::create()?;
        let input = scratch.path().join("in.wav");
        let output = scratch.path().join("out.wav");
        write_wav(buffer, &input, 32)?;

        let graph = filter_graph(chain);
        debug!(graph = %graph, "Running ffmpeg filter graph");

        let args = [
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().into_owned(),
            "-af".to_string(),
            graph,
            // loudnorm upsamples internally; keep the session rate
            "-ar".to_string(),
            buffer.sample_rate.to_string(),
            "-ac".to_string(),
            buffer.num_channels().to_string(),
            "-c:a".to_string(),
            "pcm_f32le".to_string(),
            output.to_string_lossy().into_owned(),
        ];
        run_ffmpeg(&self.ffmpeg_path, &args, scratch.path(), Some(cancel))?;

        import_audio(&output).map_err(|e| MixError::EngineFailure {
            code: ENGINE_EXIT.to_string(),
            reason: format!("ffmpeg output unreadable: {}", e),
        })
    }
}

/// Build the `-af` argument for a chain, one filter per operation in order
pub fn filter_graph(chain: &OperationChain) -> String {
    chain.iter().map(filter_for).collect::<Vec<_>>().join(",")
}

fn filter_for(spec: &OperationSpec) -> String {
    let n = |name: &str| spec.number(name).unwrap_or_default();
    match spec.kind() {
        OperationKind::Eq => match spec.choice("filter").unwrap_or("peak") {
            "low_shelf" => format!("lowshelf=f={}:g={}:t=q:w={}", n("frequency"), n("gain_db"), n("q")),
            "high_shelf" => format!("highshelf=f={}:g={}:t=q:w={}", n("frequency"), n("gain_db"), n("q")),
            _ => format!("equalizer=f={}:t=q:w={}:g={}", n("frequency"), n("q"), n("gain_db")),
        },
        OperationKind::HighPass => format!("highpass=f={}", n("frequency")),
        OperationKind::LowPass => format!("lowpass=f={}", n("frequency")),
        OperationKind::Compression => format!(
            "acompressor=threshold={}dB:ratio={}:attack={}:release={}",
            n("threshold_db"),
            n("ratio"),
            n("attack_ms"),
            n("release_ms")
        ),
        OperationKind::Reverb => reverb_filter(n("room_size"), n("damping"), n("wet"), n("decay_s")),
        OperationKind::Delay => delay_filter(n("time_ms"), n("feedback"), n("mix")),
        OperationKind::StereoWidth => {
            let width = n("width");
            if width < MIN_SIDE_LEVEL {
                "pan=stereo|c0=0.5*c0+0.5*c1|c1=0.5*c0+0.5*c1".to_string()
            } else {
                format!("stereotools=mlev=1:slev={}", width)
            }
        }
        OperationKind::Gain => format!("volume={}dB", n("gain_db")),
        OperationKind::Limiter => format!("alimiter=limit={:.6}", db_to_linear(n("ceiling_db") as f32)),
        OperationKind::LoudnessTarget => format!(
            "loudnorm=I={}:TP={}:LRA={}",
            n("lufs"),
            n("true_peak_db"),
            LOUDNORM_LRA
        ),
    }
}

/// Multi-tap `aecho` approximating a feedback delay
fn delay_filter(time_ms: f64, feedback: f64, mix: f64) -> String {
    let mut delays = Vec::new();
    let mut decays = Vec::new();
    let mut gain = mix;
    let mut at = time_ms;
    while delays.len() < MAX_TAPS && at <= MAX_ECHO_MS && (delays.is_empty() || gain >= MIN_TAP_GAIN) {
        delays.push(format!("{}", at));
        decays.push(format!("{:.4}", gain));
        gain *= feedback;
        at += time_ms;
    }
    format!("aecho=1:1:{}:{}", delays.join("|"), decays.join("|"))
}

/// Dense `aecho` taps decaying 60 dB over `decay_s`, darkened by `damping`
fn reverb_filter(room_size: f64, damping: f64, wet: f64, decay_s: f64) -> String {
    let base_ms = 20.0 + room_size * 60.0;
    let spacing = [1.0, 1.37, 1.73, 2.11, 2.53, 2.97];
    let decay_ms = decay_s * 1000.0;

    let (delays, decays): (Vec<String>, Vec<String>) = spacing
        .iter()
        .map(|k| {
            let at = base_ms * k;
            let gain = (wet * 10f64.powf(-3.0 * at / decay_ms)).max(MIN_TAP_GAIN);
            (format!("{:.1}", at), format!("{:.4}", gain))
        })
        .unzip();

    let echo = format!("aecho=1:{:.3}:{}:{}", 1.0 - wet * 0.3, delays.join("|"), decays.join("|"));
    if damping > 0.0 {
        // Full damping rolls the tail off from 4 kHz
        let cutoff = 20000.0 - damping * 16000.0;
        format!("{},lowpass=f={:.0}", echo, cutoff)
    } else {
        echo
    }
}

/// Run ffmpeg with `args`, polling for exit and for cancellation.
///
/// Stderr goes to a file in `scratch` so a chatty child can never block on a
/// full pipe; its tail becomes the failure reason.
pub(crate) fn run_ffmpeg(ffmpeg: &Path, args: &[String], scratch: &Path, cancel: Option<&CancelFlag>) -> Result<()> {
    let stderr_path = scratch.join("ffmpeg.log");
    let stderr = File::create(&stderr_path)?;

    let mut child = Command::new(ffmpeg)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(stderr))
        .spawn()
        .map_err(|e| MixError::EngineFailure {
            code: if e.kind() == ErrorKind::NotFound {
                TOOL_UNAVAILABLE.to_string()
            } else {
                ENGINE_EXIT.to_string()
            },
            reason: format!("cannot start {}: {}", ffmpeg.display(), e),
        })?;

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if cancel.is_some_and(CancelFlag::is_cancelled) {
            info!("Cancelling ffmpeg (pid {})", child.id());
            // The child may have exited in between; either way, reap it
            let _ = child.kill();
            let _ = child.wait();
            return Err(MixError::Cancelled);
        }
        thread::sleep(POLL_INTERVAL);
    };

    if status.success() {
        return Ok(());
    }

    let log = fs::read_to_string(&stderr_path).unwrap_or_default();
    let tail = log.lines().rev().take(3).collect::<Vec<_>>();
    let tail = tail.into_iter().rev().collect::<Vec<_>>().join(" | ");
    Err(MixError::EngineFailure {
        code: ENGINE_EXIT.to_string(),
        reason: format!("ffmpeg exited with {}: {}", status, tail),
    })
}

/// Temporary directory removed on drop
pub(crate) struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub(crate) fn create() -> Result<Self> {
        let path = std::env::temp_dir().join(format!("mix-engineer-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}
