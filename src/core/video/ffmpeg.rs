//! ffmpeg / ffprobe process wrappers
//!
//! Decoding stays in an external ffmpeg process: frames arrive as raw RGB24
//! on its stdout, shot cuts come from the `scdet` filter log on stderr.

use crate::core::index::IndexError;
use crate::core::video::frame::DecodedFrame;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

/// `scdet` score threshold used for shot detection.
pub const DEFAULT_SCDET_THRESHOLD: f64 = 2.0;

/// stderr lines kept for a failed decode's error message
const STDERR_TAIL_LINES: usize = 8;

static SCD_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"lavfi\.scd\.time:\s*([0-9]+(?:\.[0-9]+)?)").expect("valid regex"));
static DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Duration:\s*([0-9]+):([0-9]{2}):([0-9]{2}(?:\.[0-9]+)?)").expect("valid regex")
});

#[derive(Debug, Clone, PartialEq)]
pub struct ShotScan {
    pub boundaries: Vec<f64>,
    /// container duration from the `Duration:` line, if ffmpeg printed one
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoProbe {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration: f64,
}

impl VideoProbe {
    pub fn frame_period(&self) -> f64 {
        1.0 / self.fps
    }
}

pub fn parse_scdet_output(output: &str) -> ShotScan {
    let mut boundaries = Vec::new();
    let mut duration = None;

    for line in output.lines() {
        if line.contains("lavfi.scd.score") {
            if let Some(t) = SCD_TIME
                .captures(line)
                .and_then(|c| c[1].parse::<f64>().ok())
            {
                // a cut at 0 is the start of the video, not a boundary
                if t > 0.0 {
                    boundaries.push(t);
                }
            }
        }

        if duration.is_none() {
            if let Some(c) = DURATION.captures(line) {
                let h: f64 = c[1].parse().unwrap_or(0.0);
                let m: f64 = c[2].parse().unwrap_or(0.0);
                let s: f64 = c[3].parse().unwrap_or(0.0);
                duration = Some((h * 60.0 + m) * 60.0 + s);
            }
        }
    }

    ShotScan {
        boundaries,
        duration,
    }
}

/// Parses `30000/1001` or `25` style rates.
pub fn parse_frame_rate(value: &str) -> Option<f64> {
    let value = value.trim();
    let fps = match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => value.parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

/// Parses `key=value` lines printed by `ffprobe -of default=noprint_wrappers=1`.
pub fn parse_probe_output(output: &str) -> Result<VideoProbe, IndexError> {
    let mut width = None;
    let mut height = None;
    let mut fps = None;
    let mut duration = None;

    for line in output.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key.trim() {
            "width" => width = value.trim().parse::<u32>().ok(),
            "height" => height = value.trim().parse::<u32>().ok(),
            "r_frame_rate" => fps = parse_frame_rate(value),
            "duration" => duration = value.trim().parse::<f64>().ok(),
            _ => {}
        }
    }

    match (width, height, fps, duration) {
        (Some(width), Some(height), Some(fps), Some(duration)) if width > 0 && height > 0 => {
            Ok(VideoProbe {
                width,
                height,
                fps,
                duration,
            })
        }
        _ => Err(IndexError::Probe(format!(
            "incomplete ffprobe output: width={:?} height={:?} fps={:?} duration={:?}",
            width, height, fps, duration
        ))),
    }
}

pub fn probe(path: &Path) -> Result<VideoProbe, IndexError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate:format=duration",
            "-of",
            "default=noprint_wrappers=1",
        ])
        .arg(path)
        .output()
        .map_err(|e| IndexError::Probe(format!("failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        return Err(IndexError::Probe(format!(
            "ffprobe failed on {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
}

/// Runs the `scdet` filter over the whole video and collects cut times.
pub fn scan_shots(path: &Path, threshold: f64) -> Result<ShotScan, IndexError> {
    info!("🎬 Scanning shots in {} (t={})", path.display(), threshold);

    let filter = format!("scdet=s=0:t={}", threshold);
    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-nostdin", "-i"])
        .arg(path)
        .args(["-vf", filter.as_str(), "-f", "null", "-"])
        .output()
        .map_err(|e| IndexError::Decode(format!("failed to run ffmpeg: {}", e)))?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        let last = stderr.lines().last().unwrap_or("").trim().to_string();
        return Err(IndexError::Decode(format!(
            "ffmpeg scdet failed on {}: {}",
            path.display(),
            last
        )));
    }

    let scan = parse_scdet_output(&stderr);
    info!("✅ {} shot cuts detected", scan.boundaries.len());
    Ok(scan)
}

/// `{dir}/{stem}_compressed.mp4` next to the source video.
pub fn compressed_path(video: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    video.with_file_name(format!("{}_compressed.mp4", stem))
}

fn compress_args(src: &Path, target: &Path) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostdin", "-y", "-i"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.push(src.to_string_lossy().into_owned());
    // x264 at crf 35 with mono aac, small enough to stream in a browser
    for arg in ["-vcodec", "libx264", "-acodec", "aac", "-ac", "1", "-crf", "35"] {
        args.push(arg.to_string());
    }
    args.push(target.to_string_lossy().into_owned());
    args
}

/// Writes a low-bitrate playback copy of `video` and returns its path.
pub fn compress_for_playback(video: &Path) -> Result<PathBuf, IndexError> {
    let target = compressed_path(video);
    debug!("🗜️ Compressing {} → {}", video.display(), target.display());

    let output = Command::new("ffmpeg")
        .args(compress_args(video, &target))
        .output()?;
    if !output.status.success() {
        return Err(IndexError::Encode(format!(
            "ffmpeg compress failed on {}: {}",
            video.display(),
            stderr_tail(&output.stderr[..], STDERR_TAIL_LINES)
        )));
    }
    Ok(target)
}

/// Forward-only RGB24 frame stream read from an ffmpeg child process.
///
/// Not restartable: a new decode session needs a new `spawn`. Dropping the
/// stream kills the process.
pub struct FfmpegFrames {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    fps: f64,
    frame_number: u64,
    finished: bool,
}

impl FfmpegFrames {
    pub fn spawn(path: &Path, probe: &VideoProbe) -> Result<Self, IndexError> {
        debug!(
            "Spawning ffmpeg decoder for {} ({}x{} @ {:.3} fps)",
            path.display(),
            probe.width,
            probe.height,
            probe.fps
        );

        let mut child = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-i"])
            .arg(path)
            .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| IndexError::Decode("ffmpeg stdout not captured".to_string()))?;
        // drained on its own thread so a chatty decoder never blocks on a full pipe
        let stderr = child
            .stderr
            .take()
            .map(|pipe| thread::spawn(move || stderr_tail(pipe, STDERR_TAIL_LINES)));

        Ok(Self {
            child,
            stdout: BufReader::new(stdout),
            stderr,
            width: probe.width,
            height: probe.height,
            fps: probe.fps,
            frame_number: 0,
            finished: false,
        })
    }

    /// Fills `buf` completely. `Ok(false)` on a clean or truncated end of stream.
    fn read_frame(&mut self, buf: &mut [u8]) -> std::io::Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.stdout.read(&mut buf[filled..]) {
                Ok(0) => {
                    if filled > 0 {
                        warn!(
                            "⚠️ Truncated frame #{} ({} of {} bytes), ending stream",
                            self.frame_number,
                            filled,
                            buf.len()
                        );
                    }
                    return Ok(false);
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    /// Reaps the decoder at end of stream. A non-zero exit is a failed
    /// decode, not a short video.
    fn finish(&mut self) -> Result<(), IndexError> {
        let status = self.child.wait()?;
        let tail = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        match exit_error(status.success(), status.code(), self.frame_number, &tail) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Last `max_lines` lines of `reader`.
fn stderr_tail<R: Read>(reader: R, max_lines: usize) -> String {
    let mut tail = VecDeque::with_capacity(max_lines);
    for line in BufReader::new(reader).lines().map_while(Result::ok) {
        if tail.len() == max_lines {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Vec::from(tail).join("\n")
}

fn exit_error(success: bool, code: Option<i32>, frames: u64, stderr: &str) -> Option<IndexError> {
    if success {
        return None;
    }
    let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
    let stderr = stderr.trim();
    Some(IndexError::Decode(if stderr.is_empty() {
        format!("ffmpeg exited with {} after {} frames", code, frames)
    } else {
        format!("ffmpeg exited with {} after {} frames: {}", code, frames, stderr)
    }))
}

impl Iterator for FfmpegFrames {
    type Item = Result<DecodedFrame, IndexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let mut buf = vec![0u8; DecodedFrame::byte_len(self.width, self.height)];
        match self.read_frame(&mut buf) {
            Ok(true) => {
                let frame_number = self.frame_number;
                self.frame_number += 1;
                let elapsed_ms = (frame_number as f64 / self.fps * 1000.0) as u64;
                Some(Ok(DecodedFrame::new(
                    self.width,
                    self.height,
                    buf,
                    elapsed_ms,
                    frame_number,
                )))
            }
            Ok(false) => {
                self.finished = true;
                self.finish().err().map(Err)
            }
            Err(e) => {
                self.finished = true;
                Some(Err(IndexError::Io(e)))
            }
        }
    }
}

impl Drop for FfmpegFrames {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        debug!("🗑️ ffmpeg decoder released after {} frames", self.frame_number);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCDET_LOG: &str = r#"Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'V3C1-100/00182/00182.mp4':
  Duration: 00:01:02.50, start: 0.000000, bitrate: 1251 kb/s
  Stream #0:0(und): Video: h264 (High) (avc1 / 0x31637661), yuv420p, 640x360, 25 fps
[scdet @ 0x55d0c8a3c2c0] lavfi.scd.score: 12.430, lavfi.scd.time: 4.2
[scdet @ 0x55d0c8a3c2c0] lavfi.scd.score: 7.012, lavfi.scd.time: 17.88
frame= 1562 fps=410 q=-0.0 Lsize=N/A time=00:01:02.48 bitrate=N/A speed=16.4x
[scdet @ 0x55d0c8a3c2c0] lavfi.scd.score: 3.500, lavfi.scd.time: 40
"#;

    #[test]
    fn test_parse_scdet_output() {
        let scan = parse_scdet_output(SCDET_LOG);
        assert_eq!(scan.boundaries, vec![4.2, 17.88, 40.0]);
        assert_eq!(scan.duration, Some(62.5));
    }

    #[test]
    fn test_parse_scdet_skips_cut_at_start() {
        let log = "[scdet @ 0x1] lavfi.scd.score: 40.0, lavfi.scd.time: 0\n\
                   [scdet @ 0x1] lavfi.scd.score: 9.1, lavfi.scd.time: 12.5\n";
        assert_eq!(parse_scdet_output(log).boundaries, vec![12.5]);
    }

    #[test]
    fn test_parse_scdet_ignores_unrelated_lines() {
        let scan = parse_scdet_output("nothing here\nlavfi.scd.time: 3.0\n");
        assert!(scan.boundaries.is_empty());
        assert_eq!(scan.duration, None);
    }

    #[test]
    fn test_parse_duration_hours() {
        let scan = parse_scdet_output("  Duration: 01:02:03.25, start: 0");
        assert_eq!(scan.duration, Some(3723.25));
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let log = (1..=20).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n");
        assert_eq!(stderr_tail(log.as_bytes(), 3), "line 18\nline 19\nline 20");
        assert_eq!(stderr_tail(&b""[..], 3), "");
    }

    #[test]
    fn test_clean_exit_is_end_of_stream() {
        assert!(exit_error(true, Some(0), 120, "").is_none());
        // warnings on a clean exit do not matter
        assert!(exit_error(true, Some(0), 120, "deprecated pixel format").is_none());
    }

    #[test]
    fn test_failed_exit_is_decode_error() {
        let err = exit_error(false, Some(1), 0, "Invalid data found when processing input\n");
        match err {
            Some(IndexError::Decode(msg)) => {
                assert!(msg.contains("exited with 1 after 0 frames"));
                assert!(msg.ends_with("Invalid data found when processing input"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let err = exit_error(false, None, 42, "");
        assert!(matches!(err, Some(IndexError::Decode(msg)) if msg == "ffmpeg exited with signal after 42 frames"));
    }

    #[test]
    fn test_playback_copy_layout() {
        let src = Path::new("/data/00182/00182.mp4");
        let target = compressed_path(src);
        assert_eq!(target, PathBuf::from("/data/00182/00182_compressed.mp4"));

        let args = compress_args(src, &target);
        assert_eq!(args.first().map(String::as_str), Some("-hide_banner"));
        assert_eq!(args.last().map(String::as_str), Some("/data/00182/00182_compressed.mp4"));
        let crf = args.iter().position(|a| a == "-crf").unwrap();
        assert_eq!(args[crf + 1], "35");
        assert!(args.windows(2).any(|w| w[0] == "-i" && w[1] == "/data/00182/00182.mp4"));
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("50/2"), Some(25.0));
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn test_parse_probe_output() {
        let probe =
            parse_probe_output("width=640\nheight=360\nr_frame_rate=25/1\nduration=62.500000\n")
                .unwrap();
        assert_eq!(probe.width, 640);
        assert_eq!(probe.height, 360);
        assert_eq!(probe.fps, 25.0);
        assert_eq!(probe.duration, 62.5);
        assert_eq!(probe.frame_period(), 0.04);
    }

    #[test]
    fn test_parse_probe_output_incomplete() {
        let err = parse_probe_output("width=640\nheight=360\n");
        assert!(matches!(err, Err(IndexError::Probe(_))));
    }
}
