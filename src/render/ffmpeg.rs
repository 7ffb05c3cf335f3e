//! ffmpeg-backed thumbnail renderer.
//!
//! Extracts one frame per video with an external ffmpeg process and stores it
//! as `<out_dir>/<sha256(path)>.jpg`. Several argument sets are tried in turn,
//! since some containers only cooperate with deeper probing or input seeking.

use std::ffi::OsString;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose};
use log::{debug, trace};
use sha2::{Digest, Sha256};

use crate::core::entry::ThumbRef;
use crate::core::error::RenderError;
use crate::core::key::ThumbKey;
use crate::core::traits::Renderer;
use crate::settings::ThumbSettings;

/// Env var overriding the ffmpeg binary
pub const FFMPEG_ENV: &str = "VTHUMB_FFMPEG";

/// Bytes of ffmpeg stderr kept in a failure
const STDERR_TAIL: usize = 4096;

/// How a rendered thumbnail is handed back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefStyle {
    /// `data:image/jpeg;base64,...`
    DataUri,
    /// Path of the JPEG on disk
    FilePath,
}

/// Render operation spawning ffmpeg per video.
#[derive(Debug, Clone)]
pub struct FfmpegRenderer {
    ffmpeg: PathBuf,
    out_dir: PathBuf,
    width: u32,
    timeout: Option<Duration>,
    style: RefStyle,
}

impl FfmpegRenderer {
    pub fn new(ffmpeg: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            out_dir: out_dir.into(),
            width: 320,
            timeout: None,
            style: RefStyle::DataUri,
        }
    }

    pub fn from_settings(settings: &ThumbSettings) -> Self {
        let ffmpeg = settings
            .ffmpeg_path
            .clone()
            .unwrap_or_else(locate_ffmpeg);
        Self::new(ffmpeg, settings.thumbs_dir())
            .with_width(settings.thumb_width)
            .with_timeout(settings.render_timeout())
            .with_style(if settings.inline_data_uri { RefStyle::DataUri } else { RefStyle::FilePath })
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = width.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_style(mut self, style: RefStyle) -> Self {
        self.style = style;
        self
    }

    pub fn ffmpeg(&self) -> &Path {
        &self.ffmpeg
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Output file for `key`: sha256 of the path string, hex encoded.
    pub fn thumb_path(&self, key: &ThumbKey) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.to_string_lossy().as_bytes());
        self.out_dir.join(format!("{:x}.jpg", hasher.finalize()))
    }

    /// Argument sets, tried in order until one succeeds.
    pub fn attempts(&self, input: &Path, output: &Path) -> Vec<Vec<OsString>> {
        let scale = format!("scale={}:-1", self.width);
        let probe = ["-analyzeduration", "100M", "-probesize", "100M"];
        let encode = ["-vframes", "1", "-vf", scale.as_str(), "-q:v", "2", "-y"];

        let build = |pre: &[&str], post_input: &[&str]| -> Vec<OsString> {
            let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-nostdin"]
                .iter()
                .map(OsString::from)
                .collect();
            args.extend(pre.iter().map(OsString::from));
            args.push("-i".into());
            args.push(input.as_os_str().to_owned());
            args.extend(post_input.iter().map(OsString::from));
            args.extend(encode.iter().map(OsString::from));
            args.push(output.as_os_str().to_owned());
            args
        };

        vec![
            // 1: output seek just past the first frame
            build(&[], &["-ss", "00:00:00.100"]),
            // 2: same with deeper probing
            build(&probe, &["-ss", "00:00:00.100"]),
            // 3: input seek before probing
            build(&["-ss", "0.1", probe[0], probe[1], probe[2], probe[3]], &[]),
            // 4: no seek, first frame
            build(&probe, &[]),
        ]
    }

    /// Run ffmpeg once, honoring the timeout.
    ///
    /// stderr is always drained while the child runs; a chatty ffmpeg would
    /// otherwise block on a full pipe and never exit.
    fn run(&self, args: &[OsString]) -> Result<(), RenderError> {
        trace!("{} {:?}", self.ffmpeg.display(), args);

        let mut command = Command::new(&self.ffmpeg);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        let spawn_error = |source: std::io::Error| RenderError::Spawn {
            program: self.ffmpeg.clone(),
            source,
        };

        let (status, stderr) = match self.timeout {
            None => {
                let output = command.output().map_err(spawn_error)?;
                (output.status, output.stderr)
            }
            Some(limit) => {
                let mut child = command.spawn().map_err(spawn_error)?;
                let drain = child.stderr.take().map(|mut pipe| {
                    thread::spawn(move || {
                        let mut buf = Vec::new();
                        let _ = pipe.read_to_end(&mut buf);
                        buf
                    })
                });

                let deadline = Instant::now() + limit;
                let status = loop {
                    if let Some(status) = child.try_wait()? {
                        break status;
                    }
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        // Drain thread is left to finish on its own: a helper
                        // process may still hold the pipe open
                        return Err(RenderError::Timeout(limit));
                    }
                    thread::sleep(Duration::from_millis(10));
                };
                let stderr = drain.and_then(|d| d.join().ok()).unwrap_or_default();
                (status, stderr)
            }
        };

        if status.success() {
            return Ok(());
        }
        Err(RenderError::Ffmpeg {
            status: status.code(),
            stderr: stderr_tail(&stderr),
        })
    }

    fn to_ref(&self, thumb: &Path) -> Result<ThumbRef, RenderError> {
        match self.style {
            RefStyle::FilePath => Ok(ThumbRef::new(thumb.to_string_lossy().into_owned())),
            RefStyle::DataUri => {
                let data = fs::read(thumb)?;
                Ok(ThumbRef::new(format!(
                    "data:image/jpeg;base64,{}",
                    general_purpose::STANDARD.encode(data)
                )))
            }
        }
    }
}

/// Keep at most the last `STDERR_TAIL` bytes; the error is at the end.
fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL);
    String::from_utf8_lossy(&stderr[start..]).into_owned()
}

impl Renderer for FfmpegRenderer {
    fn render(&self, key: &ThumbKey) -> Result<ThumbRef, RenderError> {
        let input = key.as_path();
        if !input.exists() {
            return Err(RenderError::InputMissing(input.to_path_buf()));
        }

        let thumb = self.thumb_path(key);
        if thumb.exists() {
            debug!("Reusing {} for {}", thumb.display(), key);
            return self.to_ref(&thumb);
        }

        fs::create_dir_all(&self.out_dir)?;

        let mut last_err = None;
        for (i, args) in self.attempts(input, &thumb).iter().enumerate() {
            match self.run(args) {
                Ok(()) if thumb.exists() => {
                    debug!("ffmpeg strategy {} succeeded for {}", i + 1, key);
                    return self.to_ref(&thumb);
                }
                Ok(()) => {
                    last_err = Some(RenderError::Ffmpeg {
                        status: Some(0),
                        stderr: "no frame written".to_string(),
                    });
                }
                // No point retrying other argument sets with a missing binary
                Err(e @ RenderError::Spawn { .. }) => return Err(e),
                Err(e) => {
                    debug!("ffmpeg strategy {} failed for {}: {}", i + 1, key, e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| RenderError::other("ffmpeg produced no thumbnail")))
    }
}

/// Find ffmpeg: `VTHUMB_FFMPEG` → `binaries/` next to the executable → `PATH`.
pub fn locate_ffmpeg() -> PathBuf {
    if let Some(path) = std::env::var_os(FFMPEG_ENV) {
        return PathBuf::from(path);
    }

    let name = if cfg!(target_os = "windows") { "ffmpeg.exe" } else { "ffmpeg" };

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let bundled = dir.join("binaries").join(name);
            if bundled.is_file() {
                return bundled;
            }
        }
    }

    PathBuf::from(name)
}

/// Result of [`clear_disk_cache`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ClearReport {
    pub files: usize,
    pub bytes: u64,
}

impl std::fmt::Display for ClearReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cleared {} cached thumbnails, freed {:.2} MB",
            self.files,
            self.bytes as f64 / 1024.0 / 1024.0
        )
    }
}

/// Delete every rendered thumbnail in `dir`, then the directory itself.
pub fn clear_disk_cache(dir: &Path) -> Result<ClearReport> {
    let mut report = ClearReport::default();
    if !dir.exists() {
        return Ok(report);
    }

    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        fs::remove_file(&path).with_context(|| format!("Failed to remove {}", path.display()))?;
        report.files += 1;
        report.bytes += size;
    }

    // Leaves the directory in place if something else lives in it
    let _ = fs::remove_dir(dir);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer(out_dir: &Path) -> FfmpegRenderer {
        FfmpegRenderer::new("/nonexistent/bin/ffmpeg", out_dir)
    }

    #[test]
    fn test_thumb_path_is_stable_per_key() {
        let r = renderer(Path::new("/thumbs"));
        let a = r.thumb_path(&ThumbKey::new("/v/a.mp4"));
        assert_eq!(a, r.thumb_path(&ThumbKey::new("/v/./a.mp4")));
        assert_ne!(a, r.thumb_path(&ThumbKey::new("/v/b.mp4")));
        assert_eq!(a.parent(), Some(Path::new("/thumbs")));
        // 64 hex chars + ".jpg"
        assert_eq!(a.file_name().unwrap().len(), 68);
    }

    #[test]
    fn test_attempts_shape() {
        let r = renderer(Path::new("/thumbs")).with_width(200);
        let attempts = r.attempts(Path::new("/v/a.mp4"), Path::new("/thumbs/x.jpg"));
        assert_eq!(attempts.len(), 4);

        for args in &attempts {
            assert_eq!(args.last().unwrap(), "/thumbs/x.jpg");
            assert!(args.iter().any(|a| a == "scale=200:-1"));
            let i = args.iter().position(|a| a == "-i").unwrap();
            assert_eq!(args[i + 1], "/v/a.mp4");
        }

        // strategy 3 seeks before the input, strategy 4 not at all
        let i3 = attempts[2].iter().position(|a| a == "-i").unwrap();
        assert!(attempts[2][..i3].iter().any(|a| a == "-ss"));
        assert!(!attempts[3].iter().any(|a| a == "-ss"));
        assert!(!attempts[0].iter().any(|a| a == "-probesize"));
    }

    #[test]
    fn test_missing_input() {
        let out = tempfile::tempdir().unwrap();
        let err = renderer(out.path()).render(&ThumbKey::new("/definitely/not/here.mp4")).unwrap_err();
        assert!(matches!(err, RenderError::InputMissing(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_unspawnable_ffmpeg() {
        let tmp = tempfile::tempdir().unwrap();
        let video = tmp.path().join("clip.mp4");
        fs::write(&video, b"not really a video").unwrap();

        let err = renderer(&tmp.path().join("thumbs")).render(&ThumbKey::new(&video)).unwrap_err();
        assert!(matches!(err, RenderError::Spawn { .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn test_existing_output_reused() {
        let tmp = tempfile::tempdir().unwrap();
        let video = tmp.path().join("clip.mp4");
        fs::write(&video, b"video").unwrap();

        let out_dir = tmp.path().join("thumbs");
        fs::create_dir_all(&out_dir).unwrap();
        let key = ThumbKey::new(&video);

        let r = renderer(&out_dir);
        fs::write(r.thumb_path(&key), b"jpeg").unwrap();

        // ffmpeg path is bogus, so success proves no process was spawned
        let thumb = r.render(&key).unwrap();
        assert_eq!(thumb.as_str(), "data:image/jpeg;base64,anBlZw==");

        let thumb = r.clone().with_style(RefStyle::FilePath).render(&key).unwrap();
        assert_eq!(Path::new(thumb.as_str()), r.thumb_path(&key));
    }

    /// Executable shell script standing in for ffmpeg. Every call appends
    /// a line to `<script>.calls`.
    #[cfg(unix)]
    fn fake_ffmpeg(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("ffmpeg");
        fs::write(&script, format!("#!/bin/sh\necho call >> \"$0.calls\"\n{}\n", body)).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    fn calls(script: &Path) -> usize {
        let log = format!("{}.calls", script.display());
        fs::read_to_string(log).map(|s| s.lines().count()).unwrap_or(0)
    }

    #[cfg(unix)]
    fn video_in(dir: &Path) -> ThumbKey {
        let video = dir.join("clip.mp4");
        fs::write(&video, b"video").unwrap();
        ThumbKey::new(&video)
    }

    #[cfg(unix)]
    #[test]
    fn test_all_strategies_fail() {
        let tmp = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(tmp.path(), "echo 'moov atom not found' >&2\nexit 1");
        let r = FfmpegRenderer::new(&ffmpeg, tmp.path().join("thumbs"));

        let err = r.render(&video_in(tmp.path())).unwrap_err();
        match &err {
            RenderError::Ffmpeg { status, stderr } => {
                assert_eq!(*status, Some(1));
                assert!(stderr.contains("moov atom not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!err.is_transient());
        assert_eq!(calls(&ffmpeg), 4);
    }

    #[cfg(unix)]
    #[test]
    fn test_success_without_frame() {
        let tmp = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(tmp.path(), "exit 0");
        let r = FfmpegRenderer::new(&ffmpeg, tmp.path().join("thumbs"));

        let err = r.render(&video_in(tmp.path())).unwrap_err();
        assert!(matches!(
            &err,
            RenderError::Ffmpeg { status: Some(0), stderr } if stderr == "no frame written"
        ));
        assert_eq!(calls(&ffmpeg), 4);
    }

    #[cfg(unix)]
    #[test]
    fn test_falls_back_to_unseeked_strategy() {
        let tmp = tempfile::tempdir().unwrap();
        // Refuses any seek, writes its last argument otherwise
        let ffmpeg = fake_ffmpeg(
            tmp.path(),
            "case \" $* \" in *\" -ss \"*) exit 1;; esac\nfor out; do :; done\nprintf jpeg > \"$out\"",
        );
        let r = FfmpegRenderer::new(&ffmpeg, tmp.path().join("thumbs")).with_style(RefStyle::FilePath);
        let key = video_in(tmp.path());

        let thumb = r.render(&key).unwrap();
        assert_eq!(Path::new(thumb.as_str()), r.thumb_path(&key));
        assert_eq!(fs::read(r.thumb_path(&key)).unwrap(), b"jpeg");
        assert_eq!(calls(&ffmpeg), 4);

        // Second render reuses the file
        r.render(&key).unwrap();
        assert_eq!(calls(&ffmpeg), 4);
    }

    #[cfg(unix)]
    #[test]
    fn test_chatty_stderr_does_not_block() {
        let tmp = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(
            tmp.path(),
            "head -c 300000 /dev/zero | tr '\\0' x >&2\necho 'Invalid data found' >&2\nexit 1",
        );
        let key = video_in(tmp.path());

        for timeout in [None, Some(Duration::from_secs(30))] {
            let r = FfmpegRenderer::new(&ffmpeg, tmp.path().join("thumbs")).with_timeout(timeout);
            let key = key.clone();
            let (tx, rx) = crossbeam_channel::bounded(1);
            thread::spawn(move || {
                let _ = tx.send(r.render(&key));
            });

            let err = rx
                .recv_timeout(Duration::from_secs(20))
                .expect("render blocked on a full stderr pipe")
                .unwrap_err();
            match err {
                RenderError::Ffmpeg { status, stderr } => {
                    assert_eq!(status, Some(1));
                    assert!(stderr.len() <= STDERR_TAIL);
                    assert!(stderr.ends_with("Invalid data found\n"));
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_attempt() {
        let tmp = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(tmp.path(), "exec sleep 10");
        let r = FfmpegRenderer::new(&ffmpeg, tmp.path().join("thumbs"))
            .with_timeout(Some(Duration::from_millis(100)));

        let started = Instant::now();
        let err = r.render(&video_in(tmp.path())).unwrap_err();
        assert!(matches!(err, RenderError::Timeout(limit) if limit == Duration::from_millis(100)));
        assert!(err.is_transient());
        // Every strategy timed out, none ran to completion
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(calls(&ffmpeg), 4);
    }

    #[test]
    fn test_stderr_tail() {
        let long = vec![b'x'; STDERR_TAIL + 10];
        assert_eq!(stderr_tail(&long).len(), STDERR_TAIL);
        assert_eq!(stderr_tail(b"short"), "short");
    }

    #[test]
    fn test_clear_disk_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("thumbs");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("a.jpg"), vec![0u8; 1000]).unwrap();
        fs::write(dir.join("b.jpg"), vec![0u8; 24]).unwrap();

        let report = clear_disk_cache(&dir).unwrap();
        assert_eq!(report, ClearReport { files: 2, bytes: 1024 });
        assert!(!dir.exists());

        assert_eq!(clear_disk_cache(&dir).unwrap(), ClearReport::default());
    }
}
