//! Video file discovery for command-line inputs.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Container extensions treated as video
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "m4v", "mkv", "avi", "webm", "wmv", "flv", "mpg", "mpeg", "ts", "mts", "3gp",
];

pub fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.iter().any(|v| v.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Expand inputs into a list of video files.
///
/// Files are taken as given (whatever their extension); directories are
/// listed one level deep, keeping video files only, sorted by name.
pub fn collect_videos(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut videos = Vec::new();

    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(input)
                .with_context(|| format!("Failed to read directory: {}", input.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_video(p))
                .collect();
            found.sort();
            log::debug!("{}: {} videos", input.display(), found.len());
            videos.extend(found);
        } else {
            videos.push(input.clone());
        }
    }

    Ok(videos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_is_video() {
        assert!(is_video(Path::new("/a/clip.mp4")));
        assert!(is_video(Path::new("/a/CLIP.MOV")));
        assert!(!is_video(Path::new("/a/notes.txt")));
        assert!(!is_video(Path::new("/a/noext")));
    }

    #[test]
    fn test_collect_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.mkv", "a.mp4", "readme.md"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("sub.mp4")).unwrap();

        let extra = PathBuf::from("/somewhere/explicit.bin");
        let videos = collect_videos(&[dir.path().to_path_buf(), extra.clone()]).unwrap();

        assert_eq!(
            videos,
            vec![dir.path().join("a.mp4"), dir.path().join("b.mkv"), extra]
        );
    }
}
