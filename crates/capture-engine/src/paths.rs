//! Output path derivation.
//!
//! Every artifact of a session carries the session timestamp in its file
//! name. Camera, audio and cursor files are `temp_<kind>_<ts>.<ext>` next
//! to the screen file; the screen file is the caller's path with `-<ts>`
//! inserted before the extension.

use std::path::{Path, PathBuf};

use capsync_common::config::CursorLogFormat;
use serde::{Deserialize, Serialize};

/// All output paths of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPaths {
    pub session_timestamp: u64,
    pub screen: PathBuf,
    pub camera: Option<PathBuf>,
    pub audio: Option<PathBuf>,
    pub cursor: Option<PathBuf>,
}

impl SessionPaths {
    /// Derive every path from one base path and one timestamp.
    pub fn derive(
        base: &Path,
        session_timestamp: u64,
        camera: bool,
        audio: bool,
        cursor: Option<CursorLogFormat>,
    ) -> Self {
        let dir = base.parent().unwrap_or_else(|| Path::new(""));
        Self {
            session_timestamp,
            screen: timestamped_screen_path(base, session_timestamp),
            camera: camera.then(|| temp_path(dir, "camera", session_timestamp, "mov")),
            audio: audio.then(|| temp_path(dir, "audio", session_timestamp, "mov")),
            cursor: cursor.map(|f| temp_path(dir, "cursor", session_timestamp, f.extension())),
        }
    }

    pub fn all(&self) -> Vec<&Path> {
        let mut paths = vec![self.screen.as_path()];
        paths.extend(self.camera.as_deref());
        paths.extend(self.audio.as_deref());
        paths.extend(self.cursor.as_deref());
        paths
    }
}

/// Insert `-<ts>` before the extension, unless the stem already carries
/// the timestamp.
pub fn timestamped_screen_path(base: &Path, session_timestamp: u64) -> PathBuf {
    let ts = session_timestamp.to_string();
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "recording".to_string());

    if stem.contains(&ts) {
        return base.to_path_buf();
    }

    let file_name = match base.extension() {
        Some(ext) => format!("{stem}-{ts}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{ts}.mov"),
    };
    base.with_file_name(file_name)
}

/// `<dir>/temp_<kind>_<ts>.<ext>`
pub fn temp_path(dir: &Path, kind: &str, session_timestamp: u64, ext: &str) -> PathBuf {
    dir.join(format!("temp_{kind}_{session_timestamp}.{ext}"))
}

/// Replace everything but ASCII alphanumerics with `_`.
pub fn sanitize_app_name(app_name: &str) -> String {
    app_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// `<dir>/temp_window_<i>_<app>_<ts>.mov`
pub fn window_output_path(dir: &Path, index: usize, app_name: &str, session_timestamp: u64) -> PathBuf {
    dir.join(format!(
        "temp_window_{index}_{}_{session_timestamp}.mov",
        sanitize_app_name(app_name)
    ))
}

/// Extract the 13-digit millisecond timestamps embedded in a file name.
pub fn embedded_timestamps(path: &Path) -> Vec<u64> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    name.split(|c: char| !c.is_ascii_digit())
        .filter(|run| run.len() == 13)
        .filter_map(|run| run.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS: u64 = 1_712_345_678_901;

    #[test]
    fn test_every_derived_path_carries_the_same_timestamp() {
        let paths = SessionPaths::derive(
            Path::new("/tmp/out/demo.mov"),
            TS,
            true,
            true,
            Some(CursorLogFormat::Jsonl),
        );

        assert_eq!(paths.screen, PathBuf::from("/tmp/out/demo-1712345678901.mov"));
        assert_eq!(
            paths.camera.as_deref(),
            Some(Path::new("/tmp/out/temp_camera_1712345678901.mov"))
        );
        assert_eq!(
            paths.audio.as_deref(),
            Some(Path::new("/tmp/out/temp_audio_1712345678901.mov"))
        );
        assert_eq!(
            paths.cursor.as_deref(),
            Some(Path::new("/tmp/out/temp_cursor_1712345678901.jsonl"))
        );

        for path in paths.all() {
            assert_eq!(embedded_timestamps(path), vec![TS], "{}", path.display());
        }
    }

    #[test]
    fn test_optional_paths_follow_options() {
        let paths = SessionPaths::derive(Path::new("out.mp4"), TS, false, false, None);
        assert_eq!(paths.screen, PathBuf::from("out-1712345678901.mp4"));
        assert_eq!(paths.all().len(), 1);

        let paths = SessionPaths::derive(
            Path::new("out.mp4"),
            TS,
            false,
            false,
            Some(CursorLogFormat::JsonArray),
        );
        assert_eq!(
            paths.cursor,
            Some(PathBuf::from("temp_cursor_1712345678901.json"))
        );
    }

    #[test]
    fn test_stem_with_timestamp_is_not_suffixed_twice() {
        let base = Path::new("/rec/temp_window_0_Safari_1712345678901.mov");
        assert_eq!(timestamped_screen_path(base, TS), base);
        assert_eq!(embedded_timestamps(base), vec![TS]);
    }

    #[test]
    fn test_missing_extension_defaults_to_mov() {
        assert_eq!(
            timestamped_screen_path(Path::new("/rec/take"), TS),
            PathBuf::from("/rec/take-1712345678901.mov")
        );
    }

    #[test]
    fn test_window_output_path_sanitizes_app_name() {
        assert_eq!(sanitize_app_name("Google Chrome (1)"), "Google_Chrome__1_");
        assert_eq!(
            window_output_path(Path::new("/rec"), 1, "Web Browser", TS),
            PathBuf::from("/rec/temp_window_1_Web_Browser_1712345678901.mov")
        );
    }
}
