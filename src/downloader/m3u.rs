//! M3U playlist files.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::M3uPathMode;
use crate::model::TrackDescriptor;
use crate::organizer::relative_to;

/// An open playlist file that tracks are appended to as they finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct M3uPlaylist {
    path: PathBuf,
    paths: M3uPathMode,
    extended: bool,
}

impl M3uPlaylist {
    /// Create (or truncate) `path` with the `#EXTM3U` header.
    pub fn create(path: impl Into<PathBuf>, paths: M3uPathMode, extended: bool) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, "#EXTM3U\n")?;
        tracing::debug!("Created playlist file {:?}", path);
        Ok(Self {
            path,
            paths,
            extended,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry for `file`.
    pub fn add(&self, track: &TrackDescriptor, file: &Path) -> io::Result<()> {
        let mut entry = String::new();
        if self.extended {
            let duration = track
                .duration
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-1".to_string());
            entry.push_str(&format!(
                "#EXTINF:{duration}, {} - {}\n",
                track.primary_artist(),
                track.name
            ));
        }

        let file = std::path::absolute(file)?;
        let location = match self.paths {
            M3uPathMode::Absolute => file,
            M3uPathMode::Relative => {
                let playlist_dir = std::path::absolute(&self.path)?
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default();
                relative_to(&file, &playlist_dir)
            }
        };
        entry.push_str(&location.to_string_lossy());
        entry.push('\n');
        if self.extended {
            entry.push('\n');
        }

        let mut out = OpenOptions::new().append(true).open(&self.path)?;
        out.write_all(entry.as_bytes())
    }

    /// [`add`](Self::add), logging instead of failing.
    pub fn add_or_warn(&self, track: &TrackDescriptor, file: &Path) {
        if let Err(e) = self.add(track, file) {
            tracing::warn!("Failed to add {:?} to {:?}: {}", file, self.path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(name: &str, duration: Option<u32>) -> TrackDescriptor {
        TrackDescriptor {
            name: name.to_string(),
            artists: vec!["Artist".to_string(), "Feature".to_string()],
            duration,
            ..Default::default()
        }
    }

    #[test]
    fn test_extended_relative_entries() {
        let dir = tempfile::tempdir().unwrap();
        let playlist_dir = dir.path().join("Mix");
        let m3u = M3uPlaylist::create(playlist_dir.join("Mix.m3u"), M3uPathMode::Relative, true)
            .unwrap();

        m3u.add(&track("One", Some(215)), &playlist_dir.join("1. One.flac"))
            .unwrap();
        m3u.add(&track("Two", None), &playlist_dir.join("Disc 2").join("2. Two.flac"))
            .unwrap();

        let text = std::fs::read_to_string(m3u.path()).unwrap();
        let disc_path = Path::new("Disc 2").join("2. Two.flac");
        let expected = format!(
            "#EXTM3U\n#EXTINF:215, Artist - One\n1. One.flac\n\n#EXTINF:-1, Artist - Two\n{}\n\n",
            disc_path.display()
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn test_plain_absolute_entries() {
        let dir = tempfile::tempdir().unwrap();
        let m3u =
            M3uPlaylist::create(dir.path().join("Mix.m3u"), M3uPathMode::Absolute, false).unwrap();
        let file = dir.path().join("1. One.flac");
        m3u.add(&track("One", Some(10)), &file).unwrap();

        let text = std::fs::read_to_string(m3u.path()).unwrap();
        assert_eq!(text, format!("#EXTM3U\n{}\n", file.display()));
    }

    #[test]
    fn test_create_truncates_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Mix.m3u");
        std::fs::write(&path, "#EXTM3U\nold entry\n").unwrap();

        M3uPlaylist::create(&path, M3uPathMode::Absolute, true).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "#EXTM3U\n");
    }
}
