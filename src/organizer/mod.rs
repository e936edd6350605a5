//! Destination path resolution and file movement utilities.
//!
//! Collections and tracks are laid out by user-configurable templates such as
//! `{artist}/{name}{explicit}` or `{track_number}. {name}`. Templates are
//! validated against the placeholders each entity provides when the settings
//! are loaded, so a typo fails the run before anything is downloaded.
//!
//! # Features
//! - Placeholder templates with `{{` / `}}` escapes
//! - Sanitized values, zero-filled track and disc numbers
//! - Byte-limited file names that never split a UTF-8 character
//! - Moves that fall back to copy + delete across devices

use crate::model::{AlbumDescriptor, PlaylistDescriptor, TrackDescriptor};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

/// Maximum UTF-8 byte length of the final path component.
pub const FILENAME_BYTE_LIMIT: usize = 250;

/// Longest suffix ever appended to a track stem (`_cover.mp4`).
pub const STEM_SUFFIX_RESERVE: usize = "_cover.mp4".len();

/// Placeholders available in album directory templates.
pub const ALBUM_KEYS: &[&str] = &[
    "name",
    "artist",
    "artist_id",
    "id",
    "release_year",
    "quality",
    "explicit",
    "artist_initials",
    "upc",
];

/// Placeholders available in playlist directory templates.
pub const PLAYLIST_KEYS: &[&str] = &["name", "creator", "creator_id", "release_year", "explicit"];

/// Placeholders available in track file name templates.
pub const TRACK_KEYS: &[&str] = &[
    "name",
    "album",
    "album_artist",
    "artist",
    "artist_id",
    "album_id",
    "id",
    "track_number",
    "total_tracks",
    "disc_number",
    "total_discs",
    "release_year",
    "release_date",
    "isrc",
    "upc",
    "label",
    "composer",
    "explicit",
    "codec",
    "bitrate",
    "bit_depth",
    "sample_rate",
];

// ============================================================================
// Templates
// ============================================================================

/// Errors raised while parsing a path template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("Unknown placeholder {{{key}}} in \"{template}\"")]
    UnknownPlaceholder { template: String, key: String },

    #[error("Unclosed placeholder in \"{template}\"")]
    Unclosed { template: String },

    #[error("Unmatched '}}' in \"{template}\"")]
    UnmatchedBrace { template: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed, validated path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Parse `template`, rejecting placeholders not in `allowed`.
    pub fn parse(template: &str, allowed: &[&str]) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut key = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(ch) => key.push(ch),
                            None => {
                                return Err(TemplateError::Unclosed {
                                    template: template.to_string(),
                                });
                            }
                        }
                    }
                    if !allowed.contains(&key.as_str()) {
                        return Err(TemplateError::UnknownPlaceholder {
                            template: template.to_string(),
                            key,
                        });
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(key));
                }
                '}' => {
                    return Err(TemplateError::UnmatchedBrace {
                        template: template.to_string(),
                    });
                }
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    /// Substitute values; placeholders without a value render empty.
    pub fn render(&self, values: &TemplateValues) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(key) => {
                    if let Some(value) = values.get(key) {
                        out.push_str(value);
                    }
                }
            }
        }
        out
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Placeholder values, sanitized for use as path components.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateValues {
    values: BTreeMap<String, String>,
}

impl TemplateValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a sanitized value.
    pub fn insert(&mut self, key: &str, value: impl AsRef<str>) {
        self.values
            .insert(key.to_string(), sanitize_filename(value.as_ref()));
    }

    /// Insert a value verbatim.
    pub fn insert_raw(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Values for an album directory.
    pub fn for_album(album: &AlbumDescriptor, id: &str) -> Self {
        let mut values = Self::new();
        values.insert("name", &album.name);
        values.insert("artist", &album.artist);
        values.insert("artist_id", &album.artist_id);
        values.insert("id", id);
        values.insert("release_year", opt_to_string(album.release_year));
        values.insert("upc", album.upc.as_deref().unwrap_or_default());
        let quality = album
            .quality
            .as_deref()
            .filter(|q| !q.is_empty())
            .map(|q| format!(" [{q}]"))
            .unwrap_or_default();
        values.insert("quality", quality);
        values.insert_raw("explicit", explicit_marker(album.explicit));
        values.insert_raw("artist_initials", artist_initial(&album.artist).to_string());
        values
    }

    /// Values for a playlist directory.
    pub fn for_playlist(playlist: &PlaylistDescriptor) -> Self {
        let mut values = Self::new();
        values.insert("name", &playlist.name);
        values.insert("creator", &playlist.creator);
        values.insert("creator_id", &playlist.creator_id);
        values.insert("release_year", opt_to_string(playlist.release_year));
        values.insert_raw("explicit", explicit_marker(playlist.explicit));
        values
    }

    /// Values for a track file name.
    ///
    /// `zfill` pads track and disc numbers and totals to that width.
    pub fn for_track(track: &TrackDescriptor, id: &str, zfill: Option<usize>) -> Self {
        let number = |n: Option<u32>| match (n, zfill) {
            (Some(n), Some(width)) => zero_fill(n, width),
            (Some(n), None) => n.to_string(),
            (None, _) => String::new(),
        };
        let tags = &track.tags;

        let mut values = Self::new();
        values.insert("name", &track.name);
        values.insert("album", &track.album);
        values.insert(
            "album_artist",
            tags.album_artist.as_deref().unwrap_or(track.primary_artist()),
        );
        values.insert("artist", track.primary_artist());
        values.insert("artist_id", &track.artist_id);
        values.insert("album_id", &track.album_id);
        values.insert("id", id);
        values.insert("track_number", number(tags.track_number));
        values.insert("total_tracks", number(tags.total_tracks));
        values.insert("disc_number", number(tags.disc_number));
        values.insert("total_discs", number(tags.total_discs));
        values.insert("release_year", opt_to_string(track.release_year));
        values.insert("release_date", tags.release_date.as_deref().unwrap_or_default());
        values.insert("isrc", tags.isrc.as_deref().unwrap_or_default());
        values.insert("upc", tags.upc.as_deref().unwrap_or_default());
        values.insert("label", tags.label.as_deref().unwrap_or_default());
        values.insert("composer", tags.composer.as_deref().unwrap_or_default());
        values.insert_raw("explicit", explicit_marker(track.explicit));
        values.insert("codec", track.codec.as_str());
        values.insert("bitrate", opt_to_string(track.bitrate));
        values.insert("bit_depth", opt_to_string(track.bit_depth));
        values.insert("sample_rate", opt_to_string(track.sample_rate));
        values
    }
}

fn opt_to_string<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn explicit_marker(explicit: Option<bool>) -> &'static str {
    if explicit == Some(true) { " [E]" } else { "" }
}

// ============================================================================
// Name helpers
// ============================================================================

/// Sanitizes a filename by replacing invalid characters and trimming
/// trailing dots and spaces.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect();
    replaced.trim_end_matches(['.', ' ']).to_string()
}

/// Pad `number` with leading zeros to `width` digits.
pub fn zero_fill(number: u32, width: usize) -> String {
    format!("{number:0>width$}")
}

/// Number of digits needed to print `total`.
pub fn zfill_width(total: u32) -> usize {
    total.to_string().len()
}

/// First letter of an artist name for `{artist_initials}` buckets.
///
/// A leading "The " is ignored and accents are folded (`Émilie` -> `E`).
/// Anything that is not a letter maps to `#`.
pub fn artist_initial(artist: &str) -> char {
    let trimmed = artist.trim_start();
    let name = match trimmed.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("the ") => &trimmed[4..],
        _ => trimmed,
    };

    name.chars()
        .next()
        .and_then(|c| c.to_string().nfkd().find(char::is_ascii))
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_uppercase())
        .unwrap_or('#')
}

/// Trim the last component of `path` to at most `limit` UTF-8 bytes.
///
/// Separators are normalized to `/`. Directories are left alone; only the
/// final name is shortened, at a character boundary.
pub fn fix_byte_limit(path: &str, limit: usize) -> String {
    let normalized = path.replace('\\', "/");
    let (dir, name) = match normalized.rfind('/') {
        Some(i) => normalized.split_at(i + 1),
        None => ("", normalized.as_str()),
    };
    if name.len() <= limit {
        return normalized.clone();
    }

    let mut end = limit;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    format!("{dir}{}", &name[..end])
}

/// [`fix_byte_limit`] with the default limit, on a `Path`.
pub fn limit_path(path: &Path) -> PathBuf {
    PathBuf::from(fix_byte_limit(&path.to_string_lossy(), FILENAME_BYTE_LIMIT))
}

/// Like [`limit_path`], leaving room for any suffix added to a track stem.
pub fn limit_stem(stem: &Path) -> PathBuf {
    PathBuf::from(fix_byte_limit(
        &stem.to_string_lossy(),
        FILENAME_BYTE_LIMIT - STEM_SUFFIX_RESERVE,
    ))
}

/// Append `.ext` to a path stem without replacing any dot already in it.
pub fn with_extension(stem: &Path, ext: &str) -> PathBuf {
    let mut name = stem.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Append a suffix such as `_cover.mp4` to a path stem.
pub fn with_suffix(stem: &Path, suffix: &str) -> PathBuf {
    let mut name = stem.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

// ============================================================================
// Filesystem
// ============================================================================

/// Moves a file, creating parent directories. Falls back to copy + delete
/// when a plain rename fails (cross-device).
pub fn move_file(source: &Path, dest: &Path) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    if let Err(e) = fs::rename(source, dest) {
        tracing::debug!("Rename {:?} -> {:?} failed ({}), copying", source, dest, e);
        fs::copy(source, dest)?;
        fs::remove_file(source)?;
    }
    Ok(())
}

/// Remove a file, treating a missing file as success.
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Express `path` relative to the directory `base`.
///
/// Both paths should be absolute (or both relative to the same directory).
pub fn relative_to(path: &Path, base: &Path) -> PathBuf {
    let path: Vec<Component> = path.components().collect();
    let base: Vec<Component> = base.components().collect();
    let common = path
        .iter()
        .zip(base.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..base.len() {
        relative.push("..");
    }
    for component in &path[common..] {
        relative.push(component.as_os_str());
    }
    relative
}
