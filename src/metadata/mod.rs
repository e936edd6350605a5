//! Audio file tag writing.
//!
//! Uses the lofty crate for format-independent tag access. Resolved track
//! metadata, credits, lyrics and the cover image are written into the
//! primary tag of the file's format (Vorbis comments for FLAC/OGG/Opus,
//! ID3v2 for MP3 and WAV, iTunes atoms for M4A).
//!
//! When writing fails the pipeline keeps the audio and dumps the same data
//! into a `<track>_tags.txt` sidecar with [`write_tag_sidecar`].

use lofty::config::WriteOptions;
use lofty::file::TaggedFileExt;
use lofty::picture::{Picture, PictureType};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, ItemValue, Tag, TagExt, TagItem};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::model::{Container, Credit, TrackDescriptor};
use crate::organizer::with_suffix;

/// Largest picture a FLAC metadata block can hold.
const MAX_PICTURE_BYTES: usize = (1 << 24) - 1;

/// Writes tags into an audio file.
pub trait TagWriter: Send + Sync {
    fn write_tags(
        &self,
        path: &Path,
        cover: Option<&Path>,
        track: &TrackDescriptor,
        credits: &[Credit],
        lyrics: Option<&str>,
        container: Container,
    ) -> Result<()>;
}

/// Options for controlling what metadata gets written
#[derive(Debug, Clone, Default)]
pub struct TagOptions {
    /// Only these tag names are written; empty writes everything
    pub save_tags: Vec<String>,
    /// Rewrite text tags only, leaving embedded pictures alone
    pub overwrite_tags_only: bool,
}

impl TagOptions {
    fn should_save(&self, name: &str) -> bool {
        self.save_tags.is_empty() || self.save_tags.iter().any(|t| t == name)
    }
}

/// Production tag writer.
#[derive(Debug, Clone, Default)]
pub struct LoftyTagWriter {
    options: TagOptions,
}

impl LoftyTagWriter {
    pub fn new(options: TagOptions) -> Self {
        Self { options }
    }
}

impl TagWriter for LoftyTagWriter {
    fn write_tags(
        &self,
        path: &Path,
        cover: Option<&Path>,
        track: &TrackDescriptor,
        credits: &[Credit],
        lyrics: Option<&str>,
        container: Container,
    ) -> Result<()> {
        let tagged_file = Probe::open(path)
            .and_then(|probe| probe.read())
            .map_err(|e| Error::tag_write(path, e.to_string()))?;

        // Get the primary tag type for this format, or start a fresh one
        let tag_type = tagged_file.primary_tag_type();
        let mut tag = tagged_file
            .tag(tag_type)
            .cloned()
            .unwrap_or_else(|| Tag::new(tag_type));

        apply_track(&mut tag, track, container, &self.options);
        apply_credits(&mut tag, credits, container, &self.options);
        if let Some(lyrics) = lyrics.filter(|l| !l.is_empty())
            && self.options.should_save("lyrics")
        {
            tag.insert_text(ItemKey::Lyrics, lyrics.to_string());
        }

        if !self.options.overwrite_tags_only
            && let Some(cover) = cover
        {
            let picture = cover_picture(cover).map_err(|e| Error::tag_write(path, e))?;
            match picture {
                Some(picture) => {
                    tag.remove_picture_type(PictureType::CoverFront);
                    tag.push_picture(picture);
                }
                None => tracing::warn!(
                    "Cover file is larger than {:.2}MB, track will not have a cover embedded",
                    MAX_PICTURE_BYTES as f64 / 1024.0 / 1024.0
                ),
            }
        }

        tag.save_to_path(path, WriteOptions::default())
            .map_err(|e| Error::tag_write(path, e.to_string()))?;
        tracing::debug!("Tagged {:?}", path);
        Ok(())
    }
}

/// Copy descriptor fields into `tag`.
fn apply_track(tag: &mut Tag, track: &TrackDescriptor, container: Container, options: &TagOptions) {
    let tags = &track.tags;

    if options.should_save("title") {
        tag.set_title(track.name.clone());
    }
    if options.should_save("album") && !track.album.is_empty() {
        tag.set_album(track.album.clone());
    }
    if options.should_save("artist") && !track.artists.is_empty() {
        tag.set_artist(track.artists.join(", "));
    }
    if options.should_save("album_artist")
        && let Some(album_artist) = &tags.album_artist
    {
        tag.insert_text(ItemKey::AlbumArtist, album_artist.clone());
    }
    if options.should_save("composer")
        && let Some(composer) = &tags.composer
    {
        tag.insert_text(ItemKey::Composer, composer.clone());
    }

    if options.should_save("track_number")
        && let Some(number) = tags.track_number
    {
        tag.set_track(number);
    }
    if options.should_save("total_tracks")
        && let Some(total) = tags.total_tracks
    {
        tag.set_track_total(total);
    }
    if options.should_save("disc_number")
        && let Some(number) = tags.disc_number
    {
        tag.set_disk(number);
    }
    if options.should_save("total_discs")
        && let Some(total) = tags.total_discs
    {
        tag.set_disk_total(total);
    }

    match (&tags.release_date, track.release_year) {
        (Some(date), _) if options.should_save("date") => {
            tag.insert_text(ItemKey::RecordingDate, date.clone());
        }
        (_, Some(year)) if options.should_save("year") && year > 0 => {
            tag.set_year(year as u32);
        }
        _ => {}
    }

    if options.should_save("genre") && !tags.genres.is_empty() {
        tag.remove_key(&ItemKey::Genre);
        for genre in &tags.genres {
            tag.push(TagItem::new(ItemKey::Genre, ItemValue::Text(genre.clone())));
        }
    }

    let text_fields = [
        ("copyright", ItemKey::CopyrightMessage, &tags.copyright),
        ("isrc", ItemKey::Isrc, &tags.isrc),
        ("upc", ItemKey::Barcode, &tags.upc),
        ("label", ItemKey::Label, &tags.label),
        ("comment", ItemKey::Comment, &tags.comment),
        ("description", ItemKey::Description, &tags.description),
    ];
    for (name, key, value) in text_fields {
        if let Some(value) = value
            && options.should_save(name)
        {
            tag.insert_text(key, value.clone());
        }
    }

    if options.should_save("explicit")
        && let Some(explicit) = track.explicit
    {
        if container == Container::M4a {
            tag.insert_text(
                ItemKey::ParentalAdvisory,
                if explicit { "1" } else { "2" }.to_string(),
            );
        } else {
            tag.insert_text(
                ItemKey::Unknown("RATING".to_string()),
                if explicit { "Explicit" } else { "Clean" }.to_string(),
            );
        }
    }

    // M4A has no standard replay gain atoms
    if container != Container::M4a
        && options.should_save("replay_gain")
        && options.should_save("replay_peak")
        && let (Some(gain), Some(peak)) = (tags.replay_gain, tags.replay_peak)
    {
        tag.insert_text(ItemKey::ReplayGainTrackGain, gain.to_string());
        tag.insert_text(ItemKey::ReplayGainTrackPeak, peak.to_string());
    }

    for (key, value) in &tags.extra_tags {
        if !options.should_save(key) {
            continue;
        }
        if let Some(item_key) = freeform_key(key, container) {
            tag.insert_text(item_key, value.clone());
        }
    }
}

fn apply_credits(tag: &mut Tag, credits: &[Credit], container: Container, options: &TagOptions) {
    for credit in credits {
        if credit.names.is_empty() || !options.should_save(&credit.kind) {
            continue;
        }
        let Some(key) = freeform_key(&credit.kind, container) else {
            continue;
        };
        tag.remove_key(&key);
        for name in &credit.names {
            if !tag.push(TagItem::new(key.clone(), ItemValue::Text(name.clone()))) {
                tracing::debug!("{} credits are not supported in {}", credit.kind, container);
                break;
            }
        }
    }
}

/// Key for a tag name without a standard mapping.
///
/// Only Vorbis comments and iTunes freeform atoms take arbitrary names.
fn freeform_key(name: &str, container: Container) -> Option<ItemKey> {
    match container {
        Container::Flac | Container::Ogg | Container::Opus => {
            Some(ItemKey::Unknown(name.to_uppercase()))
        }
        Container::M4a => Some(ItemKey::Unknown(format!("----:com.apple.iTunes:{name}"))),
        _ => None,
    }
}

/// Read a cover image into a front-cover picture, or `None` if it is too
/// large to embed.
fn cover_picture(path: &Path) -> std::result::Result<Option<Picture>, String> {
    let data = std::fs::read(path).map_err(|e| format!("Failed to read cover {path:?}: {e}"))?;
    if data.len() >= MAX_PICTURE_BYTES {
        return Ok(None);
    }
    let mut picture = Picture::from_reader(&mut data.as_slice())
        .map_err(|e| format!("Unsupported cover image {path:?}: {e}"))?;
    picture.set_pic_type(PictureType::CoverFront);
    Ok(Some(picture))
}

// ============================================================================
// Sidecar
// ============================================================================

/// Dump tags, credits and lyrics into `<stem>_tags.txt`.
///
/// Written when the tag writer fails so the metadata is not lost.
pub fn write_tag_sidecar(
    stem: &Path,
    track: &TrackDescriptor,
    credits: &[Credit],
    lyrics: Option<&str>,
) -> io::Result<PathBuf> {
    let path = with_suffix(stem, "_tags.txt");
    std::fs::write(&path, sidecar_text(track, credits, lyrics))?;
    tracing::info!("Tags saved to {:?}", path);
    Ok(path)
}

fn sidecar_text(track: &TrackDescriptor, credits: &[Credit], lyrics: Option<&str>) -> String {
    let mut lines = Vec::new();
    if let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(&track.tags) {
        for (key, value) in fields {
            if let Some(text) = display_value(&value) {
                lines.push(format!("{key}: {text}"));
            }
        }
    }
    let mut text = lines.join("\n");

    let credit_lines: Vec<String> = credits
        .iter()
        .filter(|c| !c.names.is_empty())
        .map(|c| format!("    {}: {}", c.kind, c.names.join(", ")))
        .collect();
    if !credit_lines.is_empty() {
        text.push_str("\n\ncredits:\n");
        text.push_str(&credit_lines.join("\n"));
    }

    if let Some(lyrics) = lyrics.filter(|l| !l.is_empty()) {
        text.push_str("\n\nlyrics:\n");
        let indented: Vec<String> = lyrics.lines().map(|l| format!("    {l}")).collect();
        text.push_str(&indented.join("\n"));
    }
    text
}

/// Human-readable form of a tag value, `None` for empty values.
fn display_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) if s.is_empty() => None,
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(items) if items.is_empty() => None,
        serde_json::Value::Array(items) => Some(
            items
                .iter()
                .filter_map(display_value)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        serde_json::Value::Object(map) if map.is_empty() => None,
        serde_json::Value::Object(map) => Some(
            map.iter()
                .filter_map(|(k, v)| display_value(v).map(|v| format!("{k}={v}")))
                .collect::<Vec<_>>()
                .join(", "),
        ),
        other => Some(other.to_string()),
    }
}
