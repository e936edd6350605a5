//! Quality gate for resolved tracks.
//!
//! Decides whether the stream a service resolved actually satisfies the
//! requested [`QualityTier`]. Pure decision logic: the caller decides what to
//! do with a rejection (the pipeline logs it and skips the track).
//!
//! | Tier       | Admitted streams                                                   |
//! |------------|--------------------------------------------------------------------|
//! | `lossless` | FLAC, ALAC, WAV                                                    |
//! | `hifi`     | FLAC with unknown depth, depth > 16, or 16 bit above 44.1 kHz     |
//! | `high`     | MP3/AAC/HE-AAC/Vorbis/Opus at >= 256 kbps                          |
//! | `medium`   | same codecs, 128 <= kbps < 256                                     |
//! | `low`      | same codecs, < 128 kbps                                            |
//! | other      | everything                                                         |

use std::fmt;

use crate::model::{Codec, QualityTier, TrackDescriptor};

/// Lossy codecs the bitrate tiers apply to.
const LOSSY_CODECS: [Codec; 5] = [
    Codec::Mp3,
    Codec::Aac,
    Codec::Heaac,
    Codec::Vorbis,
    Codec::Opus,
];

/// Whether a stream with the given parameters satisfies `tier`.
///
/// `bitrate` is in kbps and `sample_rate` in kHz. A missing bitrate never
/// satisfies a bitrate rule.
pub fn admits(
    tier: &QualityTier,
    codec: Codec,
    bitrate: Option<u32>,
    bit_depth: Option<u32>,
    sample_rate: Option<f32>,
) -> bool {
    let lossy = LOSSY_CODECS.contains(&codec);
    match tier {
        QualityTier::Lossless => matches!(codec, Codec::Flac | Codec::Alac | Codec::Wav),
        QualityTier::Hifi => {
            codec == Codec::Flac
                && match bit_depth {
                    None => true,
                    Some(depth) if depth > 16 => true,
                    Some(16) => sample_rate.is_some_and(|rate| rate > 44.1),
                    Some(_) => false,
                }
        }
        QualityTier::High => lossy && bitrate.is_some_and(|kbps| kbps >= 256),
        QualityTier::Medium => lossy && bitrate.is_some_and(|kbps| (128..256).contains(&kbps)),
        QualityTier::Low => lossy && bitrate.is_some_and(|kbps| kbps < 128),
        QualityTier::Unknown(_) => true,
    }
}

/// Why a track was refused, with everything that was observed.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityRejection {
    pub tier: QualityTier,
    pub codec: Codec,
    pub bitrate: Option<u32>,
    pub bit_depth: Option<u32>,
    pub sample_rate: Option<f32>,
    /// Set when the descriptor itself carried an error
    pub error: Option<String>,
}

impl fmt::Display for QualityRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "requested quality \"{}\" unavailable (codec: {}, bitrate: {}, bit depth: {}, sample rate: {})",
            self.tier,
            self.codec,
            display_opt(self.bitrate),
            display_opt(self.bit_depth),
            display_opt(self.sample_rate),
        )?;
        if let Some(error) = &self.error {
            write!(f, ": {error}")?;
        }
        Ok(())
    }
}

fn display_opt<T: fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "None".to_string())
}

/// Run the gate against a resolved descriptor.
///
/// Errored descriptors and `NONE` codecs are always rejected.
pub fn check(tier: &QualityTier, track: &TrackDescriptor) -> Result<(), QualityRejection> {
    let admitted = track.error.is_none()
        && track.codec != Codec::None
        && admits(
            tier,
            track.codec,
            track.bitrate,
            track.bit_depth,
            track.sample_rate,
        );

    if admitted {
        Ok(())
    } else {
        Err(QualityRejection {
            tier: tier.clone(),
            codec: track.codec,
            bitrate: track.bitrate,
            bit_depth: track.bit_depth,
            sample_rate: track.sample_rate,
            error: track.error.clone(),
        })
    }
}
