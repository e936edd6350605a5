//! Codec conversion.
//!
//! [`ConversionRules`] decides whether a downloaded codec should be
//! transcoded and refuses conversions that only lose information or pretend
//! to gain it. [`ConversionEngine`] runs an accepted [`ConversionPlan`]
//! through a [`Transcoder`], writing to a temp file in the destination
//! directory that is only renamed into place once the transcode succeeded.
//!
//! ffmpeg refuses some encoders unless `-strict experimental` is given and
//! names a non-experimental alternative in its error output. The engine
//! retries exactly once with that suggestion.

mod ffmpeg;

pub use ffmpeg::FfmpegTranscoder;

use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::config::AdvancedConfig;
use crate::model::{Codec, Container};
use crate::organizer::{remove_if_exists, with_extension};

/// Matches ffmpeg's "use the non experimental encoder 'x'" hint.
static SUGGESTED_ENCODER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"non experimental encoder '([^']+)'").expect("valid encoder pattern")
});

/// Extra encoder options, e.g. `compression_level = "5"`.
pub type ConversionFlags = BTreeMap<String, String>;

// ============================================================================
// Planning
// ============================================================================

/// An accepted conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionPlan {
    pub source: Codec,
    pub target: Codec,
    pub container: Container,
    pub flags: ConversionFlags,
}

/// Why a configured conversion was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Either side is a spatial codec
    Spatial,
    LossyToLossless,
    LossyToLossy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanDecision {
    /// No conversion configured for this codec
    NoConversion,
    Rejected(RejectReason),
    Planned(ConversionPlan),
}

/// Configured conversions and their guard rails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionRules {
    pub conversions: HashMap<Codec, Codec>,
    pub flags: HashMap<Codec, ConversionFlags>,
    /// Permit lossy to lossless and lossy to lossy conversions
    pub allow_undesirable: bool,
}

impl ConversionRules {
    /// Build rules from the config, skipping entries with unknown codecs.
    pub fn from_config(advanced: &AdvancedConfig) -> Self {
        let mut conversions = HashMap::new();
        for (from, to) in &advanced.codec_conversions {
            match (from.parse::<Codec>(), to.parse::<Codec>()) {
                (Ok(from), Ok(to)) => {
                    conversions.insert(from, to);
                }
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!("Ignoring codec conversion {} -> {}: {}", from, to, e);
                }
            }
        }

        let mut flags = HashMap::new();
        for (codec, options) in &advanced.conversion_flags {
            match codec.parse::<Codec>() {
                Ok(codec) => {
                    flags.insert(codec, options.clone());
                }
                Err(e) => tracing::warn!("Ignoring conversion flags: {}", e),
            }
        }

        Self {
            conversions,
            flags,
            allow_undesirable: advanced.enable_undesirable_conversions,
        }
    }

    /// Decide what to do with a downloaded `source` codec, logging refusals
    /// and permitted undesirable conversions.
    pub fn plan(&self, source: Codec) -> PlanDecision {
        let decision = self.evaluate(source);
        let Some(&target) = self.conversions.get(&source) else {
            return decision;
        };
        let (from, to) = (source.data().pretty_name, target.data().pretty_name);
        match &decision {
            PlanDecision::Rejected(RejectReason::Spatial) => {
                tracing::warn!("Converting spatial formats is not allowed, skipping {} -> {}", from, to);
            }
            PlanDecision::Rejected(reason) => {
                tracing::warn!("Undesirable conversion {} -> {} ({:?}), skipping", from, to, reason);
            }
            PlanDecision::Planned(_) if undesirable(source, target).is_some() => {
                tracing::warn!("Undesirable conversion {} -> {}", from, to);
            }
            _ => {}
        }
        decision
    }

    /// [`plan`](Self::plan) without logging.
    pub fn evaluate(&self, source: Codec) -> PlanDecision {
        let Some(&target) = self.conversions.get(&source) else {
            return PlanDecision::NoConversion;
        };
        if source.is_spatial() || target.is_spatial() {
            return PlanDecision::Rejected(RejectReason::Spatial);
        }
        if let Some(reason) = undesirable(source, target) {
            if !self.allow_undesirable {
                return PlanDecision::Rejected(reason);
            }
        }

        PlanDecision::Planned(ConversionPlan {
            source,
            target,
            container: target.container(),
            flags: self.flags.get(&target).cloned().unwrap_or_default(),
        })
    }

    /// Container a track of `codec` ends up in after conversion.
    pub fn final_container(&self, codec: Codec) -> Container {
        match self.evaluate(codec) {
            PlanDecision::Planned(plan) => plan.container,
            _ => codec.container(),
        }
    }
}

fn undesirable(source: Codec, target: Codec) -> Option<RejectReason> {
    match (source.is_lossless(), target.is_lossless()) {
        (false, true) => Some(RejectReason::LossyToLossless),
        (false, false) => Some(RejectReason::LossyToLossy),
        _ => None,
    }
}

// ============================================================================
// Execution
// ============================================================================

/// A failed transcode, with the tool's error output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TranscodeFailure {
    pub message: String,
}

impl TranscodeFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Encoder the tool suggested instead of an experimental one.
    pub fn suggested_encoder(&self) -> Option<&str> {
        SUGGESTED_ENCODER
            .captures(&self.message)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }
}

/// Something that can transcode one file into another.
pub trait Transcoder: Send + Sync {
    fn convert(
        &self,
        input: &Path,
        output: &Path,
        encoder: &str,
        flags: &ConversionFlags,
    ) -> Result<(), TranscodeFailure>;
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Transcode to {target} failed: {failure}")]
    Transcode {
        target: Codec,
        #[source]
        failure: TranscodeFailure,
    },

    #[error("IO error during conversion: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converted {
    pub path: PathBuf,
    pub codec: Codec,
    pub container: Container,
    /// The pre-conversion file, when it was kept
    pub original: Option<PathBuf>,
}

/// Runs conversion plans.
pub struct ConversionEngine<'a> {
    transcoder: &'a dyn Transcoder,
    keep_original: bool,
}

impl<'a> ConversionEngine<'a> {
    pub fn new(transcoder: &'a dyn Transcoder, keep_original: bool) -> Self {
        Self {
            transcoder,
            keep_original,
        }
    }

    /// Convert `source` according to `plan`, producing `<stem>.<container>`.
    ///
    /// On failure the source file is left untouched.
    pub fn execute(
        &self,
        plan: &ConversionPlan,
        source: &Path,
        stem: &Path,
    ) -> Result<Converted, ConversionError> {
        let dir = match stem.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let temp = tempfile::Builder::new()
            .prefix(".convert-")
            .suffix(&format!(".{}", plan.container.extension()))
            .tempfile_in(dir)?
            .into_temp_path();

        let encoder = plan.target.encoder_name();
        tracing::info!("Converting to {}", plan.target.data().pretty_name);
        if let Err(failure) = self
            .transcoder
            .convert(source, &temp, &encoder, &plan.flags)
        {
            let Some(suggested) = failure.suggested_encoder().map(str::to_string) else {
                return Err(ConversionError::Transcode {
                    target: plan.target,
                    failure,
                });
            };
            tracing::info!("Encoder {} is experimental, trying {}", encoder, suggested);
            self.transcoder
                .convert(source, &temp, &suggested, &plan.flags)
                .map_err(|failure| ConversionError::Transcode {
                    target: plan.target,
                    failure,
                })?;
        }

        let dest = with_extension(stem, plan.container.extension());
        let same_file = dest == source;
        if same_file {
            remove_if_exists(source)?;
        }
        temp.persist(&dest).map_err(|e| e.error)?;

        let original = if same_file {
            None
        } else if self.keep_original {
            Some(source.to_path_buf())
        } else {
            remove_if_exists(source)?;
            None
        };

        tracing::debug!("Converted {:?} -> {:?}", source, dest);
        Ok(Converted {
            path: dest,
            codec: plan.target,
            container: plan.container,
            original,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockTranscoder;

    fn rules(pairs: &[(Codec, Codec)], allow_undesirable: bool) -> ConversionRules {
        ConversionRules {
            conversions: pairs.iter().copied().collect(),
            flags: HashMap::new(),
            allow_undesirable,
        }
    }

    fn flac_to_aac_plan() -> ConversionPlan {
        ConversionPlan {
            source: Codec::Flac,
            target: Codec::Aac,
            container: Container::M4a,
            flags: ConversionFlags::new(),
        }
    }

    #[test]
    fn test_plan_decisions() {
        let rules = rules(
            &[
                (Codec::Flac, Codec::Mp3),
                (Codec::Mp3, Codec::Flac),
                (Codec::Aac, Codec::Opus),
                (Codec::Atmos, Codec::Flac),
            ],
            false,
        );

        assert!(matches!(rules.plan(Codec::Flac), PlanDecision::Planned(_)));
        assert_eq!(
            rules.plan(Codec::Mp3),
            PlanDecision::Rejected(RejectReason::LossyToLossless)
        );
        assert_eq!(
            rules.plan(Codec::Aac),
            PlanDecision::Rejected(RejectReason::LossyToLossy)
        );
        assert_eq!(
            rules.plan(Codec::Atmos),
            PlanDecision::Rejected(RejectReason::Spatial)
        );
        assert_eq!(rules.plan(Codec::Wav), PlanDecision::NoConversion);
    }

    #[test]
    fn test_undesirable_allowed_but_spatial_never() {
        let rules = rules(
            &[(Codec::Mp3, Codec::Flac), (Codec::Flac, Codec::Ac4)],
            true,
        );
        assert!(matches!(rules.plan(Codec::Mp3), PlanDecision::Planned(_)));
        assert_eq!(
            rules.plan(Codec::Flac),
            PlanDecision::Rejected(RejectReason::Spatial)
        );
    }

    #[test]
    fn test_rules_from_config() {
        let mut advanced = AdvancedConfig::default();
        advanced
            .codec_conversions
            .insert("bogus".to_string(), "flac".to_string());

        let rules = ConversionRules::from_config(&advanced);
        assert_eq!(rules.conversions.get(&Codec::Alac), Some(&Codec::Flac));
        assert_eq!(rules.conversions.len(), 2);

        let PlanDecision::Planned(plan) = rules.plan(Codec::Wav) else {
            panic!("WAV -> FLAC should be planned");
        };
        assert_eq!(plan.container, Container::Flac);
        assert_eq!(plan.flags["compression_level"], "5");
        assert_eq!(rules.final_container(Codec::Alac), Container::Flac);
        assert_eq!(rules.final_container(Codec::Mp3), Container::Mp3);
    }

    #[test]
    fn test_suggested_encoder_parsing() {
        let failure = TranscodeFailure::new(
            "The encoder 'aac' is experimental but experimental codecs are not enabled, \
             add '-strict -2' if you want to use it. Alternatively use the non experimental encoder 'libfdk_aac'.",
        );
        assert_eq!(failure.suggested_encoder(), Some("libfdk_aac"));
        assert_eq!(TranscodeFailure::new("No such file").suggested_encoder(), None);
    }

    #[test]
    fn test_experimental_encoder_retried_once() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("01. Song.flac");
        std::fs::write(&source, b"flac").unwrap();

        let transcoder = MockTranscoder::new()
            .fail_with("aac", "Alternatively use the non experimental encoder 'libfdk_aac'.");
        let engine = ConversionEngine::new(&transcoder, false);

        let converted = engine
            .execute(&flac_to_aac_plan(), &source, &dir.path().join("01. Song"))
            .unwrap();

        assert_eq!(
            transcoder.encoders_used(),
            vec!["aac".to_string(), "libfdk_aac".to_string()]
        );
        assert_eq!(converted.path, dir.path().join("01. Song.m4a"));
        assert!(converted.path.exists());
        assert!(!source.exists());
        assert_eq!(converted.original, None);
    }

    #[test]
    fn test_second_failure_is_not_retried_again() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("song.flac");
        std::fs::write(&source, b"flac").unwrap();

        let transcoder = MockTranscoder::new()
            .fail_with("aac", "use the non experimental encoder 'libfdk_aac'")
            .fail_with("libfdk_aac", "use the non experimental encoder 'aac'");
        let engine = ConversionEngine::new(&transcoder, false);

        let err = engine
            .execute(&flac_to_aac_plan(), &source, &dir.path().join("song"))
            .unwrap_err();
        assert!(matches!(err, ConversionError::Transcode { .. }));
        assert_eq!(transcoder.encoders_used().len(), 2);
        // Source untouched, no temp files left
        assert!(source.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_keep_original() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("song.flac");
        std::fs::write(&source, b"flac").unwrap();

        let transcoder = MockTranscoder::new();
        let engine = ConversionEngine::new(&transcoder, true);
        let converted = engine
            .execute(&flac_to_aac_plan(), &source, &dir.path().join("song"))
            .unwrap();

        assert_eq!(converted.original, Some(source.clone()));
        assert!(source.exists());
        assert!(converted.path.exists());
    }
}
