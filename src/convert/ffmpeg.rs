//! ffmpeg command line transcoder.

use std::path::Path;
use std::process::Command;

use super::{ConversionFlags, TranscodeFailure, Transcoder};

/// Transcoder shelling out to the `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    binary: String,
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
        }
    }

    /// Use a specific ffmpeg binary.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Check whether the binary can be executed.
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn arguments(input: &Path, output: &Path, encoder: &str, flags: &ConversionFlags) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().into_owned(),
            "-acodec".to_string(),
            encoder.to_string(),
        ];
        for (key, value) in flags {
            args.push(format!("-{key}"));
            args.push(value.clone());
        }
        args.push("-loglevel".to_string());
        args.push("error".to_string());
        args.push(output.to_string_lossy().into_owned());
        args
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcoder for FfmpegTranscoder {
    fn convert(
        &self,
        input: &Path,
        output: &Path,
        encoder: &str,
        flags: &ConversionFlags,
    ) -> Result<(), TranscodeFailure> {
        let args = Self::arguments(input, output, encoder, flags);
        tracing::debug!("Running {} {}", self.binary, args.join(" "));

        let result = Command::new(&self.binary)
            .args(&args)
            .output()
            .map_err(|e| TranscodeFailure::new(format!("Failed to run {}: {}", self.binary, e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(TranscodeFailure::new(stderr.trim()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments_include_flags_in_order() {
        let mut flags = ConversionFlags::new();
        flags.insert("compression_level".to_string(), "5".to_string());

        let args = FfmpegTranscoder::arguments(
            Path::new("in.wav"),
            Path::new("out.flac"),
            "flac",
            &flags,
        );
        assert_eq!(
            args,
            vec![
                "-hide_banner",
                "-y",
                "-i",
                "in.wav",
                "-acodec",
                "flac",
                "-compression_level",
                "5",
                "-loglevel",
                "error",
                "out.flac",
            ]
        );
    }

    #[test]
    fn test_missing_binary_is_a_failure() {
        let transcoder = FfmpegTranscoder::with_binary("/nonexistent/ffmpeg-binary");
        assert!(!transcoder.is_available());

        let err = transcoder
            .convert(
                Path::new("in.wav"),
                Path::new("out.flac"),
                "flac",
                &ConversionFlags::new(),
            )
            .unwrap_err();
        assert!(err.message.contains("Failed to run"));
        assert_eq!(err.suggested_encoder(), None);
    }
}
