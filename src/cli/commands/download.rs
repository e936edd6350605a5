//! Download command.

use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{info, warn};

use crate::config::{self, Config};
use crate::convert::FfmpegTranscoder;
use crate::downloader::{Downloader, RunReport, Settings};
use crate::fetch::HttpFetcher;
use crate::metadata::LoftyTagWriter;
use crate::model::DownloadMode;
use crate::service::ServiceRegistry;

/// Load the config from `path`, or the config directory.
pub(super) fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Ok(config::load_from(path)?),
        None => Ok(config::load()),
    }
}

/// Download each id in turn.
///
/// A failing id is reported and the next one attempted; an interrupt stops
/// everything.
pub fn cmd_download(
    rt: &Runtime,
    config_path: Option<&Path>,
    output: Option<&Path>,
    service: &str,
    mode: DownloadMode,
    ids: &[String],
) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(output) = output {
        config.general.download_path = output.to_path_buf();
    }
    let settings = Settings::from_config(&config)?;
    let services = ServiceRegistry::from_config(&config);

    let transcoder = FfmpegTranscoder::new();
    if !settings.conversions.conversions.is_empty() && !transcoder.is_available() {
        warn!("ffmpeg not found, conversions will fail and keep the original files");
    }
    let tagger = LoftyTagWriter::new(settings.tagging.clone());
    let downloader = Downloader::new(
        settings,
        services,
        Arc::new(HttpFetcher::new()?),
        Arc::new(transcoder),
        Arc::new(tagger),
    );

    rt.block_on(async {
        let mut failed = 0;
        for (index, id) in ids.iter().enumerate() {
            info!("Item {}/{}: {} {}", index + 1, ids.len(), mode, id);
            match downloader.download(service, mode, id).await {
                Ok(RunReport::Track(outcome)) if !outcome.is_success() => {
                    eprintln!("Track {id} was not downloaded: {outcome}");
                    failed += 1;
                }
                Ok(report) => println!("{report}"),
                Err(e) if e.is_interrupted() => return Err(anyhow::Error::from(e)),
                Err(e) => {
                    eprintln!("Failed to download {mode} {id}: {e}");
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            anyhow::bail!("{} of {} downloads failed", failed, ids.len());
        }
        Ok(())
    })
}
