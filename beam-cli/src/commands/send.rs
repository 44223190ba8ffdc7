use std::{path::PathBuf, sync::Arc};

use beam_core::{
    advisory::advise,
    channel::tcp::TcpPeer,
    config::BeamConfig,
    direct::DirectSender,
    relay::{HttpObjectStore, RelaySender},
    Batch, ModeSelector, SessionMode,
};

use crate::{progress::BatchProgress, render::display_code, AppError};

#[derive(Clone, Debug, clap::Args)]
#[clap(name = "send", about = "Share files through a scannable code")]
pub struct SendFiles {
    #[clap(value_parser, required = true, help = "Files to share")]
    files: Vec<PathBuf>,
    #[clap(
        long,
        short,
        help = "direct or relay (default: the configured mode)"
    )]
    mode: Option<SessionMode>,
    #[clap(
        long,
        action,
        conflicts_with = "mode",
        help = "Pick the mode from the size and type of the files"
    )]
    auto: bool,
    #[clap(long, help = "Address to listen on in direct mode")]
    bind: Option<String>,
    #[clap(long, help = "Host to put into the code instead of the bound one")]
    advertise: Option<String>,
}

impl SendFiles {
    pub async fn run(&self) -> Result<(), AppError> {
        let mut config = BeamConfig::load()?;
        if let Some(bind) = &self.bind {
            config.direct.bind = bind.clone();
        }
        if let Some(advertise) = &self.advertise {
            config.direct.advertise = Some(advertise.clone());
        }

        let mut batch = Batch::new();
        for path in &self.files {
            batch.push_path(path).await?;
        }

        let mode = if self.auto {
            SessionMode::recommend(
                &batch.records(),
                config.relay.recommend_max_bytes,
            )
        } else {
            self.mode.unwrap_or(config.default_mode)
        };
        config.default_mode = mode;
        if mode == SessionMode::Relay && config.relay.endpoint.is_none() {
            return Err(AppError::RelayNotConfigured);
        }
        config.validate()?;

        let mut selector = ModeSelector::new(mode);
        selector.select(&batch)?;
        log::info!("sharing {} file(s) in {} mode", batch.len(), mode);

        for file in batch.files() {
            let advice =
                advise(None, &file.record, config.advisory_timeout()).await;
            println!(
                "{} ({} bytes): {}",
                file.record.name, file.record.size, advice
            );
        }

        match mode {
            SessionMode::Direct => {
                send_direct(&config, batch, &mut selector).await
            }
            SessionMode::Relay => {
                send_relay(&config, batch, &mut selector).await
            }
        }
    }
}

async fn send_direct(
    config: &BeamConfig,
    batch: Batch,
    selector: &mut ModeSelector,
) -> Result<(), AppError> {
    let provider = TcpPeer::bind(
        &config.direct.bind,
        config.direct.advertise.as_deref(),
        config.tcp_config(),
    )
    .await?;
    let progress = Arc::new(BatchProgress::new(batch.len()));
    let mut sender = DirectSender::new(Arc::new(provider), batch);
    sender.subscribe(progress.clone());

    let payload = sender.share()?;
    let code = payload.encode()?;
    selector.hold(payload)?;
    selector.begin_session();
    display_code(&code, "Scan to receive");

    let result = tokio::select! {
        result = sender.wait() => result.map_err(AppError::TransferFailed),
        _ = tokio::signal::ctrl_c() => {
            sender.terminate();
            Err(AppError::Cancelled)
        }
    };
    selector.end_session();

    match &result {
        Ok(()) => progress.finish("Done"),
        Err(_) => progress.abandon("Failed"),
    }
    result
}

async fn send_relay(
    config: &BeamConfig,
    batch: Batch,
    selector: &mut ModeSelector,
) -> Result<(), AppError> {
    let endpoint = config
        .relay
        .endpoint
        .clone()
        .ok_or(AppError::RelayNotConfigured)?;
    let store = HttpObjectStore::new(
        endpoint,
        config.relay.upload_token.clone().unwrap_or_default(),
    );
    let progress = Arc::new(BatchProgress::new(batch.len()));
    let sender = RelaySender::new(Arc::new(store), config.relay_config());
    sender.subscribe(progress.clone());

    selector.begin_session();
    let result = tokio::select! {
        result = sender.share(&batch) => {
            result.map_err(AppError::TransferFailed)
        }
        _ = tokio::signal::ctrl_c() => Err(AppError::Cancelled),
    };
    selector.end_session();

    let payload = match result {
        Ok(payload) => {
            progress.finish("Uploaded");
            payload
        }
        Err(e) => {
            progress.abandon("Failed");
            return Err(e);
        }
    };
    display_code(&payload.encode()?, "Scan to download");
    Ok(())
}
