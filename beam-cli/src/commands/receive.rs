use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use beam_core::{
    channel::tcp::TcpPeer,
    config::BeamConfig,
    direct::DirectReceiver,
    relay::RelayReceiver,
    ReceivedFile, SessionMode, SignalingPayload,
};

use crate::{progress::BatchProgress, AppError};

#[derive(Clone, Debug, clap::Args)]
#[clap(name = "receive", about = "Receive the files behind a scanned code")]
pub struct ReceiveFiles {
    #[clap(value_parser, help = "The scanned code")]
    code: String,
    #[clap(long, short, help = "Directory to save the files in")]
    out: Option<PathBuf>,
}

impl ReceiveFiles {
    pub async fn run(&self) -> Result<(), AppError> {
        let payload = SignalingPayload::decode(&self.code)
            .map_err(AppError::from_decode)?;
        let config = BeamConfig::load()?;
        let out_dir = self.out.clone().unwrap_or_else(|| config.out_dir());
        tokio::fs::create_dir_all(&out_dir).await?;

        let files = match SessionMode::dispatch(&payload) {
            SessionMode::Direct => receive_direct(&config, payload).await?,
            SessionMode::Relay => receive_relay(&payload).await?,
        };

        for file in &files {
            let path = save(&out_dir, file).await?;
            println!("Saved {}", path.display());
        }
        Ok(())
    }
}

async fn receive_direct(
    config: &BeamConfig,
    payload: SignalingPayload,
) -> Result<Vec<ReceivedFile>, AppError> {
    let provider = TcpPeer::dialer(config.tcp_config());
    let progress = Arc::new(BatchProgress::new(payload.files().len()));
    let mut receiver = DirectReceiver::new(Arc::new(provider));
    receiver.subscribe(progress.clone());
    receiver.accept_payload(payload)?;

    let result = tokio::select! {
        result = receiver.wait() => result.map_err(AppError::TransferFailed),
        _ = tokio::signal::ctrl_c() => {
            receiver.scan_again();
            Err(AppError::Cancelled)
        }
    };
    match &result {
        Ok(_) => progress.finish("Done"),
        Err(_) => progress.abandon("Failed"),
    }
    result
}

async fn receive_relay(
    payload: &SignalingPayload,
) -> Result<Vec<ReceivedFile>, AppError> {
    let files = RelayReceiver::files(payload)?;
    let progress = BatchProgress::new(files.len());
    let result = RelayReceiver::new()
        .download_all(&files)
        .await
        .map_err(AppError::TransferFailed);
    match &result {
        Ok(_) => progress.finish("Downloaded"),
        Err(_) => progress.abandon("Failed"),
    }
    result
}

/// Writes `file` under `dir` without overwriting anything. Only the last
/// component of the sender-supplied name is used.
async fn save(dir: &Path, file: &ReceivedFile) -> Result<PathBuf, AppError> {
    let name = Path::new(&file.record.name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("file-{}", file.record.sequence_index));

    let mut path = dir.join(&name);
    let mut copy = 1;
    while tokio::fs::try_exists(&path).await? {
        let stem = Path::new(&name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let renamed = match Path::new(&name).extension() {
            Some(ext) => {
                format!("{} ({}).{}", stem, copy, ext.to_string_lossy())
            }
            None => format!("{} ({})", stem, copy),
        };
        path = dir.join(renamed);
        copy += 1;
    }
    tokio::fs::write(&path, &file.bytes).await?;
    Ok(path)
}
