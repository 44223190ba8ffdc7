use beam_core::{config::BeamConfig, SessionMode, SignalingPayload};

use crate::AppError;

#[derive(Clone, Debug, clap::Args)]
#[clap(name = "inspect", about = "Decode a code and describe what it holds")]
pub struct Inspect {
    #[clap(value_parser, help = "The scanned code")]
    code: String,
}

impl Inspect {
    pub fn run(&self) -> Result<(), AppError> {
        let payload = SignalingPayload::decode(&self.code)
            .map_err(AppError::from_decode)?;

        match &payload {
            SignalingPayload::Direct(direct) => {
                println!("Mode: direct");
                println!("Host: {}", direct.session_host_id);
            }
            SignalingPayload::Relay(relay) => {
                println!("Mode: relay");
                println!("Created: {}", relay.created_at.to_rfc3339());
            }
        }

        let files = payload.files();
        let total: u64 = files.iter().map(|f| f.size).sum();
        println!("Files: {} ({} bytes)", files.len(), total);
        let mut ordered = files.to_vec();
        ordered.sort_by_key(|f| f.sequence_index);
        for file in &ordered {
            match &file.remote_locator {
                Some(url) => println!(
                    "  #{} {} {} bytes {} {}",
                    file.sequence_index,
                    file.name,
                    file.size,
                    file.mime_type,
                    url
                ),
                None => println!(
                    "  #{} {} {} bytes {}",
                    file.sequence_index, file.name, file.size, file.mime_type
                ),
            }
        }

        let max = BeamConfig::load()
            .map(|c| c.relay.recommend_max_bytes)
            .unwrap_or(beam_core::mode::DEFAULT_RELAY_RECOMMEND_MAX_BYTES);
        if SessionMode::recommend(&ordered, max) != payload.mode() {
            println!(
                "Note: {} mode would suit this batch better",
                SessionMode::recommend(&ordered, max)
            );
        }
        Ok(())
    }
}
