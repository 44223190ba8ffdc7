//! Short human-readable text shown next to a file while it is shared.
//!
//! Advice is decoration: it never holds up or fails a transfer.

use std::{future::Future, pin::Pin, time::Duration};

use crate::{file::FileRecord, Result};

/// Shown whenever no advisor is configured or the advisor misbehaves.
pub const FALLBACK_ADVICE: &str = "Ready to beam your file securely!";

pub type AdviceFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

pub trait Advisor: Send + Sync {
    fn describe<'a>(
        &'a self,
        name: &'a str,
        size: u64,
        mime_type: &'a str,
    ) -> AdviceFuture<'a>;
}

/// Asks `advisor` about `record`, settling for [`FALLBACK_ADVICE`] on
/// error, timeout, an empty answer, or no advisor at all.
pub async fn advise(
    advisor: Option<&dyn Advisor>,
    record: &FileRecord,
    timeout: Duration,
) -> String {
    let Some(advisor) = advisor else {
        return FALLBACK_ADVICE.to_string();
    };
    let asked = advisor.describe(&record.name, record.size, &record.mime_type);
    match tokio::time::timeout(timeout, asked).await {
        Ok(Ok(text)) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(Ok(_)) => FALLBACK_ADVICE.to_string(),
        Ok(Err(e)) => {
            log::debug!("advisor failed for {}: {}", record.name, e);
            FALLBACK_ADVICE.to_string()
        }
        Err(_) => {
            log::debug!("advisor timed out for {}", record.name);
            FALLBACK_ADVICE.to_string()
        }
    }
}
