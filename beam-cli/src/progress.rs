use beam_core::{
    direct::{
        DirectArrivedEvent, DirectReceiveSubscriber, DirectSendSubscriber,
        DirectSentEvent, ReceiveState, SendState,
    },
    file::ReceivedFile,
    relay::{RelaySendSubscriber, RelayUploadedEvent},
    subscribers::Subscriber,
};
use indicatif::{ProgressBar, ProgressStyle};

/// One bar counting files, shared by every kind of session.
pub struct BatchProgress {
    bar: ProgressBar,
}

impl BatchProgress {
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len} files",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        );
        Self { bar }
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    pub fn abandon(&self, message: &str) {
        self.bar.abandon_with_message(message.to_string());
    }
}

impl Subscriber for BatchProgress {
    fn get_id(&self) -> String {
        "beam-cli-progress".to_string()
    }
}

impl DirectSendSubscriber for BatchProgress {
    fn notify_state(&self, state: &SendState) {
        match state {
            SendState::AwaitingPeer => {
                self.bar.set_message("Waiting for the receiver")
            }
            SendState::Streaming { .. } => self.bar.set_message("Sending"),
            _ => {}
        }
    }

    fn notify_sent(&self, event: DirectSentEvent) {
        self.bar.set_position(event.files_sent as u64);
        self.bar.set_message(format!("Sent {}", event.name));
    }
}

impl DirectReceiveSubscriber for BatchProgress {
    fn notify_state(&self, state: &ReceiveState) {
        match state {
            ReceiveState::Connecting => self.bar.set_message("Connecting"),
            ReceiveState::Receiving {
                expected: Some(expected),
                ..
            } => self.bar.set_length(*expected as u64),
            _ => {}
        }
    }

    fn notify_arrived(&self, event: DirectArrivedEvent) {
        self.bar.set_position(event.arrived as u64);
        self.bar.set_message(format!("Received {}", event.name));
    }

    fn notify_complete(&self, files: &[ReceivedFile]) {
        self.bar.set_position(files.len() as u64);
    }
}

impl RelaySendSubscriber for BatchProgress {
    fn notify_uploaded(&self, event: RelayUploadedEvent) {
        self.bar.set_position(event.uploaded as u64);
        self.bar.set_message(format!("Uploaded {}", event.name));
    }
}
