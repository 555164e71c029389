//! Where shown outputs go.

use crate::output::render::Rendered;
use crossbeam_channel::Sender;
use std::fmt::Debug;

/// Consumer of shown outputs. `key` identifies the descriptor, so that later frames of
/// the same descriptor can be appended to the view opened by the first one.
pub trait ImageProvider: Send + Sync + Debug {
    fn open(&self, key: &str, title: &str, content: &Rendered);
    fn append(&self, key: &str, title: &str, content: &Rendered);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullViewer;

impl ImageProvider for NullViewer {
    fn open(&self, _key: &str, _title: &str, _content: &Rendered) {}

    fn append(&self, _key: &str, _title: &str, _content: &Rendered) {}
}

#[derive(Debug, Clone)]
pub enum ViewerCommand {
    Open {
        key: String,
        title: String,
        content: Rendered,
    },
    Append {
        key: String,
        title: String,
        content: Rendered,
    },
}

/// Forwards shown outputs to a viewer thread.
#[derive(Debug, Clone)]
pub struct ChannelViewer {
    tx: Sender<ViewerCommand>,
}

impl ChannelViewer {
    pub fn new(tx: Sender<ViewerCommand>) -> Self {
        ChannelViewer { tx }
    }

    fn send(&self, command: ViewerCommand) {
        if let Err(err) = self.tx.send(command) {
            log::warn!("viewer is gone, dropping frame: {err}");
        }
    }
}

impl ImageProvider for ChannelViewer {
    fn open(&self, key: &str, title: &str, content: &Rendered) {
        self.send(ViewerCommand::Open {
            key: key.to_string(),
            title: title.to_string(),
            content: content.clone(),
        });
    }

    fn append(&self, key: &str, title: &str, content: &Rendered) {
        self.send(ViewerCommand::Append {
            key: key.to_string(),
            title: title.to_string(),
            content: content.clone(),
        });
    }
}
