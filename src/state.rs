use std::sync::Arc;

use crate::progress::ProgressStore;
use crate::sink::FileSink;

/// shared application state
#[derive(Clone)]
pub struct AppState {
    /// progress of in-flight and recently finished uploads
    pub progress: ProgressStore,
    /// where uploaded files end up
    pub sink: Arc<dyn FileSink>,
}

impl AppState {
    pub fn new(progress: ProgressStore, sink: Arc<dyn FileSink>) -> Self {
        Self { progress, sink }
    }
}
