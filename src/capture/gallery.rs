use std::{collections::VecDeque, sync::Arc};

use log::warn;
use serde::Serialize;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::event_bus::AppEvent;

use super::job::{Artifact, CaptureMode};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryItem {
    pub job_id: String,
    pub mode: CaptureMode,
    pub artifact: Artifact,
}

/// Photos and videos produced during this viewing, newest last.
#[derive(Clone)]
pub struct ArtifactGallery {
    items: Arc<Mutex<VecDeque<GalleryItem>>>,
    limit: usize,
    shutdown: CancellationToken,
}

impl ArtifactGallery {
    pub fn new(limit: usize) -> Self {
        Self {
            items: Arc::new(Mutex::new(VecDeque::new())),
            limit: limit.max(1),
            shutdown: CancellationToken::new(),
        }
    }

    pub async fn push(&self, item: GalleryItem) {
        let mut items = self.items.lock().await;
        while items.len() >= self.limit {
            items.pop_front();
        }
        items.push_back(item);
    }

    pub async fn items(&self) -> Vec<GalleryItem> {
        self.items.lock().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub fn spawn_collector(&self, mut events: broadcast::Receiver<AppEvent>) -> JoinHandle<()> {
        let gallery = self.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => event,
                };
                match event {
                    Ok(AppEvent::ArtifactReady {
                        job_id,
                        mode,
                        artifact,
                    }) => {
                        gallery
                            .push(GalleryItem {
                                job_id,
                                mode,
                                artifact,
                            })
                            .await
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("gallery lagged; {} events skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
