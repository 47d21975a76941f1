use std::path::Path;

use async_trait::async_trait;
use tempo_controls::session::{Artwork, ArtworkResolver, Session, SessionSink};
use tempo_models::Item;
use tracing::{debug, info};

/// Reads artwork from the path stored on the item.
pub struct FileArtwork;

#[async_trait]
impl ArtworkResolver for FileArtwork {
    async fn resolve(&self, item: &Item) -> Option<Artwork> {
        let path = item.artwork.as_ref()?;

        match tokio::fs::read(path).await {
            Ok(bytes) => Some(Artwork {
                bytes: bytes.into(),
                mime: mime_for(Path::new(path)).to_string(),
            }),
            Err(error) => {
                debug!(%error, path = %path, "no artwork");
                None
            }
        }
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| extension.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// Session sink used when no desktop integration is running.
pub struct LogSink;

impl SessionSink for LogSink {
    fn update(&self, session: &Session) {
        match &session.metadata {
            Some(metadata) => info!(
                title = %metadata.title,
                from = %metadata.display_description,
                status = ?session.playback.status,
                artwork = session.artwork.is_some(),
                "now playing"
            ),
            None => debug!("nothing playing"),
        }
    }
}
