use std::{
    path::PathBuf,
    sync::{Mutex, MutexGuard},
};

use mpris_server::{
    LoopStatus, Metadata, PlaybackRate, PlaybackStatus, PlayerInterface, Property, RootInterface,
    Server, Time, TrackId, Volume,
    zbus::{self, fdo},
};
use tempo_controls::{
    Controls, Error, RepeatMode, Result, StateReceiver, Status,
    session::{Artwork, Session, SessionMetadata, SessionSink},
};
use tokio::sync::watch;
use tracing::{debug, warn};

const BUS_NAME: &str = "com.github.sofusa-tempo";

pub type SessionReceiver = watch::Receiver<Session>;

struct ExportedArtwork {
    generation: u64,
    path: PathBuf,
}

/// Forwards published sessions into a watch channel read by [`init`].
///
/// Accepted artwork is written to disk once per generation so it can be
/// offered as a `file://` art url.
pub struct MprisSink {
    tx: watch::Sender<Session>,
    artwork_dir: PathBuf,
    exported: Mutex<Option<ExportedArtwork>>,
}

impl MprisSink {
    pub fn new() -> (Self, SessionReceiver) {
        let artwork_dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("tempo")
            .join("artwork");
        Self::with_artwork_dir(artwork_dir)
    }

    pub fn with_artwork_dir(artwork_dir: PathBuf) -> (Self, SessionReceiver) {
        let (tx, rx) = watch::channel(Session::default());
        (
            Self {
                tx,
                artwork_dir,
                exported: Mutex::new(None),
            },
            rx,
        )
    }

    fn export_artwork(&self, session: &Session) -> Option<String> {
        let artwork = session.artwork.as_ref()?;
        let mut exported = self.lock();

        if let Some(current) = exported.as_ref() {
            if current.generation == session.generation {
                return Some(file_url(&current.path));
            }
        }

        let path = self.artwork_dir.join(format!(
            "cover-{}.{}",
            session.generation,
            extension(artwork)
        ));
        let written = std::fs::create_dir_all(&self.artwork_dir)
            .and_then(|_| std::fs::write(&path, &artwork.bytes));
        if let Err(error) = written {
            warn!(%error, path = %path.display(), "unable to export artwork");
            return None;
        }

        if let Some(previous) = exported.take() {
            if let Err(error) = std::fs::remove_file(&previous.path) {
                debug!(%error, path = %previous.path.display(), "stale artwork not removed");
            }
        }
        let url = file_url(&path);
        *exported = Some(ExportedArtwork {
            generation: session.generation,
            path,
        });
        Some(url)
    }

    fn lock(&self) -> MutexGuard<'_, Option<ExportedArtwork>> {
        match self.exported.lock() {
            Ok(exported) => exported,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl SessionSink for MprisSink {
    fn update(&self, session: &Session) {
        let mut session = session.clone();
        let art_url = self.export_artwork(&session);
        if let Some(metadata) = session.metadata.as_mut() {
            metadata.art_url = art_url;
        }
        self.tx.send_replace(session);
    }
}

fn extension(artwork: &Artwork) -> &'static str {
    match artwork.mime.as_str() {
        "image/png" => "png",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

fn file_url(path: &std::path::Path) -> String {
    format!("file://{}", path.display())
}

struct MprisPlayer {
    controls: Controls,
    session_receiver: SessionReceiver,
    state_receiver: StateReceiver,
}

impl RootInterface for MprisPlayer {
    async fn identity(&self) -> fdo::Result<String> {
        Ok("Tempo".into())
    }
    async fn raise(&self) -> fdo::Result<()> {
        Err(fdo::Error::NotSupported("Not supported".into()))
    }
    async fn quit(&self) -> fdo::Result<()> {
        self.controls.quit();
        Ok(())
    }
    async fn can_quit(&self) -> fdo::Result<bool> {
        Ok(true)
    }
    async fn fullscreen(&self) -> fdo::Result<bool> {
        Err(fdo::Error::NotSupported("Not supported".into()))
    }
    async fn set_fullscreen(&self, _fullscreen: bool) -> zbus::Result<()> {
        Err(zbus::Error::Unsupported)
    }
    async fn can_set_fullscreen(&self) -> fdo::Result<bool> {
        Ok(false)
    }
    async fn can_raise(&self) -> fdo::Result<bool> {
        Ok(false)
    }
    async fn has_track_list(&self) -> fdo::Result<bool> {
        Ok(false)
    }
    async fn desktop_entry(&self) -> fdo::Result<String> {
        Ok(BUS_NAME.into())
    }
    async fn supported_uri_schemes(&self) -> fdo::Result<Vec<String>> {
        Ok(vec![])
    }
    async fn supported_mime_types(&self) -> fdo::Result<Vec<String>> {
        Ok(vec![])
    }
}

impl PlayerInterface for MprisPlayer {
    async fn next(&self) -> fdo::Result<()> {
        self.controls.next();
        Ok(())
    }

    async fn previous(&self) -> fdo::Result<()> {
        self.controls.previous();
        Ok(())
    }

    async fn pause(&self) -> fdo::Result<()> {
        self.controls.pause();
        Ok(())
    }

    async fn play_pause(&self) -> fdo::Result<()> {
        self.controls.play_pause();
        Ok(())
    }

    async fn stop(&self) -> fdo::Result<()> {
        self.controls.pause();
        self.controls.rewind();
        Ok(())
    }

    async fn play(&self) -> fdo::Result<()> {
        self.controls.play();
        Ok(())
    }

    async fn seek(&self, offset: Time) -> fdo::Result<()> {
        let position_ms = self.state_receiver.borrow().position_ms as i64;
        self.controls
            .seek(position_ms.saturating_add(offset.as_millis()).max(0) as u64);
        Ok(())
    }

    async fn set_position(&self, _track_id: TrackId, position: Time) -> fdo::Result<()> {
        self.controls.seek(position.as_millis().max(0) as u64);
        Ok(())
    }

    async fn open_uri(&self, _uri: String) -> fdo::Result<()> {
        Err(fdo::Error::NotSupported("Not supported".into()))
    }

    async fn playback_status(&self) -> fdo::Result<PlaybackStatus> {
        Ok(playback_status(self.state_receiver.borrow().status))
    }

    async fn loop_status(&self) -> fdo::Result<LoopStatus> {
        Ok(loop_status(self.session_receiver.borrow().repeat))
    }

    async fn set_loop_status(&self, loop_status: LoopStatus) -> zbus::Result<()> {
        let mode = match loop_status {
            LoopStatus::None => RepeatMode::None,
            LoopStatus::Track => RepeatMode::Track,
            LoopStatus::Playlist => RepeatMode::All,
        };
        self.controls.set_repeat_mode(mode);
        Ok(())
    }

    async fn rate(&self) -> fdo::Result<PlaybackRate> {
        Ok(1.0)
    }

    async fn set_rate(&self, _rate: PlaybackRate) -> zbus::Result<()> {
        Err(zbus::Error::Unsupported)
    }

    async fn shuffle(&self) -> fdo::Result<bool> {
        Ok(self.session_receiver.borrow().shuffle)
    }

    async fn set_shuffle(&self, shuffle: bool) -> zbus::Result<()> {
        self.controls.set_shuffled(shuffle);
        Ok(())
    }

    async fn metadata(&self) -> fdo::Result<Metadata> {
        let session = self.session_receiver.borrow();
        Ok(session
            .metadata
            .as_ref()
            .map(session_to_metadata)
            .unwrap_or_else(Metadata::new))
    }

    async fn volume(&self) -> fdo::Result<Volume> {
        Ok(1.0)
    }

    async fn set_volume(&self, _volume: Volume) -> zbus::Result<()> {
        Err(zbus::Error::Unsupported)
    }

    async fn position(&self) -> fdo::Result<Time> {
        let position_ms = self.state_receiver.borrow().position_ms;
        Ok(Time::from_millis(position_ms as i64))
    }

    async fn minimum_rate(&self) -> fdo::Result<PlaybackRate> {
        Ok(1.0)
    }

    async fn maximum_rate(&self) -> fdo::Result<PlaybackRate> {
        Ok(1.0)
    }

    async fn can_go_next(&self) -> fdo::Result<bool> {
        Ok(can_go_next(&self.session_receiver.borrow()))
    }

    async fn can_go_previous(&self) -> fdo::Result<bool> {
        Ok(self.session_receiver.borrow().metadata.is_some())
    }

    async fn can_play(&self) -> fdo::Result<bool> {
        Ok(self.session_receiver.borrow().metadata.is_some())
    }

    async fn can_pause(&self) -> fdo::Result<bool> {
        Ok(self.session_receiver.borrow().metadata.is_some())
    }

    async fn can_seek(&self) -> fdo::Result<bool> {
        Ok(true)
    }

    async fn can_control(&self) -> fdo::Result<bool> {
        Ok(true)
    }
}

/// Serves the session on the session bus until the session channel closes.
pub async fn init(
    controls: Controls,
    mut session_receiver: SessionReceiver,
    state_receiver: StateReceiver,
) -> Result<()> {
    let Ok(server) = Server::new(
        BUS_NAME,
        MprisPlayer {
            controls,
            session_receiver: session_receiver.clone(),
            state_receiver,
        },
    )
    .await
    else {
        return Err(Error::MprisInitError);
    };

    let mut published: Option<Session> = None;

    while session_receiver.changed().await.is_ok() {
        let session = session_receiver.borrow_and_update().clone();
        let properties = changed_properties(published.as_ref(), &session);
        published = Some(session);

        if properties.is_empty() {
            continue;
        }

        debug!(count = properties.len(), "publishing mpris properties");
        let Ok(_) = server.properties_changed(properties).await else {
            return Err(Error::MprisPropertyError {
                property: "Metadata, PlaybackStatus, LoopStatus, Shuffle".into(),
            });
        };
    }

    Ok(())
}

fn changed_properties(previous: Option<&Session>, session: &Session) -> Vec<Property> {
    let mut properties = vec![];

    let metadata_changed = previous.is_none_or(|previous| {
        previous.metadata != session.metadata || previous.generation != session.generation
    });
    if metadata_changed {
        properties.push(Property::Metadata(
            session
                .metadata
                .as_ref()
                .map(session_to_metadata)
                .unwrap_or_else(Metadata::new),
        ));
        properties.push(Property::CanGoNext(can_go_next(session)));
        properties.push(Property::CanGoPrevious(session.metadata.is_some()));
        properties.push(Property::CanPlay(session.metadata.is_some()));
        properties.push(Property::CanPause(session.metadata.is_some()));
    }

    if previous.is_none_or(|previous| previous.playback.status != session.playback.status) {
        properties.push(Property::PlaybackStatus(playback_status(
            session.playback.status,
        )));
    }

    if previous.is_none_or(|previous| previous.repeat != session.repeat) {
        properties.push(Property::LoopStatus(loop_status(session.repeat)));
    }

    if previous.is_none_or(|previous| previous.shuffle != session.shuffle) {
        properties.push(Property::Shuffle(session.shuffle));
    }

    properties
}

fn can_go_next(session: &Session) -> bool {
    match session.active_queue_id {
        Some(id) => session.repeat == RepeatMode::All || (id as usize) + 1 < session.queue.len(),
        None => false,
    }
}

fn playback_status(status: Status) -> PlaybackStatus {
    match status {
        Status::Idle => PlaybackStatus::Stopped,
        Status::Loaded | Status::Paused => PlaybackStatus::Paused,
        Status::Playing => PlaybackStatus::Playing,
    }
}

fn loop_status(mode: RepeatMode) -> LoopStatus {
    match mode {
        RepeatMode::None => LoopStatus::None,
        RepeatMode::Track => LoopStatus::Track,
        RepeatMode::All => LoopStatus::Playlist,
    }
}

fn session_to_metadata(session: &SessionMetadata) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.set_length(Some(Time::from_millis(session.duration_ms as i64)));

    metadata.set_title(Some(session.title.clone()));
    metadata.set_album(session.album.clone());
    metadata.set_art_url(session.art_url.clone());

    metadata.set_artist(session.artist.as_ref().map(|artist| vec![artist]));
    metadata.set_album_artist(session.album_artist.as_ref().map(|artist| vec![artist]));
    metadata.set_genre(session.genre.as_ref().map(|genre| vec![genre]));

    metadata.set_track_number(session.track.map(|track| track as i32));
    metadata.set_disc_number(session.disc.map(|disc| disc as i32));
    metadata.set_content_created(session.date.clone());

    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, time::Duration};

    use tempo_controls::{
        Event, Listener, PlaybackState, QueueSnapshot,
        session::{ArtworkResolver, SessionMirror, SessionSettings},
    };
    use tempo_models::Item;
    use tokio::runtime::Handle;

    struct CoverResolver;

    #[async_trait::async_trait]
    impl ArtworkResolver for CoverResolver {
        async fn resolve(&self, item: &Item) -> Option<Artwork> {
            Some(Artwork {
                bytes: item.uid.as_str().as_bytes().into(),
                mime: "image/png".into(),
            })
        }
    }

    fn queue(items: &[&str], index: usize) -> QueueSnapshot {
        QueueSnapshot {
            items: items
                .iter()
                .map(|uid| Item::new(*uid, uid.to_uppercase(), 1_000))
                .collect::<Vec<_>>()
                .into(),
            index: Some(index),
            shuffled: false,
        }
    }

    fn session(status: Status, active: Option<u64>, repeat: RepeatMode) -> Session {
        Session {
            queue: vec![],
            active_queue_id: active,
            playback: PlaybackState {
                status,
                ..Default::default()
            },
            repeat,
            ..Default::default()
        }
    }

    #[test]
    fn maps_transport_state() {
        assert_eq!(playback_status(Status::Idle), PlaybackStatus::Stopped);
        assert_eq!(playback_status(Status::Loaded), PlaybackStatus::Paused);
        assert_eq!(playback_status(Status::Playing), PlaybackStatus::Playing);
        assert_eq!(loop_status(RepeatMode::All), LoopStatus::Playlist);
    }

    #[test]
    fn only_changed_properties_are_published() {
        let first = session(Status::Playing, None, RepeatMode::None);
        assert_eq!(changed_properties(None, &first).len(), 8);

        let paused = session(Status::Paused, None, RepeatMode::None);
        let properties = changed_properties(Some(&first), &paused);
        assert_eq!(properties.len(), 1);
        assert!(matches!(
            properties[0],
            Property::PlaybackStatus(PlaybackStatus::Paused)
        ));

        assert!(changed_properties(Some(&paused), &paused).is_empty());
    }

    #[test]
    fn repeat_all_can_always_go_next() {
        let mut last = session(Status::Playing, Some(0), RepeatMode::None);
        last.queue = vec![tempo_controls::session::SessionQueueItem {
            id: 0,
            media_id: "a".into(),
            title: "A".into(),
            subtitle: None,
        }];

        assert!(!can_go_next(&last));
        last.repeat = RepeatMode::All;
        assert!(can_go_next(&last));
    }

    #[tokio::test]
    async fn accepted_artwork_is_published_as_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let (sink, mut receiver) = MprisSink::with_artwork_dir(dir.path().to_path_buf());
        let mirror = SessionMirror::new(
            Handle::current(),
            Arc::new(CoverResolver),
            Arc::new(sink),
            SessionSettings::default(),
        );

        mirror
            .on_event(&Event::NewPlayback {
                queue: queue(&["a", "b"], 0),
                parent: None,
            })
            .unwrap();
        let pending = receiver.borrow_and_update().clone();
        assert!(pending.artwork_pending);
        assert_eq!(pending.metadata.as_ref().unwrap().art_url, None);

        let accepted = tokio::time::timeout(
            Duration::from_secs(5),
            receiver.wait_for(|session| !session.artwork_pending),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();

        let url = accepted.metadata.as_ref().unwrap().art_url.clone().unwrap();
        let path = url.strip_prefix("file://").unwrap();
        assert!(path.ends_with(".png"));
        assert_eq!(std::fs::read(path).unwrap(), b"a");

        let properties = changed_properties(Some(&pending), &accepted);
        assert!(
            properties
                .iter()
                .any(|property| matches!(property, Property::Metadata(_)))
        );

        mirror
            .on_event(&Event::QueueChanged {
                queue: queue(&["a", "b"], 1),
                change: tempo_controls::Change::navigation(),
            })
            .unwrap();
        let next = tokio::time::timeout(
            Duration::from_secs(5),
            receiver.wait_for(|session| {
                !session.artwork_pending && session.generation != accepted.generation
            }),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();

        let next_url = next.metadata.as_ref().unwrap().art_url.clone().unwrap();
        assert_ne!(next_url, url);
        assert!(!std::path::Path::new(path).exists());
    }
}
