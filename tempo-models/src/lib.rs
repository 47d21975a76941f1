use std::fmt;

/// Stable identifier of a library entry. Survives rescans as long as the
/// underlying file is still present.
#[derive(
    Debug, Default, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize, serde::Serialize,
)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Uid {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Uid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Default, Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Item {
    pub uid: Uid,
    pub title: String,
    #[serde(default)]
    pub artists: Vec<String>,
    pub album: Option<String>,
    #[serde(default)]
    pub album_artists: Vec<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    pub duration_ms: u64,
    pub track: Option<u32>,
    pub disc: Option<u32>,
    pub date: Option<String>,
    pub artwork: Option<String>,
}

impl Item {
    pub fn new(uid: impl Into<Uid>, title: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            uid: uid.into(),
            title: title.into(),
            duration_ms,
            ..Default::default()
        }
    }

    pub fn artist_names(&self) -> Option<String> {
        join_names(&self.artists)
    }

    pub fn album_artist_names(&self) -> Option<String> {
        join_names(&self.album_artists)
    }

    pub fn genre_names(&self) -> Option<String> {
        join_names(&self.genres)
    }
}

fn join_names(names: &[String]) -> Option<String> {
    if names.is_empty() {
        None
    } else {
        Some(names.join(", "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum ParentKind {
    Album,
    Artist,
    Genre,
    Playlist,
}

/// The grouping a queue was started from. A queue without a parent was
/// started from the whole library.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Parent {
    pub uid: Uid,
    pub kind: ParentKind,
    pub name: String,
}

impl Parent {
    pub fn new(uid: impl Into<Uid>, kind: ParentKind, name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            kind,
            name: name.into(),
        }
    }
}
