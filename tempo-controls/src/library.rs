use std::collections::HashMap;

use tempo_models::{Item, Parent, Uid};

use crate::Result;

/// Resolves persisted identifiers against the current catalog.
pub trait Library: Send + Sync {
    fn find_item(&self, uid: &Uid) -> Option<Item>;
    fn find_parent(&self, uid: &Uid) -> Option<Parent>;
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct ParentEntry {
    pub parent: Parent,
    pub items: Vec<Uid>,
}

#[derive(Debug, Default, Clone, serde::Deserialize, serde::Serialize)]
struct LibraryFile {
    items: Vec<Item>,
    #[serde(default)]
    parents: Vec<ParentEntry>,
}

/// In-memory catalog, loaded from a JSON listing or built by hand.
#[derive(Debug, Default, Clone)]
pub struct MemoryLibrary {
    items: Vec<Item>,
    by_uid: HashMap<Uid, usize>,
    parents: Vec<ParentEntry>,
}

impl MemoryLibrary {
    pub fn new(items: Vec<Item>, parents: Vec<ParentEntry>) -> Self {
        let by_uid = items
            .iter()
            .enumerate()
            .map(|(index, item)| (item.uid.clone(), index))
            .collect();

        Self {
            items,
            by_uid,
            parents,
        }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let file: LibraryFile = serde_json::from_slice(bytes)?;
        Ok(Self::new(file.items, file.parents))
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn parents(&self) -> &[ParentEntry] {
        &self.parents
    }

    /// Items of a parent in listing order. Entries that do not resolve are
    /// skipped.
    pub fn parent_items(&self, uid: &Uid) -> Option<(Parent, Vec<Item>)> {
        let entry = self.parents.iter().find(|entry| &entry.parent.uid == uid)?;
        let items = entry
            .items
            .iter()
            .filter_map(|uid| self.find_item(uid))
            .collect();

        Some((entry.parent.clone(), items))
    }

    pub fn remove_item(&mut self, uid: &Uid) -> Option<Item> {
        let index = self.by_uid.get(uid).copied()?;
        let item = self.items.remove(index);
        *self = Self::new(std::mem::take(&mut self.items), std::mem::take(&mut self.parents));
        Some(item)
    }
}

impl Library for MemoryLibrary {
    fn find_item(&self, uid: &Uid) -> Option<Item> {
        self.by_uid
            .get(uid)
            .and_then(|&index| self.items.get(index))
            .cloned()
    }

    fn find_parent(&self, uid: &Uid) -> Option<Parent> {
        self.parents
            .iter()
            .find(|entry| &entry.parent.uid == uid)
            .map(|entry| entry.parent.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_models::ParentKind;

    const LISTING: &str = r#"{
        "items": [
            { "uid": "a", "title": "A", "album": "Album", "duration_ms": 1000,
              "track": 1, "disc": null, "date": null, "artwork": null },
            { "uid": "b", "title": "B", "album": "Album", "duration_ms": 2000,
              "track": 2, "disc": null, "date": null, "artwork": null }
        ],
        "parents": [
            { "parent": { "uid": "album", "kind": "Album", "name": "Album" },
              "items": ["b", "missing", "a"] }
        ]
    }"#;

    #[test]
    fn loads_listing() {
        let library = MemoryLibrary::from_json(LISTING.as_bytes()).unwrap();

        assert_eq!(library.items().len(), 2);
        assert_eq!(library.find_item(&"b".into()).unwrap().duration_ms, 2000);
        assert_eq!(
            library.find_parent(&"album".into()).unwrap().kind,
            ParentKind::Album
        );

        let (_, items) = library.parent_items(&"album".into()).unwrap();
        let uids: Vec<&str> = items.iter().map(|item| item.uid.as_str()).collect();
        assert_eq!(uids, vec!["b", "a"]);
    }

    #[test]
    fn remove_item_reindexes() {
        let mut library = MemoryLibrary::from_json(LISTING.as_bytes()).unwrap();

        assert!(library.remove_item(&"a".into()).is_some());
        assert!(library.find_item(&"a".into()).is_none());
        assert_eq!(library.find_item(&"b".into()).unwrap().title, "B");
        assert!(library.remove_item(&"a".into()).is_none());
    }

    #[test]
    fn rejects_malformed_listing() {
        assert!(MemoryLibrary::from_json(b"{ not json").is_err());
    }
}
