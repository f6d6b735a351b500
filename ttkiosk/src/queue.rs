use ttclient::{Playlist, Song};

#[derive(Clone, Debug, PartialEq)]
pub struct QueueEntry {
    pub song: Song,
    /// Recommended track appended locally, not yet in the server playlist.
    pub discovery: bool,
}

impl QueueEntry {
    pub fn new(song: Song) -> Self {
        Self {
            song,
            discovery: false,
        }
    }

    pub fn discovery(song: Song) -> Self {
        Self {
            song,
            discovery: true,
        }
    }
}

/// Where playback goes after the current entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Advance {
    /// A following entry exists.
    Index(usize),
    /// The current entry is the last one.
    AtEnd,
    /// Nothing is playing or the queue is empty.
    Idle,
}

/// Local snapshot of the loaded playlist plus appended discovery entries.
#[derive(Clone, Debug, Default)]
pub struct PlayQueue {
    playlist_id: Option<String>,
    name: Option<String>,
    items: Vec<QueueEntry>,
    current_index: Option<usize>,
}

impl PlayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the snapshot with `playlist`; nothing is current afterwards.
    pub fn load(&mut self, playlist: Playlist) {
        self.playlist_id = Some(playlist.id);
        self.name = Some(playlist.name);
        self.items = playlist.songs.into_iter().map(QueueEntry::new).collect();
        self.current_index = None;
    }

    pub fn playlist_id(&self) -> Option<&str> {
        self.playlist_id.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&QueueEntry> {
        self.items.get(index)
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.items
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current(&self) -> Option<&QueueEntry> {
        self.current_index.and_then(|idx| self.items.get(idx))
    }

    pub fn set_current_index(&mut self, index: Option<usize>) {
        self.current_index = match index {
            Some(idx) if idx < self.items.len() => Some(idx),
            _ => None,
        };
    }

    pub fn advance(&self) -> Advance {
        match self.current_index {
            None => Advance::Idle,
            Some(_) if self.items.is_empty() => Advance::Idle,
            Some(idx) if idx + 1 < self.items.len() => Advance::Index(idx + 1),
            Some(_) => Advance::AtEnd,
        }
    }

    /// Previous index, wrapping from the first entry to the last.
    pub fn previous_index(&self) -> Option<usize> {
        let idx = self.current_index?;
        if self.items.is_empty() {
            return None;
        }
        Some(if idx == 0 { self.items.len() - 1 } else { idx - 1 })
    }

    /// Appends `songs` as discovery entries and returns the index of the
    /// first one, or `None` when `songs` is empty.
    pub fn append_discoveries<I: IntoIterator<Item = Song>>(&mut self, songs: I) -> Option<usize> {
        let first = self.items.len();
        self.items.extend(songs.into_iter().map(QueueEntry::discovery));
        (self.items.len() > first).then_some(first)
    }

    pub fn song_ids(&self) -> Vec<String> {
        self.items.iter().map(|e| e.song.id.clone()).collect()
    }

    pub fn discovery_ids(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|e| e.discovery)
            .map(|e| e.song.id.clone())
            .collect()
    }

    pub fn is_discovery(&self, song_id: &str) -> bool {
        self.items.iter().any(|e| e.discovery && e.song.id == song_id)
    }

    /// Clears the discovery flag of every entry whose id is in `ids`.
    pub fn mark_persisted(&mut self, ids: &[String]) {
        for entry in self.items.iter_mut() {
            if entry.discovery && ids.contains(&entry.song.id) {
                entry.discovery = false;
            }
        }
    }
}

/// Ordered union of `server_ids` followed by the `extra` ids not already
/// present. The result contains no duplicates.
pub fn merge_song_ids(server_ids: &[String], extra: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(server_ids.len() + extra.len());
    for id in server_ids.iter().chain(extra.iter()) {
        if !merged.contains(id) {
            merged.push(id.clone());
        }
    }
    merged
}
