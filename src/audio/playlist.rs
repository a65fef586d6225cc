use rand::seq::SliceRandom;
use tracing::info;

use super::track::Track;
use crate::error::{EngineError, Result};

/// A track plus its place in insertion (canonical) order
#[derive(Debug, Clone)]
pub struct PlaylistEntry {
    pub position: usize,
    pub track: Track,
}

/// Ordered playlist with a navigation cursor.
///
/// Insertion order is canonical and is never touched by shuffle. Shuffle only
/// installs a permutation of canonical indices that next/previous walk instead.
/// Navigation clamps at both ends: `next()` on the last entry and `previous()`
/// on the first report `Ok(None)` and leave the cursor where it was.
#[derive(Debug, Default)]
pub struct PlaylistModel {
    entries: Vec<PlaylistEntry>,
    shuffle_order: Option<Vec<usize>>,
    // position within the active order, None = before the first entry
    cursor: Option<usize>,
}

impl PlaylistModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_shuffled(&self) -> bool {
        self.shuffle_order.is_some()
    }

    pub fn entries(&self) -> &[PlaylistEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.entries.get(index).map(|entry| &entry.track)
    }

    /// Canonical-order copy, what a download job works from
    pub fn snapshot(&self) -> Vec<Track> {
        self.entries.iter().map(|entry| entry.track.clone()).collect()
    }

    /// Canonical indices in the order next() visits them
    pub fn navigation_order(&self) -> Vec<usize> {
        match &self.shuffle_order {
            Some(order) => order.clone(),
            None => (0..self.entries.len()).collect(),
        }
    }

    pub fn current_index(&self) -> Option<usize> {
        self.cursor.map(|pos| self.canonical_at(pos))
    }

    pub fn current(&self) -> Option<&Track> {
        self.current_index().and_then(|index| self.get(index))
    }

    pub fn add(&mut self, track: Track) -> usize {
        let index = self.entries.len();
        info!("Added '{}' to playlist at {}", track.display_title(), index);
        self.entries.push(PlaylistEntry { position: index, track });
        if let Some(order) = &mut self.shuffle_order {
            order.push(index);
        }
        index
    }

    pub fn remove(&mut self, index: usize) -> Result<Track> {
        if index >= self.entries.len() {
            return Err(EngineError::OutOfRange {
                index,
                len: self.entries.len(),
            });
        }

        let removed_pos = self.position_of(index);
        let entry = self.entries.remove(index);
        for (position, entry) in self.entries.iter_mut().enumerate() {
            entry.position = position;
        }

        if let Some(order) = &mut self.shuffle_order {
            order.retain(|&i| i != index);
            for i in order.iter_mut() {
                if *i > index {
                    *i -= 1;
                }
            }
        }

        // removing the current entry leaves the cursor just before its successor
        self.cursor = match self.cursor {
            Some(pos) if pos > removed_pos => Some(pos - 1),
            Some(pos) if pos == removed_pos => pos.checked_sub(1),
            other => other,
        };

        info!("Removed '{}' from playlist", entry.track.display_title());
        Ok(entry.track)
    }

    /// Replace everything, e.g. with a freshly loaded remote playlist
    pub fn load(&mut self, tracks: Vec<Track>) {
        self.entries = tracks
            .into_iter()
            .enumerate()
            .map(|(position, track)| PlaylistEntry { position, track })
            .collect();
        self.shuffle_order = None;
        self.cursor = None;
        info!("Loaded {} entries into playlist", self.entries.len());
    }

    pub fn select(&mut self, index: usize) -> Result<&Track> {
        if index >= self.entries.len() {
            return Err(EngineError::OutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        self.cursor = Some(self.position_of(index));
        Ok(&self.entries[index].track)
    }

    /// Flip shuffle, returns the new state. Turning it on puts the current
    /// entry first so next() can still reach every other entry.
    pub fn toggle_shuffle(&mut self) -> bool {
        let current = self.current_index();

        if self.shuffle_order.take().is_some() {
            self.cursor = current;
            info!("Shuffle off");
            return false;
        }

        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        order.shuffle(&mut rand::thread_rng());
        if let Some(current) = current {
            if let Some(pos) = order.iter().position(|&i| i == current) {
                order.swap(0, pos);
            }
        }

        self.cursor = current.map(|_| 0);
        self.shuffle_order = Some(order);
        info!("Shuffle on ({} entries)", self.entries.len());
        true
    }

    pub fn next(&mut self) -> Result<Option<usize>> {
        if self.entries.is_empty() {
            return Err(EngineError::Empty);
        }

        let target = self.cursor.map_or(0, |pos| pos + 1);
        if target >= self.entries.len() {
            return Ok(None);
        }

        self.cursor = Some(target);
        Ok(Some(self.canonical_at(target)))
    }

    pub fn previous(&mut self) -> Result<Option<usize>> {
        if self.entries.is_empty() {
            return Err(EngineError::Empty);
        }

        match self.cursor {
            None | Some(0) => Ok(None),
            Some(pos) => {
                self.cursor = Some(pos - 1);
                Ok(Some(self.canonical_at(pos - 1)))
            }
        }
    }

    fn canonical_at(&self, pos: usize) -> usize {
        match &self.shuffle_order {
            Some(order) => order[pos],
            None => pos,
        }
    }

    fn position_of(&self, index: usize) -> usize {
        match &self.shuffle_order {
            Some(order) => order.iter().position(|&i| i == index).unwrap_or(index),
            None => index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playlist_of(n: usize) -> PlaylistModel {
        let mut playlist = PlaylistModel::new();
        for i in 0..n {
            playlist.add(Track::local(format!("/music/{:02}.mp3", i)));
        }
        playlist
    }

    fn walk_forward(playlist: &mut PlaylistModel) -> Vec<usize> {
        let mut visited = Vec::new();
        while let Some(index) = playlist.next().unwrap() {
            visited.push(index);
        }
        visited
    }

    #[test]
    fn test_empty_playlist_navigation() {
        let mut playlist = PlaylistModel::new();
        assert!(matches!(playlist.next(), Err(EngineError::Empty)));
        assert!(matches!(playlist.previous(), Err(EngineError::Empty)));
        assert!(matches!(playlist.remove(0), Err(EngineError::OutOfRange { index: 0, len: 0 })));
    }

    #[test]
    fn test_canonical_navigation_clamps() {
        let mut playlist = playlist_of(3);
        assert_eq!(playlist.previous().unwrap(), None);
        assert_eq!(walk_forward(&mut playlist), vec![0, 1, 2]);

        // at the last entry: boundary, cursor stays put
        assert_eq!(playlist.next().unwrap(), None);
        assert_eq!(playlist.current_index(), Some(2));

        assert_eq!(playlist.previous().unwrap(), Some(1));
        assert_eq!(playlist.previous().unwrap(), Some(0));
        assert_eq!(playlist.previous().unwrap(), None);
        assert_eq!(playlist.current_index(), Some(0));
    }

    #[test]
    fn test_shuffled_navigation_clamps() {
        let mut playlist = playlist_of(6);
        playlist.toggle_shuffle();

        let visited = walk_forward(&mut playlist);
        assert_eq!(visited, playlist.navigation_order());
        let last = playlist.current_index();
        assert_eq!(playlist.next().unwrap(), None);
        assert_eq!(playlist.current_index(), last);
    }

    #[test]
    fn test_shuffle_is_a_permutation_starting_at_current() {
        let mut playlist = playlist_of(12);
        playlist.select(7).unwrap();
        assert!(playlist.toggle_shuffle());

        let order = playlist.navigation_order();
        assert_eq!(order[0], 7);
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(sorted, (0..12).collect::<Vec<_>>());
        assert_eq!(playlist.current_index(), Some(7));

        // canonical order untouched
        let positions: Vec<usize> = playlist.entries().iter().map(|e| e.position).collect();
        assert_eq!(positions, (0..12).collect::<Vec<_>>());
        assert_eq!(playlist.get(0).unwrap().display_title(), "00.mp3");
    }

    #[test]
    fn test_double_toggle_matches_never_toggling() {
        let mut plain = playlist_of(10);
        let mut toggled = PlaylistModel::new();
        toggled.load(plain.snapshot());

        plain.select(3).unwrap();
        toggled.select(3).unwrap();
        assert!(toggled.toggle_shuffle());
        assert!(!toggled.toggle_shuffle());

        assert_eq!(toggled.current_index(), Some(3));
        assert_eq!(toggled.navigation_order(), plain.navigation_order());
        assert_eq!(walk_forward(&mut toggled), walk_forward(&mut plain));
    }

    #[test]
    fn test_remove_current_keeps_successor_next() {
        let mut playlist = playlist_of(5);
        playlist.select(2).unwrap();

        let removed = playlist.remove(2).unwrap();
        assert_eq!(removed.display_title(), "02.mp3");
        assert_eq!(playlist.len(), 4);

        let next = playlist.next().unwrap().unwrap();
        assert_eq!(playlist.get(next).unwrap().display_title(), "03.mp3");
    }

    #[test]
    fn test_remove_while_shuffled_keeps_order_consistent() {
        let mut playlist = playlist_of(8);
        playlist.toggle_shuffle();
        playlist.remove(4).unwrap();

        let mut order = playlist.navigation_order();
        order.sort();
        assert_eq!(order, (0..7).collect::<Vec<_>>());
        assert_eq!(walk_forward(&mut playlist).len(), 7);
    }

    #[test]
    fn test_add_while_shuffled_is_reachable() {
        let mut playlist = playlist_of(3);
        playlist.toggle_shuffle();
        let index = playlist.add(Track::local("/music/new.mp3"));
        assert_eq!(index, 3);
        assert_eq!(*playlist.navigation_order().last().unwrap(), 3);
    }

    #[test]
    fn test_load_resets_shuffle_and_cursor() {
        let mut playlist = playlist_of(4);
        playlist.select(1).unwrap();
        playlist.toggle_shuffle();

        playlist.load(vec![Track::remote("One", "https://www.youtube.com/watch?v=1", "Mix")]);
        assert!(!playlist.is_shuffled());
        assert_eq!(playlist.current_index(), None);
        assert_eq!(playlist.next().unwrap(), Some(0));
    }

    #[test]
    fn test_select_out_of_range() {
        let mut playlist = playlist_of(2);
        assert!(matches!(playlist.select(5), Err(EngineError::OutOfRange { index: 5, len: 2 })));
    }
}
