//! The peer ring.
//!
//! Members sit on a ring in nickname order. Each shares one secret with its
//! left neighbour and one with its right neighbour.

use concord_types::RingIndex;

use crate::participant::ParticipantMap;

/// A position on a ring of `len` members.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingPosition {
    index: RingIndex,
    len: RingIndex,
}

impl RingPosition {
    /// `None` unless `index < len`.
    pub fn new(index: RingIndex, len: RingIndex) -> Option<Self> {
        (index < len).then_some(Self { index, len })
    }

    pub fn index(self) -> RingIndex {
        self.index
    }

    pub fn ring_len(self) -> RingIndex {
        self.len
    }

    pub fn left(self) -> Self {
        let index = self.index.checked_sub(1).unwrap_or(self.len - 1);
        Self { index, ..self }
    }

    pub fn right(self) -> Self {
        let next = self.index + 1;
        let index = if next == self.len { 0 } else { next };
        Self { index, ..self }
    }

    pub fn as_usize(self) -> usize {
        self.index as usize
    }
}

/// Sorted member nicknames.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ring {
    members: Vec<String>,
}

impl Ring {
    pub fn from_participants(participants: &ParticipantMap) -> Self {
        Self {
            members: participants.keys().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn nickname_at(&self, index: RingIndex) -> Option<&str> {
        self.members.get(index as usize).map(String::as_str)
    }

    pub fn index_of(&self, nickname: &str) -> Option<RingIndex> {
        self.members
            .binary_search_by(|m| m.as_str().cmp(nickname))
            .ok()
            .map(|i| i as RingIndex)
    }

    pub fn position_of(&self, nickname: &str) -> Option<RingPosition> {
        let index = self.index_of(nickname)?;
        RingPosition::new(index, self.members.len() as RingIndex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbours_wrap() {
        let first = RingPosition::new(0, 3).expect("position");
        assert_eq!(first.left().index(), 2);
        assert_eq!(first.right().index(), 1);

        let last = RingPosition::new(2, 3).expect("position");
        assert_eq!(last.right().index(), 0);
        assert_eq!(last.left().index(), 1);
    }

    #[test]
    fn test_single_member_is_own_neighbour() {
        let only = RingPosition::new(0, 1).expect("position");
        assert_eq!(only.left(), only);
        assert_eq!(only.right(), only);
    }

    #[test]
    fn test_out_of_range_position() {
        assert!(RingPosition::new(3, 3).is_none());
        assert!(RingPosition::new(0, 0).is_none());
    }

    #[test]
    fn test_ring_lookup() {
        let ring = Ring {
            members: vec!["alice".into(), "bob".into(), "carol".into()],
        };
        assert_eq!(ring.index_of("bob"), Some(1));
        assert_eq!(ring.index_of("dave"), None);
        assert_eq!(ring.nickname_at(2), Some("carol"));
        assert_eq!(ring.position_of("alice").map(|p| p.left().index()), Some(2));
    }
}
