use std::collections::VecDeque;

use rand::seq::SliceRandom;

use crate::{
    common::{ClientError, ClientResult},
    track::QueueItem,
};

/// Operations a player needs from its queue.
///
/// `current` is never part of the upcoming sequence: `get(0)` is always the
/// first track that will play next.
pub trait QueueBehavior: Send + Sync {
    fn current(&self) -> Option<&QueueItem>;
    fn set_current(&mut self, item: Option<QueueItem>) -> Option<QueueItem>;
    fn previous(&self) -> Option<&QueueItem>;
    fn set_previous(&mut self, item: Option<QueueItem>);

    /// Adds tracks, filling `current` first when it is empty.
    fn add(&mut self, items: Vec<QueueItem>, offset: Option<usize>) -> ClientResult<()>;
    fn remove(&mut self, position: usize) -> ClientResult<QueueItem>;
    /// Removes `start..end`; `end` is clamped to the queue length.
    fn remove_range(&mut self, start: usize, end: usize) -> ClientResult<Vec<QueueItem>>;
    fn clear(&mut self);
    fn shuffle(&mut self);
    /// Takes the first upcoming track.
    fn shift(&mut self) -> Option<QueueItem>;
    fn push(&mut self, item: QueueItem);
    fn get(&self, index: usize) -> Option<&QueueItem>;
    fn len(&self) -> usize;
    fn upcoming(&self) -> Vec<QueueItem>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Upcoming tracks plus the current one.
    fn total_size(&self) -> usize {
        self.len() + usize::from(self.current().is_some())
    }

    /// Sum of every known duration, current included, in milliseconds.
    fn duration(&self) -> u64 {
        let current = self.current().and_then(QueueItem::duration).unwrap_or(0);
        self.upcoming()
            .iter()
            .filter_map(QueueItem::duration)
            .fold(current, |acc, d| acc.saturating_add(d))
    }
}

/// Builds the queue of every new player.
pub type QueueFactory = std::sync::Arc<dyn Fn() -> Box<dyn QueueBehavior> + Send + Sync>;

pub fn default_queue_factory() -> QueueFactory {
    std::sync::Arc::new(|| Box::new(Queue::default()))
}

#[derive(Debug, Clone, Default)]
pub struct Queue {
    tracks: VecDeque<QueueItem>,
    current: Option<QueueItem>,
    previous: Option<QueueItem>,
}

impl Queue {
    pub fn iter(&self) -> impl Iterator<Item = &QueueItem> {
        self.tracks.iter()
    }
}

impl QueueBehavior for Queue {
    fn current(&self) -> Option<&QueueItem> {
        self.current.as_ref()
    }

    fn set_current(&mut self, item: Option<QueueItem>) -> Option<QueueItem> {
        std::mem::replace(&mut self.current, item)
    }

    fn previous(&self) -> Option<&QueueItem> {
        self.previous.as_ref()
    }

    fn set_previous(&mut self, item: Option<QueueItem>) {
        self.previous = item;
    }

    fn add(&mut self, items: Vec<QueueItem>, offset: Option<usize>) -> ClientResult<()> {
        if let Some(offset) = offset {
            if offset > self.tracks.len() {
                return Err(ClientError::QueueOffset {
                    offset,
                    len: self.tracks.len(),
                });
            }
        }

        let mut items = items.into_iter();
        if self.current.is_none() {
            self.current = items.next();
        }

        match offset {
            Some(offset) => {
                for (i, item) in items.enumerate() {
                    self.tracks.insert(offset + i, item);
                }
            }
            None => self.tracks.extend(items),
        }
        Ok(())
    }

    fn remove(&mut self, position: usize) -> ClientResult<QueueItem> {
        let len = self.tracks.len();
        self.tracks.remove(position).ok_or(ClientError::QueueRange {
            start: position,
            end: position + 1,
            len,
        })
    }

    fn remove_range(&mut self, start: usize, end: usize) -> ClientResult<Vec<QueueItem>> {
        let len = self.tracks.len();
        if start >= end || start >= len {
            return Err(ClientError::QueueRange { start, end, len });
        }
        Ok(self.tracks.drain(start..end.min(len)).collect())
    }

    fn clear(&mut self) {
        self.tracks.clear();
    }

    fn shuffle(&mut self) {
        self.tracks
            .make_contiguous()
            .shuffle(&mut rand::thread_rng());
    }

    fn shift(&mut self) -> Option<QueueItem> {
        self.tracks.pop_front()
    }

    fn push(&mut self, item: QueueItem) {
        self.tracks.push_back(item);
    }

    fn get(&self, index: usize) -> Option<&QueueItem> {
        self.tracks.get(index)
    }

    fn len(&self) -> usize {
        self.tracks.len()
    }

    fn upcoming(&self) -> Vec<QueueItem> {
        self.tracks.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{UnresolvedTrack, tests::track};

    fn item(title: &str) -> QueueItem {
        track(title, 1000).into()
    }

    fn titles(queue: &Queue) -> Vec<String> {
        queue.iter().map(|t| t.title().to_string()).collect()
    }

    #[test]
    fn test_add_single_fills_current_only() {
        let mut queue = Queue::default();
        queue.add(vec![item("A")], None).unwrap();

        assert_eq!(queue.current().map(QueueItem::title), Some("A"));
        assert!(queue.is_empty());
        assert_eq!(queue.total_size(), 1);
    }

    #[test]
    fn test_add_batch_fills_current_then_queues_rest() {
        let mut queue = Queue::default();
        queue.add(vec![item("A"), item("B")], None).unwrap();

        assert_eq!(queue.current().map(QueueItem::title), Some("A"));
        assert_eq!(titles(&queue), vec!["B"]);
        assert_eq!(queue.get(0).map(QueueItem::title), Some("B"));
    }

    #[test]
    fn test_add_at_offset_keeps_batch_order() {
        let mut queue = Queue::default();
        queue
            .add(vec![item("C"), item("A"), item("D")], None)
            .unwrap();
        queue.add(vec![item("B1"), item("B2")], Some(1)).unwrap();

        assert_eq!(titles(&queue), vec!["A", "B1", "B2", "D"]);
    }

    #[test]
    fn test_add_rejects_offset_past_end() {
        let mut queue = Queue::default();
        queue.add(vec![item("C"), item("A")], None).unwrap();

        let err = queue.add(vec![item("X")], Some(2)).unwrap_err();
        assert!(matches!(err, ClientError::QueueOffset { offset: 2, len: 1 }));
        assert_eq!(titles(&queue), vec!["A"]);
    }

    #[test]
    fn test_remove_range_validates_bounds() {
        let mut queue = Queue::default();
        queue
            .add(vec![item("C"), item("A"), item("B"), item("D")], None)
            .unwrap();

        assert!(queue.remove_range(2, 1).is_err());
        assert!(queue.remove_range(3, 5).is_err());

        let removed = queue.remove_range(1, 10).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(titles(&queue), vec!["A"]);

        assert_eq!(queue.remove(0).unwrap().title(), "A");
        assert!(queue.remove(0).is_err());
    }

    #[test]
    fn test_duration_includes_current_and_known_hints() {
        let mut queue = Queue::default();
        queue
            .add(
                vec![
                    item("C"),
                    item("A"),
                    UnresolvedTrack::new("hint").with_duration(500).into(),
                    UnresolvedTrack::new("no hint").into(),
                ],
                None,
            )
            .unwrap();

        assert_eq!(queue.duration(), 2500);
        assert_eq!(queue.total_size(), 4);
    }

    #[test]
    fn test_shuffle_keeps_current_out_of_the_sequence() {
        let mut queue = Queue::default();
        let batch = (0..20).map(|i| item(&i.to_string())).collect();
        queue.add(batch, None).unwrap();
        queue.shuffle();

        assert_eq!(queue.current().map(QueueItem::title), Some("0"));
        assert_eq!(queue.len(), 19);
        let mut sorted = titles(&queue);
        sorted.sort_by_key(|t| t.parse::<u32>().unwrap());
        let expected: Vec<String> = (1..20).map(|i| i.to_string()).collect();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn test_clear_keeps_current() {
        let mut queue = Queue::default();
        queue.add(vec![item("C"), item("A")], None).unwrap();
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.current().is_some());
    }
}
