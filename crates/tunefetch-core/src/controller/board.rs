//! Observation board: the authoritative state of every registered item.
//!
//! Each slot owns a `watch` sender so `wait` can await a settled state; every
//! change is also pushed onto the single observer channel.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::{mpsc, watch};

use crate::error::ControlError;
use crate::model::{Actions, Item, ItemEvent, ItemId, ItemState};

/// Copy of one board slot handed to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSnapshot {
    pub item: Item,
    pub state: ItemState,
}

struct Slot {
    seq: u64,
    item: Item,
    state: watch::Sender<ItemState>,
}

struct Slots {
    next_seq: u64,
    by_id: HashMap<ItemId, Slot>,
}

pub(super) struct Board {
    slots: Mutex<Slots>,
    events: mpsc::UnboundedSender<ItemEvent>,
}

impl Board {
    pub(super) fn new(events: mpsc::UnboundedSender<ItemEvent>) -> Self {
        Self {
            slots: Mutex::new(Slots {
                next_seq: 0,
                by_id: HashMap::new(),
            }),
            events,
        }
    }

    /// Places `item` on the board, or refreshes its record if already present.
    /// An active item keeps its state; otherwise `initial` decides it.
    pub(super) fn insert(&self, item: Item, initial: impl FnOnce(&Item) -> ItemState) -> ItemState {
        let mut slots = self.lock();
        if let Some(slot) = slots.by_id.get_mut(&item.id) {
            let current = slot.state.borrow().clone();
            slot.item = item;
            if current.is_active() {
                return current;
            }
            let next = initial(&slot.item);
            self.publish(slot, next.clone());
            return next;
        }
        let state = initial(&item);
        let seq = slots.next_seq;
        slots.next_seq += 1;
        let (tx, _rx) = watch::channel(state.clone());
        let id = item.id.clone();
        slots.by_id.insert(id.clone(), Slot { seq, item, state: tx });
        let _ = self.events.send(ItemEvent {
            item_id: id,
            state: state.clone(),
        });
        state
    }

    pub(super) fn get(&self, id: &str) -> Option<ItemSnapshot> {
        self.lock().by_id.get(id).map(snapshot)
    }

    /// Every slot in registration order.
    pub(super) fn all(&self) -> Vec<ItemSnapshot> {
        let slots = self.lock();
        let mut all: Vec<&Slot> = slots.by_id.values().collect();
        all.sort_by_key(|s| s.seq);
        all.into_iter().map(snapshot).collect()
    }

    pub(super) fn state(&self, id: &str) -> Option<ItemState> {
        self.lock().by_id.get(id).map(|s| s.state.borrow().clone())
    }

    /// Unconditional update from a job task. Unknown ids are ignored.
    pub(super) fn set(&self, id: &str, state: ItemState) {
        let mut slots = self.lock();
        if let Some(slot) = slots.by_id.get_mut(id) {
            self.publish(slot, state);
        }
    }

    /// Checks a command against the state's affordances and, if allowed,
    /// moves to the state `next` computes, all under one lock.
    /// Returns the item and its previous state.
    pub(super) fn transition(
        &self,
        id: &str,
        action: &'static str,
        allowed: impl FnOnce(&Actions) -> bool,
        next: impl FnOnce(&Item, &ItemState) -> ItemState,
    ) -> Result<(Item, ItemState), ControlError> {
        let mut slots = self.lock();
        let slot = slots
            .by_id
            .get_mut(id)
            .ok_or_else(|| ControlError::UnknownItem(id.to_string()))?;
        let previous = slot.state.borrow().clone();
        if !allowed(&previous.actions()) {
            return Err(ControlError::InvalidTransition {
                id: id.to_string(),
                action,
                state: previous.name(),
            });
        }
        let state = next(&slot.item, &previous);
        self.publish(slot, state);
        Ok((slot.item.clone(), previous))
    }

    pub(super) fn subscribe(&self, id: &str) -> Option<watch::Receiver<ItemState>> {
        self.lock().by_id.get(id).map(|s| s.state.subscribe())
    }

    fn publish(&self, slot: &mut Slot, state: ItemState) {
        let changed = *slot.state.borrow() != state;
        slot.state.send_replace(state.clone());
        if changed {
            let _ = self.events.send(ItemEvent {
                item_id: slot.item.id.clone(),
                state,
            });
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn snapshot(slot: &Slot) -> ItemSnapshot {
    ItemSnapshot {
        item: slot.item.clone(),
        state: slot.state.borrow().clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OutputFormat, Source};

    fn item(id: &str) -> Item {
        Item::new(id, "T", "A", Source::TrackCatalogue, OutputFormat::AudioOnly)
    }

    #[test]
    fn insert_publishes_and_keeps_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let board = Board::new(tx);
        board.insert(item("b"), |_| ItemState::Idle);
        board.insert(item("a"), |_| ItemState::Completed);
        let ids: Vec<_> = board.all().into_iter().map(|s| s.item.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(rx.try_recv().unwrap().item_id, "b");
        assert_eq!(rx.try_recv().unwrap().state, ItemState::Completed);
    }

    #[test]
    fn repeated_states_are_not_republished() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let board = Board::new(tx);
        board.insert(item("a"), |_| ItemState::Idle);
        rx.try_recv().unwrap();
        board.set("a", ItemState::Downloading(5.0));
        board.set("a", ItemState::Downloading(5.0));
        board.set("a", ItemState::Downloading(6.0));
        assert_eq!(rx.try_recv().unwrap().state, ItemState::Downloading(5.0));
        assert_eq!(rx.try_recv().unwrap().state, ItemState::Downloading(6.0));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn transition_rejects_disallowed_action() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let board = Board::new(tx);
        board.insert(item("a"), |_| ItemState::Idle);
        let err = board
            .transition("a", "stop", |a| a.stop, |_, _| ItemState::Stopped(0.0))
            .unwrap_err();
        assert!(matches!(err, ControlError::InvalidTransition { state: "idle", .. }));
        assert_eq!(board.state("a"), Some(ItemState::Idle));

        let (_, prev) = board
            .transition("a", "start", |a| a.start, |_, _| ItemState::Queued)
            .unwrap();
        assert_eq!(prev, ItemState::Idle);
        assert_eq!(board.state("a"), Some(ItemState::Queued));

        assert!(matches!(
            board.transition("zz", "start", |a| a.start, |_, _| ItemState::Queued),
            Err(ControlError::UnknownItem(_))
        ));
    }

    #[test]
    fn reinsert_keeps_active_state() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let board = Board::new(tx);
        board.insert(item("a"), |_| ItemState::Idle);
        board.set("a", ItemState::Downloading(30.0));
        let state = board.insert(item("a"), |_| ItemState::Idle);
        assert_eq!(state, ItemState::Downloading(30.0));
    }
}
