//! Pending command store
//!
//! Commands are keyed by (remote, action) so a second request for the same
//! remote and action widens the first one instead of queueing another frame.
//! Keys are kept in submission order.

use std::collections::{HashMap, VecDeque};

use crate::protocol::types::{BlindAction, ChannelMask};

/// Identity of a pending command in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingKey {
    /// 1-based remote index
    pub remote: usize,

    /// Requested action
    pub action: BlindAction,

    /// Duplicate frame sent ahead of `action` (join or remove)
    pub precursor: bool,
}

impl PendingKey {
    pub fn new(remote: usize, action: BlindAction) -> Self {
        Self {
            remote,
            action,
            precursor: false,
        }
    }

    /// Key of the duplicate frame preceding a group `action`
    pub fn precursor(remote: usize, action: BlindAction) -> Self {
        Self {
            remote,
            action,
            precursor: true,
        }
    }

    /// Action carried on air
    pub fn wire_action(&self) -> BlindAction {
        if self.precursor {
            BlindAction::Duplicate
        } else {
            self.action
        }
    }
}

/// A queued, possibly merged, command awaiting transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCommand {
    pub key: PendingKey,
    pub mask: ChannelMask,
    pub attempts_remaining: u8,
}

impl PendingCommand {
    /// Action carried on air
    pub fn action(&self) -> BlindAction {
        self.key.wire_action()
    }
}

/// Bounded, ordered, merge-on-submit store
#[derive(Debug)]
pub struct PendingQueue {
    entries: HashMap<PendingKey, PendingCommand>,
    order: VecDeque<PendingKey>,
    capacity: usize,
    attempts: u8,
}

impl PendingQueue {
    /// Create an empty store
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of distinct entries
    /// * `attempts` - Transmissions per command
    pub fn new(capacity: usize, attempts: u8) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
            attempts,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add or merge a group of commands, all or nothing
    ///
    /// Existing keys get their mask OR-merged and their attempts reset to
    /// the full budget; other keys are appended in the given order.
    ///
    /// # Returns
    ///
    /// `false` without touching the store if the new keys do not fit.
    pub fn submit_all(&mut self, commands: &[(PendingKey, ChannelMask)]) -> bool {
        let new_keys = commands
            .iter()
            .filter(|(key, _)| !self.entries.contains_key(key))
            .count();
        if self.len() + new_keys > self.capacity {
            return false;
        }

        for &(key, mask) in commands {
            let attempts = self.attempts;
            match self.entries.get_mut(&key) {
                Some(existing) => {
                    existing.mask = existing.mask.merge(mask);
                    existing.attempts_remaining = attempts;
                }
                None => {
                    self.entries.insert(
                        key,
                        PendingCommand {
                            key,
                            mask,
                            attempts_remaining: attempts,
                        },
                    );
                    self.order.push_back(key);
                }
            }
        }
        true
    }

    /// Add or merge a single command
    pub fn submit(&mut self, key: PendingKey, mask: ChannelMask) -> bool {
        self.submit_all(&[(key, mask)])
    }

    /// Take the oldest command out of the store
    pub fn pop_front(&mut self) -> Option<PendingCommand> {
        let key = self.order.pop_front()?;
        self.entries.remove(&key)
    }

    /// Take the oldest command together with the group command that must
    /// follow it on air
    ///
    /// A duplicate is returned with its join/remove, which leaves the store
    /// at the same time. A join/remove reached without its duplicate gets a
    /// single-shot duplicate in front of it.
    pub fn pop_dispatch(&mut self) -> Option<(PendingCommand, Option<PendingCommand>)> {
        let first = self.pop_front()?;
        let key = first.key;

        if key.precursor {
            let partner = self.take(&PendingKey::new(key.remote, key.action));
            return Some((first, partner));
        }
        if key.action.requires_duplicate() {
            let duplicate = PendingCommand {
                key: PendingKey::precursor(key.remote, key.action),
                mask: first.mask,
                attempts_remaining: 1,
            };
            return Some((duplicate, Some(first)));
        }
        Some((first, None))
    }

    fn take(&mut self, key: &PendingKey) -> Option<PendingCommand> {
        let command = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        Some(command)
    }

    /// Put a command that still has attempts left back at the end
    ///
    /// If a newer submission for the same key arrived meanwhile, the command
    /// is folded into it and keeps the newer attempt budget.
    pub fn requeue(&mut self, command: PendingCommand) {
        if let Some(existing) = self.entries.get_mut(&command.key) {
            existing.mask = existing.mask.merge(command.mask);
            return;
        }
        self.entries.insert(command.key, command);
        self.order.push_back(command.key);
    }

    /// Pending commands in transmission order
    pub fn snapshot(&self) -> Vec<PendingCommand> {
        self.order
            .iter()
            .filter_map(|key| self.entries.get(key).copied())
            .collect()
    }
}
