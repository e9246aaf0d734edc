//! Generation-checked arena with an intrusive membership list.
//!
//! Holds the in-flight deliveries of a [`Pipe`](crate::pipe::Pipe). Entries are
//! addressed by a [`DeliveryId`] that stays valid until the entry is removed;
//! a removed or reused slot bumps its generation, so a stale id can never reach
//! another entry. The list is doubly linked through the slots, so removing an
//! entry out of order is O(1).

/// Stable address of one pending entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeliveryId {
    index: u32,
    generation: u32,
}

impl DeliveryId {
    /// Slot index inside the arena.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when the entry was inserted.
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
struct Node<T> {
    value: T,
    prev: Option<u32>,
    next: Option<u32>,
}

#[derive(Debug)]
enum Entry<T> {
    Occupied { generation: u32, node: Node<T> },
    Vacant { generation: u32, next_free: Option<u32> },
}

/// Arena of pending entries, newest first.
#[derive(Debug)]
pub struct PendingList<T> {
    entries: Vec<Entry<T>>,
    free_head: Option<u32>,
    head: Option<u32>,
    len: usize,
}

impl<T> PendingList<T> {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free_head: None,
            head: None,
            len: 0,
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert at the head a value built from its own id.
    pub fn push_front_with(&mut self, make: impl FnOnce(DeliveryId) -> T) -> DeliveryId {
        let (index, generation) = match self.free_head {
            Some(index) => match self.entries[index as usize] {
                Entry::Vacant {
                    generation,
                    next_free,
                } => {
                    self.free_head = next_free;
                    (index, generation)
                }
                Entry::Occupied { .. } => unreachable!("free list must point to vacant slots"),
            },
            None => {
                let index = u32::try_from(self.entries.len()).unwrap_or(u32::MAX);
                self.entries.push(Entry::Vacant {
                    generation: 0,
                    next_free: None,
                });
                (index, 0)
            }
        };

        let id = DeliveryId { index, generation };
        let old_head = self.head;
        self.entries[index as usize] = Entry::Occupied {
            generation,
            node: Node {
                value: make(id),
                prev: None,
                next: old_head,
            },
        };
        if let Some(old) = old_head {
            if let Some(node) = self.node_mut(old) {
                node.prev = Some(index);
            }
        }
        self.head = Some(index);
        self.len += 1;
        id
    }

    /// Whether `id` still refers to a live entry.
    #[must_use]
    pub fn contains(&self, id: DeliveryId) -> bool {
        self.get(id).is_some()
    }

    /// Borrow the entry at `id`.
    #[must_use]
    pub fn get(&self, id: DeliveryId) -> Option<&T> {
        match self.entries.get(id.index as usize)? {
            Entry::Occupied { generation, node } if *generation == id.generation => {
                Some(&node.value)
            }
            _ => None,
        }
    }

    /// Unlink and return the entry at `id`.
    pub fn remove(&mut self, id: DeliveryId) -> Option<T> {
        if !self.contains(id) {
            return None;
        }
        Some(self.take(id.index))
    }

    /// Unlink and return the head entry.
    pub fn pop_front(&mut self) -> Option<(DeliveryId, T)> {
        let index = self.head?;
        let generation = match &self.entries[index as usize] {
            Entry::Occupied { generation, .. } => *generation,
            Entry::Vacant { .. } => unreachable!("head must point to an occupied slot"),
        };
        Some((DeliveryId { index, generation }, self.take(index)))
    }

    /// Ids in list order, newest first.
    #[must_use]
    pub fn ids(&self) -> Vec<DeliveryId> {
        let mut ids = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(index) = cursor {
            match &self.entries[index as usize] {
                Entry::Occupied { generation, node } => {
                    ids.push(DeliveryId {
                        index,
                        generation: *generation,
                    });
                    cursor = node.next;
                }
                Entry::Vacant { .. } => break,
            }
        }
        ids
    }

    fn node_mut(&mut self, index: u32) -> Option<&mut Node<T>> {
        match self.entries.get_mut(index as usize)? {
            Entry::Occupied { node, .. } => Some(node),
            Entry::Vacant { .. } => None,
        }
    }

    /// Vacate an occupied slot and splice it out of the list.
    fn take(&mut self, index: u32) -> T {
        let vacant = Entry::Vacant {
            generation: 0,
            next_free: self.free_head,
        };
        let (generation, node) = match std::mem::replace(&mut self.entries[index as usize], vacant)
        {
            Entry::Occupied { generation, node } => (generation, node),
            Entry::Vacant { .. } => unreachable!("take called on a vacant slot"),
        };
        self.entries[index as usize] = Entry::Vacant {
            generation: generation.wrapping_add(1),
            next_free: self.free_head,
        };
        self.free_head = Some(index);

        match node.prev {
            Some(prev) => {
                if let Some(prev) = self.node_mut(prev) {
                    prev.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        if let Some(next) = node.next {
            if let Some(next) = self.node_mut(next) {
                next.prev = node.prev;
            }
        }
        self.len -= 1;
        node.value
    }
}

impl<T> Default for PendingList<T> {
    fn default() -> Self {
        Self::new()
    }
}
