use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::oop::Oop;

#[derive(Debug, Clone, Copy)]
struct HandleSlot {
    oop: Oop,
    prev: Option<usize>,
    next: Option<usize>,
}

/// The registry of live handle guards.
///
/// An index-based doubly linked list over a slab of slots, so guards can be released
/// in any order.
#[derive(Debug, Default)]
pub(crate) struct HandleList {
    slots: Vec<Option<HandleSlot>>,
    vacant: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl HandleList {
    fn link(&mut self, oop: Oop) -> usize {
        let slot = HandleSlot {
            oop,
            prev: self.tail,
            next: None,
        };
        let idx = match self.vacant.pop() {
            Some(idx) => {
                self.slots[idx] = Some(slot);
                idx
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };
        match self.tail {
            Some(tail) => {
                if let Some(tail) = self.slots[tail].as_mut() {
                    tail.next = Some(idx);
                }
            }
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
        self.len += 1;
        idx
    }

    fn unlink(&mut self, idx: usize) {
        let Some(slot) = self.slots.get_mut(idx).and_then(Option::take) else {
            return;
        };
        match slot.prev {
            Some(prev) => {
                if let Some(prev) = self.slots[prev].as_mut() {
                    prev.next = slot.next;
                }
            }
            None => self.head = slot.next,
        }
        match slot.next {
            Some(next) => {
                if let Some(next) = self.slots[next].as_mut() {
                    next.prev = slot.prev;
                }
            }
            None => self.tail = slot.prev,
        }
        self.vacant.push(idx);
        self.len -= 1;
    }

    fn get(&self, idx: usize) -> Oop {
        self.slots[idx].map_or(Oop::NIL, |slot| slot.oop)
    }

    fn set(&mut self, idx: usize, oop: Oop) {
        if let Some(slot) = self.slots[idx].as_mut() {
            slot.oop = oop;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// The referents of every live guard, from the oldest to the most recent.
    pub fn roots(&self) -> Vec<Oop> {
        let mut roots = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let Some(slot) = self.slots[idx] else {
                break;
            };
            roots.push(slot.oop);
            cursor = slot.next;
        }
        roots
    }
}

/// A transient GC root.
///
/// The guarded object (and everything reachable from it) survives collections for as
/// long as the guard is alive.
/// Dropping the guard unregisters it.
pub struct HandleGuard {
    list: Rc<RefCell<HandleList>>,
    slot: usize,
}

impl HandleGuard {
    pub(crate) fn new(list: &Rc<RefCell<HandleList>>, oop: Oop) -> Self {
        let slot = list.borrow_mut().link(oop);
        Self {
            list: Rc::clone(list),
            slot,
        }
    }

    /// The guarded object.
    pub fn get(&self) -> Oop {
        self.list.borrow().get(self.slot)
    }

    /// Retargets this guard to another object.
    pub fn set(&self, oop: Oop) {
        self.list.borrow_mut().set(self.slot, oop);
    }
}

impl Clone for HandleGuard {
    fn clone(&self) -> Self {
        Self::new(&self.list, self.get())
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.list.borrow_mut().unlink(self.slot);
    }
}

impl fmt::Debug for HandleGuard {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("HandleGuard").field(&self.get()).finish()
    }
}
