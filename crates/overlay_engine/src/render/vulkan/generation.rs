//! Single-owner slot for resources that are rebuilt wholesale
//!
//! Swapchain-dependent objects are never patched: the old generation is
//! dropped completely, then the next one is built. At most one generation
//! is alive at any time, so nothing can reference a stale image view.

/// Holds at most one generation of `T`
#[derive(Debug)]
pub struct GenerationSlot<T> {
    current: Option<T>,
    generation: u64,
}

impl<T> Default for GenerationSlot<T> {
    fn default() -> Self {
        Self {
            current: None,
            generation: 0,
        }
    }
}

impl<T> GenerationSlot<T> {
    /// Empty slot at generation 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the current value, then build and store the next generation
    ///
    /// On error the slot stays empty and the generation is not advanced.
    pub fn replace_with<E>(&mut self, build: impl FnOnce(u64) -> Result<T, E>) -> Result<&mut T, E> {
        self.current = None;

        let next = self.generation + 1;
        let value = build(next)?;
        self.generation = next;
        Ok(self.current.insert(value))
    }

    /// Release the current value without building a new one
    ///
    /// Used when something the value depends on must be replaced first.
    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Current value, if any
    pub fn get(&self) -> Option<&T> {
        self.current.as_ref()
    }

    /// Generation number of the most recently built value
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the slot holds nothing
    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        Built(u64),
        Dropped(u64),
    }

    struct Tracked {
        generation: u64,
        log: Rc<RefCell<Vec<Event>>>,
        alive: Rc<RefCell<usize>>,
    }

    impl Tracked {
        fn build(generation: u64, log: &Rc<RefCell<Vec<Event>>>, alive: &Rc<RefCell<usize>>) -> Self {
            *alive.borrow_mut() += 1;
            assert_eq!(*alive.borrow(), 1, "previous generation still alive while building {}", generation);
            log.borrow_mut().push(Event::Built(generation));
            Self {
                generation,
                log: Rc::clone(log),
                alive: Rc::clone(alive),
            }
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            *self.alive.borrow_mut() -= 1;
            self.log.borrow_mut().push(Event::Dropped(self.generation));
        }
    }

    #[test]
    fn test_resize_storm_releases_each_generation_first() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let alive = Rc::new(RefCell::new(0));
        let mut slot = GenerationSlot::new();

        for _ in 0..50 {
            let built = slot
                .replace_with(|generation| Ok::<_, ()>(Tracked::build(generation, &log, &alive)))
                .unwrap();
            assert_eq!(built.generation, slot_generation_hint(&log));
            assert_eq!(*alive.borrow(), 1);
        }
        assert_eq!(slot.generation(), 50);

        let events = log.borrow().clone();
        assert_eq!(events[0], Event::Built(1));
        for generation in 2..=50 {
            let dropped = events.iter().position(|e| *e == Event::Dropped(generation - 1)).unwrap();
            let built = events.iter().position(|e| *e == Event::Built(generation)).unwrap();
            assert!(dropped < built, "generation {} built before {} was released", generation, generation - 1);
        }

        drop(slot);
        assert_eq!(*alive.borrow(), 0);
    }

    fn slot_generation_hint(log: &Rc<RefCell<Vec<Event>>>) -> u64 {
        log.borrow()
            .iter()
            .rev()
            .find_map(|e| match e {
                Event::Built(g) => Some(*g),
                Event::Dropped(_) => None,
            })
            .unwrap_or(0)
    }

    #[test]
    fn test_failed_build_leaves_slot_empty() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let alive = Rc::new(RefCell::new(0));
        let mut slot = GenerationSlot::new();

        slot.replace_with(|g| Ok::<_, &str>(Tracked::build(g, &log, &alive))).unwrap();
        let result = slot.replace_with(|_| Err::<Tracked, _>("surface lost"));

        assert_eq!(result.err(), Some("surface lost"));
        assert!(slot.is_empty());
        assert_eq!(slot.generation(), 1);
        assert_eq!(*alive.borrow(), 0);

        // Recovery builds generation 2
        slot.replace_with(|g| Ok::<_, &str>(Tracked::build(g, &log, &alive))).unwrap();
        assert_eq!(slot.get().map(|t| t.generation), Some(2));
    }

    #[test]
    fn test_clear() {
        let mut slot = GenerationSlot::new();
        slot.replace_with(|g| Ok::<_, ()>(g)).unwrap();
        assert_eq!(slot.get(), Some(&1));
        slot.clear();
        assert!(slot.is_empty());
        assert_eq!(slot.generation(), 1);
    }
}
