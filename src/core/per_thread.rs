//! Purpose: Cache one lazily-built value per thread per logical key.
//! Exports: `get_or_create`, `invalidate`.
//! Role: Lets the API client reuse one HTTP agent per calling thread.
//! Invariants: Values never cross threads; each thread only sees what it built.
//! Invariants: The constructor runs at most once per thread per generation (reset starts one).
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;

thread_local! {
    static SLOTS: RefCell<HashMap<String, Box<dyn Any>>> = RefCell::new(HashMap::new());
}

/// Return the calling thread's value for `key`, building it with `construct` when absent
/// or when `reset` is set. A value of another type cached under the same key is replaced.
///
/// The constructor runs outside the slot borrow, so it may itself use this cache.
pub fn get_or_create<T, F>(key: &str, construct: F, reset: bool) -> T
where
    T: Clone + 'static,
    F: FnOnce() -> T,
{
    if !reset {
        let cached = SLOTS.with(|slots| {
            slots
                .borrow()
                .get(key)
                .and_then(|value| value.downcast_ref::<T>())
                .cloned()
        });
        if let Some(value) = cached {
            return value;
        }
    }

    let value = construct();
    SLOTS.with(|slots| {
        slots
            .borrow_mut()
            .insert(key.to_string(), Box::new(value.clone()));
    });
    value
}

/// Drop the calling thread's value for `key`. Returns whether one was cached.
pub fn invalidate(key: &str) -> bool {
    SLOTS.with(|slots| slots.borrow_mut().remove(key).is_some())
}

#[cfg(test)]
mod tests {
    use super::{get_or_create, invalidate};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn constructs_once_per_generation() {
        let calls = Cell::new(0);
        let construct = || {
            calls.set(calls.get() + 1);
            calls.get()
        };
        assert_eq!(get_or_create("once", construct, false), 1);
        assert_eq!(get_or_create("once", construct, false), 1);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn reset_always_reconstructs_and_discards_previous() {
        let first = get_or_create("reset", || Rc::new(RefCell::new(vec![1])), false);
        first.borrow_mut().push(2);

        let second = get_or_create("reset", || Rc::new(RefCell::new(vec![9])), true);
        assert!(!Rc::ptr_eq(&first, &second));
        assert_eq!(*second.borrow(), vec![9]);

        let third = get_or_create("reset", || Rc::new(RefCell::new(vec![0])), false);
        assert!(Rc::ptr_eq(&second, &third));
    }

    #[test]
    fn keys_are_independent() {
        assert_eq!(get_or_create("left", || "l".to_string(), false), "l");
        assert_eq!(get_or_create("right", || "r".to_string(), false), "r");
        assert_eq!(get_or_create("left", || "x".to_string(), false), "l");
    }

    #[test]
    fn invalidate_forces_rebuild() {
        assert_eq!(get_or_create("gone", || 1u32, false), 1);
        assert!(invalidate("gone"));
        assert!(!invalidate("gone"));
        assert_eq!(get_or_create("gone", || 2u32, false), 2);
    }

    #[test]
    fn type_change_under_same_key_replaces_value() {
        assert_eq!(get_or_create("typed", || 7u64, false), 7);
        assert_eq!(get_or_create("typed", || "seven".to_string(), false), "seven");
    }

    #[test]
    fn constructor_may_use_cache() {
        let outer = get_or_create(
            "outer",
            || get_or_create("inner", || 3i32, false) + 1,
            false,
        );
        assert_eq!(outer, 4);
    }

    #[test]
    fn values_are_not_shared_between_threads() {
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2usize)
            .map(|idx| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let mine = get_or_create(
                        "shared-key",
                        || Rc::new(RefCell::new(vec![idx])),
                        false,
                    );
                    mine.borrow_mut().push(idx * 10);
                    barrier.wait();
                    let again = get_or_create(
                        "shared-key",
                        || Rc::new(RefCell::new(Vec::new())),
                        false,
                    );
                    let seen = again.borrow().clone();
                    seen
                })
            })
            .collect();

        let mut results: Vec<Vec<usize>> = handles
            .into_iter()
            .map(|handle| handle.join().expect("join"))
            .collect();
        results.sort();
        assert_eq!(results, vec![vec![0, 0], vec![1, 10]]);
    }
}
