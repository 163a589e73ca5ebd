//! Verifies `sync::Mutex` actually excludes concurrent access across
//! fibers, and that a long queue of contenders all eventually get in.

use fiberrt::sync::Mutex;
use fiberrt::{self, SchedulerConfig};
use std::rc::Rc;

mod common;

#[test]
fn mutex_excludes_concurrent_access_across_fibers() {
    std::thread::spawn(|| {
        common::init_logging();
        fiberrt::init(SchedulerConfig::default());

        // Guarded by the mutex: `inside` counts how many fibers are
        // between `lock()` and `unlock()` at once, `max_seen` is the
        // high-water mark. If the mutex ever let two fibers in together,
        // `max_seen` would end up above 1.
        let mutex = Rc::new(Mutex::new((0u32, 0u32)));

        for _ in 0..8 {
            let mutex = Rc::clone(&mutex);
            fiberrt::create(move || {
                for _ in 0..20 {
                    let mut guard = mutex.lock();
                    guard.0 += 1;
                    let inside = guard.0;
                    if inside > guard.1 {
                        guard.1 = inside;
                    }
                    fiberrt::yield_now();
                    guard.0 -= 1;
                }
            });
        }

        fiberrt::run().unwrap();
        let (inside, max_seen) = *mutex.lock();
        assert_eq!(inside, 0);
        assert_eq!(max_seen, 1, "more than one fiber was inside the critical section at once");
    })
    .join()
    .unwrap();
}

#[test]
fn every_contender_eventually_acquires_the_lock() {
    std::thread::spawn(|| {
        common::init_logging();
        fiberrt::init(SchedulerConfig::default());

        let mutex = Rc::new(Mutex::new(0u32));
        let acquired = Rc::new(std::cell::RefCell::new(vec![false; 10]));

        for idx in 0..10 {
            let mutex = Rc::clone(&mutex);
            let acquired = Rc::clone(&acquired);
            fiberrt::create(move || {
                let mut guard = mutex.lock();
                *guard += 1;
                acquired.borrow_mut()[idx] = true;
            });
        }

        fiberrt::run().unwrap();
        assert!(acquired.borrow().iter().all(|&got_in| got_in));
        assert_eq!(*mutex.lock(), 10);
    })
    .join()
    .unwrap();
}
