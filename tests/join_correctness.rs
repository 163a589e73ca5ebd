//! Verifies `join`'s two calling contexts: from within another fiber (it
//! parks and resumes once the target terminates) and from the OS thread
//! driving the scheduler directly (it drives `step()` to completion).

use fiberrt::{self, SchedulerConfig};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

mod common;

#[test]
fn join_from_a_fiber_observes_the_targets_side_effects() {
    std::thread::spawn(|| {
        common::init_logging();
        fiberrt::init(SchedulerConfig::default());

        let result = Rc::new(RefCell::new(None));
        let target = fiberrt::spawn(move || {
            fiberrt::sleep(Duration::from_millis(5));
            "done"
        })
        .unwrap();
        let target_id = target.fiber_id();

        let joiner_result = Rc::clone(&result);
        fiberrt::create(move || {
            fiberrt::join(target_id).unwrap();
            *joiner_result.borrow_mut() = Some("joiner observed termination");
        });

        fiberrt::run().unwrap();
        assert_eq!(*result.borrow(), Some("joiner observed termination"));
        assert_eq!(target.join(), "done");
    })
    .join()
    .unwrap();
}

#[test]
fn join_from_outside_any_fiber_drives_the_scheduler_to_completion() {
    std::thread::spawn(|| {
        common::init_logging();
        fiberrt::init(SchedulerConfig::default());

        let ran = Rc::new(std::cell::Cell::new(false));
        let inner_ran = Rc::clone(&ran);
        let id = fiberrt::create(move || {
            fiberrt::yield_now();
            fiberrt::sleep(Duration::from_millis(5));
            inner_ran.set(true);
        });

        // No `run()` call at all: `join` by itself must step the
        // scheduler until `id` terminates, since it's called from the
        // OS thread rather than from within a fiber.
        fiberrt::join(id).unwrap();
        assert!(ran.get());
    })
    .join()
    .unwrap();
}

#[test]
fn joining_a_fiber_that_already_finished_returns_immediately() {
    std::thread::spawn(|| {
        common::init_logging();
        fiberrt::init(SchedulerConfig::default());

        let id = fiberrt::create(|| {});
        fiberrt::run().unwrap();

        // The fiber is long gone by now; `join` should see it recorded
        // as `Terminated` in `all_fibers` and return without blocking.
        fiberrt::join(id).unwrap();
    })
    .join()
    .unwrap();
}

#[test]
fn joining_an_unknown_fiber_id_is_an_error() {
    // `FiberId`'s constructor is crate-private, so the only way to get
    // one from outside that a scheduler has never heard of is to mint it
    // on a different thread's independent scheduler.
    let foreign_id = std::thread::spawn(|| {
        common::init_logging();
        fiberrt::init(SchedulerConfig::default());
        fiberrt::create(|| {})
    })
    .join()
    .unwrap();

    std::thread::spawn(move || {
        common::init_logging();
        fiberrt::init(SchedulerConfig::default());
        let err = fiberrt::join(foreign_id).unwrap_err();
        assert!(matches!(err, fiberrt::Error::InvalidFiberId(_)));
    })
    .join()
    .unwrap();
}
