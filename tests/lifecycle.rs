use mycoroutine::{Config, Error, MIN_STACK_SIZE, Scheduler, State, Yielder};
use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::rc::Rc;

fn scheduler() -> Scheduler {
    Scheduler::with_config(Config::new().with_stack_size(MIN_STACK_SIZE * 8)).unwrap()
}

type Log = Rc<RefCell<Vec<String>>>;

fn record(log: &Log, line: impl Into<String>) {
    log.borrow_mut().push(line.into());
}

fn mark_called(_: &Yielder<'_>, arg: *mut c_void) {
    unsafe { &*arg.cast::<Cell<bool>>() }.set(true);
}

#[test]
fn retired_coroutine_is_freed_without_running() {
    let scheduler = scheduler();
    let called = Cell::new(false);
    let id = scheduler
        .create(mark_called, (&raw const called).cast_mut().cast(), Some("never"))
        .unwrap();

    scheduler.retire(id).unwrap();
    assert_eq!(scheduler.state(id).unwrap(), State::Exited);
    assert_eq!(scheduler.exited(), vec![id]);

    assert_eq!(scheduler.sweep().unwrap(), 1);
    assert!(!called.get());
    assert!(scheduler.is_empty());
    assert!(matches!(scheduler.state(id), Err(Error::Reclaimed(_))));
}

#[test]
fn locals_survive_every_suspension() {
    const ROUNDS: u64 = 100;

    let scheduler = scheduler();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let id = scheduler
        .spawn(move |y| {
            let mut total = 0u64;
            let mut squares = [0u64; 8];
            for i in 0..ROUNDS {
                total += i;
                squares[(i % 8) as usize] = i * i;
                y.suspend();
                sink.borrow_mut().push((total, squares[(i % 8) as usize]));
            }
        })
        .unwrap();

    for _ in 0..ROUNDS {
        assert_eq!(scheduler.resume(id).unwrap(), State::Suspended);
    }
    assert_eq!(scheduler.resume(id).unwrap(), State::Exited);

    let seen = seen.borrow();
    assert_eq!(seen.len(), ROUNDS as usize);
    for (i, &(total, square)) in seen.iter().enumerate() {
        let i = i as u64;
        assert_eq!(total, i * (i + 1) / 2);
        assert_eq!(square, i * i);
    }
}

#[test]
fn returning_from_the_body_exits_once() {
    let scheduler = scheduler();
    let id = scheduler.spawn(|y| y.suspend()).unwrap();

    scheduler.resume(id).unwrap();
    assert!(scheduler.exited().is_empty());

    assert_eq!(scheduler.resume(id).unwrap(), State::Exited);
    assert_eq!(scheduler.exited(), vec![id]);

    assert_eq!(scheduler.sweep().unwrap(), 1);
    assert!(scheduler.exited().is_empty());
    assert_eq!(scheduler.sweep().unwrap(), 0);
}

#[test]
fn explicit_exit_skips_the_rest_of_the_body() {
    let scheduler = scheduler();
    let log: Log = Rc::default();
    let sink = Rc::clone(&log);
    let id = scheduler
        .spawn(move |y| {
            record(&sink, "before exit");
            drop(sink);
            y.exit();
        })
        .unwrap();

    assert_eq!(scheduler.resume(id).unwrap(), State::Exited);
    assert_eq!(*log.borrow(), ["before exit"]);
    assert_eq!(scheduler.exited(), vec![id]);
    assert!(matches!(
        scheduler.resume(id),
        Err(Error::InvalidState { state: State::Exited, .. })
    ));

    scheduler.sweep().unwrap();
    assert!(scheduler.exited().is_empty());
}

#[test]
fn alternating_resumes_run_in_order() {
    let scheduler = scheduler();
    let log: Log = Rc::default();

    let spawn = |name: &'static str| {
        let sink = Rc::clone(&log);
        scheduler
            .spawn_named(name, move |y| {
                record(&sink, format!("{} start", y.name()));
                y.suspend();
                record(&sink, format!("{} end", y.name()));
            })
            .unwrap()
    };
    let a = spawn("a");
    let b = spawn("b");

    for co in [a, b, a, b] {
        scheduler.resume(co).unwrap();
        record(&log, "main");
    }

    assert_eq!(
        *log.borrow(),
        ["a start", "main", "b start", "main", "a end", "main", "b end", "main"]
    );
    assert_eq!(scheduler.sweep().unwrap(), 2);
}

fn print_then_yield(y: &Yielder<'_>, arg: *mut c_void) {
    let log = unsafe { &*arg.cast::<Log>() };
    record(log, format!("value {}", log.borrow().len() + 41));
    y.suspend();
    record(log, "done");
}

#[test]
fn two_step_scenario() {
    let scheduler = scheduler();
    let log: Log = Rc::default();
    let id = scheduler
        .create(print_then_yield, (&raw const log).cast_mut().cast(), Some("co1"))
        .unwrap();

    scheduler.resume(id).unwrap();
    assert_eq!(*log.borrow(), ["value 41"]);

    assert_eq!(scheduler.resume(id).unwrap(), State::Exited);
    assert_eq!(*log.borrow(), ["value 41", "done"]);

    assert_eq!(scheduler.sweep().unwrap(), 1);
    assert_eq!(scheduler.sweep().unwrap(), 0);
    assert_eq!(log.borrow().len(), 2);
}

#[test]
fn stacks_are_private() {
    let scheduler = scheduler();
    let results = Rc::new(RefCell::new(Vec::new()));

    let spawn = |step: u64| {
        let sink = Rc::clone(&results);
        scheduler
            .spawn(move |y| {
                let mut counter = 0u64;
                for _ in 0..3 {
                    counter += step;
                    y.suspend();
                }
                sink.borrow_mut().push((step, counter));
            })
            .unwrap()
    };
    let ones = spawn(1);
    let hundreds = spawn(100);

    for _ in 0..4 {
        scheduler.resume(ones).unwrap();
        scheduler.resume(hundreds).unwrap();
    }

    assert_eq!(*results.borrow(), [(1, 3), (100, 300)]);
}

#[test]
fn many_coroutines_interleave() {
    let scheduler = scheduler();
    let total = Rc::new(Cell::new(0u64));

    let ids: Vec<_> = (0..16)
        .map(|n| {
            let total = Rc::clone(&total);
            scheduler
                .spawn(move |y| {
                    for _ in 0..4 {
                        total.set(total.get() + n);
                        y.suspend();
                    }
                })
                .unwrap()
        })
        .collect();

    let mut live = ids.clone();
    while !live.is_empty() {
        live.retain(|&id| scheduler.resume(id).unwrap() == State::Suspended);
    }

    assert_eq!(total.get(), 4 * (0..16).sum::<u64>());
    assert_eq!(scheduler.sweep().unwrap(), ids.len());
    assert!(scheduler.is_empty());
}

#[test]
fn tiny_stacks_are_rejected() {
    let err = Scheduler::with_config(Config::new().with_stack_size(512)).unwrap_err();
    assert!(matches!(err, Error::StackTooSmall { size: 512, .. }));
}

#[test]
fn failed_stack_allocation_releases_the_closure() {
    let scheduler = Scheduler::with_config(Config::new().with_stack_size(usize::MAX)).unwrap();
    let token = Rc::new(());
    let held = Rc::clone(&token);

    let err = scheduler.spawn(move |_| drop(held)).unwrap_err();
    assert!(matches!(err, Error::StackAlloc { size: usize::MAX, .. }));
    assert_eq!(Rc::strong_count(&token), 1);
    assert!(scheduler.is_empty());
}
