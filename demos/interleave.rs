use mycoroutine::{Scheduler, Yielder};
use std::ffi::c_void;

fn print_then_yield(y: &Yielder<'_>, arg: *mut c_void) {
    let n = unsafe { *arg.cast::<i32>() };
    println!("{}: {}", y.name(), n);
    y.suspend();
    println!("{}: after yield", y.name());
}

fn main() -> mycoroutine::Result<()> {
    let mut n = 1;
    let mut m = 2;

    let scheduler = Scheduler::new();
    let co1 = scheduler.create(print_then_yield, (&raw mut n).cast(), Some("co1"))?;
    let co2 = scheduler.create(print_then_yield, (&raw mut m).cast(), Some("co2"))?;

    scheduler.resume(co1)?;
    scheduler.resume(co2)?;
    println!("main: after resume");
    scheduler.resume(co1)?;
    scheduler.resume(co2)?;

    let reclaimed = scheduler.sweep()?;
    println!("main: reclaimed {} coroutines", reclaimed);
    Ok(())
}
