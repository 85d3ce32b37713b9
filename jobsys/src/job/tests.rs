use super::*;
use crate as jobsys;
use crate::diagnostics::LogLevel;
use crate::runtime::Builder;
use crate::test_utils::*;
use anyhow::Result;
use parking_lot::Mutex;
use rstest::rstest;
use static_assertions::assert_impl_all;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

assert_impl_all!(Context: Send, Sync);
assert_impl_all!(Job: Send);
assert_impl_all!(GroupRange: Send, Sync, Copy);

#[rstest]
#[case::exact(9, 3)]
#[case::remainder(10, 3)]
#[case::single_group(5, 100)]
#[case::group_of_one(17, 1)]
#[case::equal(64, 64)]
#[case::large(1_000_000, 1_000)]
#[case::near_max(u32::MAX, u32::MAX / 2)]
fn test_partition_covers_every_index_once(#[case] job_count: u32, #[case] group_size: u32) {
    let groups = partition(job_count, group_size);
    assert_eq!(groups.len() as u32, dispatch_group_count(job_count, group_size));

    let mut expected_offset = 0;
    for (i, group) in groups.enumerate() {
        assert_eq!(group.group_id, i as u32);
        assert_eq!(group.offset, expected_offset);
        assert!(!group.is_empty());
        assert!(group.len() <= group_size);
        expected_offset = group.end;
    }

    assert_eq!(expected_offset, job_count);
}

#[rstest]
#[case(10, 3, 4)]
#[case(9, 3, 3)]
#[case(1, 1, 1)]
#[case(0, 3, 0)]
#[case(10, 0, 0)]
#[case(0, 0, 0)]
#[case(u32::MAX, 1, u32::MAX)]
fn test_dispatch_group_count(#[case] job_count: u32, #[case] group_size: u32, #[case] expected: u32) {
    assert_eq!(dispatch_group_count(job_count, group_size), expected);
}

#[test]
fn test_ten_by_three_ranges() {
    let ranges = partition(10, 3)
        .map(|g| (g.group_id, g.offset, g.end))
        .collect::<Vec<_>>();

    assert_eq!(ranges, [(0, 0, 3), (1, 3, 6), (2, 6, 9), (3, 9, 10)]);
}

#[rstest]
#[case(0, 3)]
#[case(10, 0)]
fn test_degenerate_dispatch_is_noop(#[case] job_count: u32, #[case] group_size: u32) {
    let system = Builder::new_inline().try_build().unwrap();
    let ctx = Context::new();
    let calls = Arc::new(AtomicU32::new(0));

    system.install(|| {
        dispatch(&ctx, job_count, group_size, 16, {
            let calls = Arc::clone(&calls);
            move |_| {
                calls.fetch_add(1, Ordering::Relaxed);
            }
        });

        assert!(!is_busy(&ctx));
        assert_eq!(ctx.outstanding(), 0);
        wait(&ctx);
    });

    assert_eq!(calls.load(Ordering::Relaxed), 0);
}

#[test]
fn test_group_flags_seven_by_three() -> Result<()> {
    let system = Builder::new_inline().try_build()?;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let ctx = Context::new();

    system.dispatch(&ctx, 7, 3, 0, {
        let seen = Arc::clone(&seen);
        move |args| {
            seen.lock().push((
                args.job_index,
                args.group_id,
                args.group_index,
                args.is_first_job_in_group,
                args.is_last_job_in_group,
            ));
        }
    });
    ctx.wait();

    assert_eq!(
        *seen.lock(),
        [
            (0, 0, 0, true, false),
            (1, 0, 1, false, false),
            (2, 0, 2, false, true),
            (3, 1, 0, true, false),
            (4, 1, 1, false, false),
            (5, 1, 2, false, true),
            (6, 2, 0, true, true),
        ]
    );

    Ok(())
}

#[test]
fn test_inline_runs_groups_in_order_on_caller() -> Result<()> {
    let system = Builder::new_inline().try_build()?;
    assert_eq!(system.thread_count(), 0);

    let caller = thread::current().id();
    let order = Arc::new(Mutex::new(Vec::new()));

    system.install(|| {
        let ctx = Context::new();
        dispatch(&ctx, 20, 4, 0, {
            let order = Arc::clone(&order);
            move |args| {
                assert_eq!(thread::current().id(), caller);
                if args.is_first_job_in_group {
                    order.lock().push(args.group_id);
                }
            }
        });

        // Already done, nothing was queued.
        assert!(!ctx.is_busy());
    });

    assert_eq!(*order.lock(), [0, 1, 2, 3, 4]);
    Ok(())
}

#[jobsys::test(worker_threads = 4)]
fn test_counter_balances_after_wait() {
    let ctx = Context::new();
    let runs = Arc::new(AtomicU32::new(0));

    for _ in 0..10 {
        dispatch(&ctx, 1_000, 7, 0, {
            let runs = Arc::clone(&runs);
            move |_| {
                runs.fetch_add(1, Ordering::Relaxed);
            }
        });
    }

    wait(&ctx);

    assert!(!is_busy(&ctx));
    assert_eq!(ctx.outstanding(), 0);
    assert_eq!(runs.load(Ordering::Relaxed), 10_000);
}

#[jobsys::test(worker_threads = 4)]
fn test_sum_of_one_million_indices() {
    let ctx = Context::new();
    let sum = Arc::new(AtomicU64::new(0));

    dispatch(&ctx, 1_000_000, 1_000, 0, {
        let sum = Arc::clone(&sum);
        move |args| {
            sum.fetch_add(u64::from(args.job_index), Ordering::Relaxed);
        }
    });
    wait(&ctx);

    assert_eq!(sum.load(Ordering::Relaxed), 999_999 * 1_000_000 / 2);
    assert_eq!(sum.load(Ordering::Relaxed), triangular(1_000_000));
}

#[jobsys::test(worker_threads = 4)]
fn test_scratch_memory_is_isolated_per_group() {
    const SCRATCH: u32 = 64;

    let ctx = Context::new();
    let corrupted = Arc::new(AtomicU32::new(0));

    dispatch(&ctx, 4_096, 16, SCRATCH, {
        let corrupted = Arc::clone(&corrupted);
        move |args| {
            let scratch = args.shared_memory.expect("scratch requested");
            assert_eq!(scratch.len(), SCRATCH as usize);

            let tag = (args.group_id % 251) as u8;
            if args.is_first_job_in_group {
                scratch.fill(tag);
            }

            // Give other groups a chance to run concurrently.
            thread::yield_now();

            if scratch.iter().any(|b| *b != tag) {
                corrupted.fetch_add(1, Ordering::Relaxed);
            }
        }
    });
    wait(&ctx);

    assert_eq!(corrupted.load(Ordering::Relaxed), 0);
}

#[jobsys::test(flavor = "inline")]
fn test_no_scratch_without_request() {
    let ctx = Context::new();
    dispatch(&ctx, 8, 2, 0, |args| assert!(args.shared_memory.is_none()));
    wait(&ctx);
}

#[rstest]
#[case::one_worker(1)]
#[case::two_workers(2)]
fn test_recursive_dispatch_does_not_deadlock(#[case] worker_threads: usize) -> Result<()> {
    let (system, _) = init_stealing_system(worker_threads)?;
    let leaves = Arc::new(AtomicU32::new(0));

    system.install(|| {
        let ctx = Context::new();
        dispatch(&ctx, 8, 1, 0, {
            let leaves = Arc::clone(&leaves);
            move |_| {
                // Runs on a worker: the nested wait has to help.
                let inner = Context::new();
                dispatch(&inner, 16, 2, 32, {
                    let leaves = Arc::clone(&leaves);
                    move |args| {
                        assert!(args.shared_memory.is_some());
                        leaves.fetch_add(1, Ordering::Relaxed);
                    }
                });
                wait(&inner);
            }
        });
        wait(&ctx);
    });

    assert_eq!(leaves.load(Ordering::Relaxed), 8 * 16);
    Ok(())
}

#[jobsys::test(worker_threads = 2)]
fn test_execute_runs_once_as_single_job() {
    let ctx = Context::new();
    let calls = Arc::new(AtomicU32::new(0));

    execute(&ctx, {
        let calls = Arc::clone(&calls);
        move |args| {
            assert_eq!(args.job_index, 0);
            assert_eq!(args.group_id, 0);
            assert_eq!(args.group_index, 0);
            assert!(args.is_first_job_in_group);
            assert!(args.is_last_job_in_group);
            assert!(args.shared_memory.is_none());
            calls.fetch_add(1, Ordering::Relaxed);
        }
    });
    wait(&ctx);

    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

#[test]
fn test_busy_context_drop_reports_fatal_and_waits() -> Result<()> {
    let (system, _) = init_stealing_system(2)?;
    let sink = RecordingSink::new();
    let done = Arc::new(AtomicBool::new(false));

    {
        let ctx = Context::with_sink(sink.clone());
        system.execute(&ctx, {
            let done = Arc::clone(&done);
            move |_| {
                thread::sleep(Duration::from_millis(50));
                done.store(true, Ordering::Release);
            }
        });

        assert!(ctx.is_busy());
    }

    assert!(done.load(Ordering::Acquire));
    assert_eq!(sink.num_fatal(), 1);
    assert_eq!(
        sink.messages(LogLevel::Fatal),
        ["jobsys::Context destruction of busy context"]
    );

    Ok(())
}

#[test]
fn test_idle_context_drop_is_silent() {
    let sink = RecordingSink::new();
    let ctx = Context::with_sink(sink.clone());
    drop(ctx);

    assert!(sink.reports().is_empty());
}

#[jobsys::test(worker_threads = 2)]
fn test_task_panic_is_resumed_by_wait() {
    let sink = RecordingSink::new();
    let ctx = Context::with_sink(sink.clone());
    let runs = Arc::new(AtomicU32::new(0));

    dispatch(&ctx, 10, 1, 0, {
        let runs = Arc::clone(&runs);
        move |args| {
            if args.job_index == 3 {
                panic!("job 3 failed");
            }
            runs.fetch_add(1, Ordering::Relaxed);
        }
    });

    let res = panic::catch_unwind(AssertUnwindSafe(|| wait(&ctx)));
    let payload = res.expect_err("wait resumes the job panic");
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"job 3 failed"));

    // Every other group ran, the context is idle and the panic was consumed.
    assert_eq!(runs.load(Ordering::Relaxed), 9);
    assert!(!is_busy(&ctx));
    wait(&ctx);

    assert_eq!(sink.errors(), ["jobsys job in group 3 panicked: job 3 failed"]);

    // Workers survived.
    let after = Context::new();
    execute(&after, |_| {});
    wait(&after);
}

#[jobsys::test(worker_threads = 3)]
fn test_scope_borrows_stack_data() {
    let input = (0..1_000u64).collect::<Vec<_>>();
    let sum = AtomicU64::new(0);
    let groups = Mutex::new(HashSet::new());

    scope(|s| {
        s.dispatch(input.len() as u32, 64, 0, |args| {
            sum.fetch_add(input[args.job_index as usize], Ordering::Relaxed);
            if args.is_last_job_in_group {
                groups.lock().insert(args.group_id);
            }
        });
        s.execute(|_| {
            sum.fetch_add(1, Ordering::Relaxed);
        });
    });

    // No wait needed, the scope waited.
    assert_eq!(sum.load(Ordering::Relaxed), triangular(1_000) + 1);
    assert_eq!(groups.lock().len(), 16);
}

fn fail() {
    panic!("closure failed");
}

#[jobsys::test(worker_threads = 2)]
fn test_scope_waits_when_closure_panics() {
    let finished = AtomicU32::new(0);

    let res = panic::catch_unwind(AssertUnwindSafe(|| {
        scope(|s| {
            s.dispatch(4, 1, 0, |_| {
                thread::sleep(Duration::from_millis(10));
                finished.fetch_add(1, Ordering::Relaxed);
            });
            fail();
        })
    }));

    assert!(res.is_err());
    assert_eq!(finished.load(Ordering::Relaxed), 4);
}

#[jobsys::test(worker_threads = 2)]
fn test_context_reused_across_overlapping_dispatches() {
    let ctx = Context::new();
    let a = Arc::new(AtomicU32::new(0));
    let b = Arc::new(AtomicU32::new(0));

    dispatch(&ctx, 100, 10, 0, {
        let a = Arc::clone(&a);
        move |_| {
            a.fetch_add(1, Ordering::Relaxed);
        }
    });
    dispatch(&ctx, 50, 5, 8, {
        let b = Arc::clone(&b);
        move |_| {
            b.fetch_add(1, Ordering::Relaxed);
        }
    });
    wait(&ctx);

    assert_eq!(a.load(Ordering::Relaxed), 100);
    assert_eq!(b.load(Ordering::Relaxed), 50);

    // And again once idle.
    execute(&ctx, {
        let a = Arc::clone(&a);
        move |_| {
            a.fetch_add(1, Ordering::Relaxed);
        }
    });
    wait(&ctx);
    assert_eq!(a.load(Ordering::Relaxed), 101);
}
