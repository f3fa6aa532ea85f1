use ledgerq::errors::ErrorKind;
use ledgerq_int_test::test_util::{cleanup, create_test_context, drain, run_test, seed, text, WAIT};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_put_and_take_in_order() {
    run_test(
        create_test_context,
        |ctx| {
            let queue = ctx.queue("jobs")?;
            queue.put(text("A"), WAIT)?;
            queue.put(text("B"), WAIT)?;

            assert_eq!(queue.size()?, 2);
            assert_eq!(queue.peek()?, Some(text("A")));
            assert_eq!(queue.take(WAIT)?, text("A"));
            assert_eq!(queue.take(WAIT)?, text("B"));

            let err = queue.take(WAIT).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::Timeout);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_untake_returns_to_head() {
    run_test(
        create_test_context,
        |ctx| {
            let queue = ctx.queue("jobs")?;
            queue.put(text("A"), WAIT)?;
            queue.put(text("B"), WAIT)?;

            let head = queue.take(WAIT)?;
            queue.untake(head)?;
            assert_eq!(drain(&queue)?, vec!["A", "B"]);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_bounded_queue_times_out_when_full() {
    run_test(
        create_test_context,
        |ctx| {
            let queue = ctx.queue("bounded")?;
            assert_eq!(queue.capacity(), Some(2));
            queue.put(text("A"), WAIT)?;
            queue.put(text("B"), WAIT)?;

            assert!(!queue.offer(text("C"), 0, WAIT)?);
            let err = queue.put(text("C"), WAIT).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::Timeout);

            let tx = ctx.manager().begin_transaction()?;
            assert!(!tx.offer("bounded", text("C"), WAIT)?);
            tx.rollback()?;
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_blocked_put_wakes_after_take() {
    run_test(
        create_test_context,
        |ctx| {
            let queue = ctx.queue("bounded")?;
            queue.put(text("A"), WAIT)?;
            queue.put(text("B"), WAIT)?;

            let stored = Arc::new(AtomicBool::new(false));
            let producer = {
                let queue = queue.clone();
                let stored = stored.clone();
                thread::spawn(move || {
                    let result = queue.put(text("C"), Duration::from_secs(5));
                    stored.store(result.is_ok(), Ordering::SeqCst);
                    result
                })
            };

            thread::sleep(Duration::from_millis(50));
            assert!(!stored.load(Ordering::SeqCst));
            assert_eq!(queue.take(WAIT)?, text("A"));

            awaitility::at_most(Duration::from_secs(5)).until(|| stored.load(Ordering::SeqCst));
            producer.join().expect("producer panicked")?;
            assert_eq!(drain(&queue)?, vec!["B", "C"]);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_clear_empties_queue() {
    run_test(
        create_test_context,
        |ctx| {
            seed(&ctx.manager(), "jobs", &["A", "B", "C"])?;
            let queue = ctx.queue("jobs")?;
            queue.clear()?;
            assert!(queue.is_empty()?);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_dispose_queue() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            seed(&manager, "jobs", &["A"])?;
            let stale = ctx.queue("jobs")?;
            assert!(manager.has_queue("jobs"));
            assert!(manager.queue_names().contains("jobs"));

            manager.dispose_queue("jobs")?;
            assert!(!manager.has_queue("jobs"));
            assert!(stale.is_disposed());
            let err = stale.poll(WAIT).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::QueueDisposed);
            drop(stale);

            let fresh = ctx.queue("jobs")?;
            assert!(fresh.is_empty()?);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_queue_persistence_follows_config() {
    run_test(
        create_test_context,
        |ctx| {
            assert_eq!(ctx.queue("jobs")?.is_persistent(), cfg!(feature = "fjall"));
            assert!(!ctx.queue("scratch")?.is_persistent());
            Ok(())
        },
        cleanup,
    );
}
