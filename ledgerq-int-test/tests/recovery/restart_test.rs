use ledgerq::errors::ErrorKind;
use ledgerq::recovery::RecoveryState;
use ledgerq_int_test::test_util::{
    cleanup, create_stopped_context, create_test_context, drain, run_test, seed, text, WAIT,
};

#[test]
fn test_recovery_state_follows_lifecycle() {
    run_test(
        create_stopped_context,
        |ctx| {
            let manager = ctx.manager();
            assert_eq!(manager.recovery_state(), RecoveryState::NotStarted);

            let report = manager.start()?;
            assert_eq!(report.committed, 0);
            assert_eq!(manager.recovery_state(), RecoveryState::Done);

            let err = manager.start().unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::InvalidOperation);

            manager.stop()?;
            assert_eq!(manager.recovery_state(), RecoveryState::NotStarted);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_warm_restart_keeps_queues() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            seed(&manager, "orders", &["A", "B"])?;
            seed(&manager, "scratch", &["X"])?;

            manager.stop()?;
            let report = manager.start()?;
            assert_eq!(report.redone, 0);
            assert_eq!(report.undone, 0);

            assert_eq!(drain(&ctx.queue("orders")?)?, vec!["A", "B"]);
            assert_eq!(drain(&ctx.queue("scratch")?)?, vec!["X"]);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_transient_queue_is_empty_after_cold_restart() {
    run_test(
        create_test_context,
        |ctx| {
            seed(&ctx.manager(), "scratch", &["X"])?;
            ctx.manager().close()?;

            let restarted = ctx.reopen()?;
            restarted.manager().start()?;
            assert!(restarted.queue("scratch")?.is_empty()?);
            cleanup(restarted)
        },
        |_| Ok(()),
    );
}

#[test]
fn test_closed_manager_rejects_calls() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            manager.close()?;
            assert!(manager.is_closed());
            manager.close()?;

            let err = manager.begin_transaction().unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::StoreAlreadyClosed);
            let err = manager.start().unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::StoreAlreadyClosed);
            Ok(())
        },
        cleanup,
    );
}

#[cfg(feature = "fjall")]
#[test]
fn test_committed_queues_survive_cold_restart() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            seed(&manager, "orders", &["A", "B", "C"])?;
            let tx = manager.begin_transaction()?;
            tx.poll("orders", WAIT)?;
            tx.commit()?;
            manager.close()?;

            let restarted = ctx.reopen()?;
            let report = restarted.manager().start()?;
            assert_eq!(report.redone, 0);
            assert_eq!(report.undone, 0);
            assert_eq!(drain(&restarted.queue("orders")?)?, vec!["B", "C"]);
            cleanup(restarted)
        },
        |_| Ok(()),
    );
}

#[cfg(feature = "fjall")]
#[test]
fn test_queue_names_with_special_characters_survive_restart() {
    run_test(
        create_test_context,
        |ctx| {
            seed(&ctx.manager(), "billing/eu.invoices", &["inv-1"])?;
            ctx.manager().close()?;

            let restarted = ctx.reopen()?;
            restarted.manager().start()?;
            assert_eq!(
                drain(&restarted.queue("billing/eu.invoices")?)?,
                vec!["inv-1"]
            );
            cleanup(restarted)
        },
        |_| Ok(()),
    );
}

/// Without a persistent backend an abandoned manager stands in for a crashed process:
/// the in-memory storage module keeps the live queue contents and the new manager replays
/// the journal over them.
#[cfg(not(feature = "fjall"))]
#[test]
fn test_abandoned_transaction_is_undone() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            seed(&manager, "orders", &["first", "second"])?;

            let tx = manager.begin_transaction()?;
            tx.poll("orders", WAIT)?;
            tx.offer("orders", text("never"), WAIT)?;
            std::mem::forget(tx);
            drop(manager);

            let restarted = ctx.reopen()?;
            let report = restarted.manager().start()?;
            assert_eq!(report.incomplete, 1);
            assert_eq!(report.undone, 1);
            assert_eq!(
                drain(&restarted.queue("orders")?)?,
                vec!["second", "first"]
            );
            cleanup(restarted)
        },
        |_| Ok(()),
    );
}
