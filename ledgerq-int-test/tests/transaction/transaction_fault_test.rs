use ledgerq::errors::ErrorKind;
use ledgerq::journal::JournalFault;
use ledgerq::transaction::TransactionState;
use ledgerq_int_test::test_util::{cleanup, create_test_context, drain, run_test, seed, text, WAIT};

#[test]
fn test_failed_commit_matches_explicit_rollback() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            seed(&manager, "failing", &["A", "B"])?;
            seed(&manager, "explicit", &["A", "B"])?;

            let failing = manager.begin_transaction()?;
            failing.poll("failing", WAIT)?;
            failing.offer("failing", text("C"), WAIT)?;
            manager.journal().unwrap().inject_fault(JournalFault::FailNextCommit);
            let err = failing.commit().unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::DurabilityError);
            assert_eq!(failing.state(), TransactionState::Failed);
            failing.rollback()?;

            let explicit = manager.begin_transaction()?;
            explicit.poll("explicit", WAIT)?;
            explicit.offer("explicit", text("C"), WAIT)?;
            explicit.rollback()?;

            let failing_items = drain(&ctx.queue("failing")?)?;
            assert_eq!(failing_items, drain(&ctx.queue("explicit")?)?);
            assert_eq!(failing_items, vec!["B", "A"]);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_failed_commit_cannot_be_retried() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let tx = manager.begin_transaction()?;
            tx.offer("orders", text("A"), WAIT)?;
            manager.journal().unwrap().inject_fault(JournalFault::FailNextCommit);
            assert!(tx.commit().is_err());

            let err = tx.commit().unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
            tx.rollback()?;
            assert_eq!(tx.state(), TransactionState::Closed);
            assert!(ctx.queue("orders")?.is_empty()?);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_unjournaled_offer_does_not_happen() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let tx = manager.begin_transaction()?;
            manager.journal().unwrap().inject_fault(JournalFault::FailNextAppend);

            let err = tx.offer("orders", text("lost"), WAIT).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::DurabilityError);
            assert_eq!(tx.state(), TransactionState::Open);

            tx.offer("orders", text("kept"), WAIT)?;
            tx.commit()?;
            assert_eq!(drain(&ctx.queue("orders")?)?, vec!["kept"]);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_unjournaled_poll_returns_element_to_head() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            seed(&manager, "orders", &["A", "B"])?;

            let tx = manager.begin_transaction()?;
            manager.journal().unwrap().inject_fault(JournalFault::TearNextAppend);
            assert!(tx.poll("orders", WAIT).is_err());
            assert_eq!(tx.state(), TransactionState::Failed);
            assert_eq!(ctx.queue("orders")?.peek()?, Some(text("A")));

            tx.rollback()?;
            assert_eq!(drain(&ctx.queue("orders")?)?, vec!["A", "B"]);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_lost_applied_marker_keeps_commit_once() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let tx = manager.begin_transaction()?;
            tx.offer("orders", text("A"), WAIT)?;
            manager.journal().unwrap().inject_fault(JournalFault::FailNextMarker);
            tx.commit()?;
            assert_eq!(ctx.queue("orders")?.peek()?, Some(text("A")));

            manager.stop()?;
            let report = manager.start()?;
            assert_eq!(report.redone, 0);
            assert_eq!(drain(&ctx.queue("orders")?)?, vec!["A"]);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_journal_outage_leaves_queues_untouched() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            seed(&manager, "orders", &["A"])?;
            let journal = manager.journal().unwrap();
            journal.inject_fault(JournalFault::FailAllWrites);

            let tx = manager.begin_transaction()?;
            assert!(tx.offer("orders", text("B"), WAIT).is_err());
            assert!(tx.poll("orders", WAIT).is_err());
            tx.rollback()?;

            journal.clear_fault();
            assert_eq!(drain(&ctx.queue("orders")?)?, vec!["A"]);
            Ok(())
        },
        cleanup,
    );
}
