use ledgerq::errors::ErrorKind;
use ledgerq::journal::OperationKind;
use ledgerq::transaction::TransactionState;
use ledgerq_int_test::test_util::{
    cleanup, create_stopped_context, create_test_context, drain, run_test, seed, text, WAIT,
};

// ==================== Commit Tests ====================

#[test]
fn test_uncommitted_offer_is_invisible() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let tx = manager.begin_transaction()?;
            assert!(tx.offer("orders", text("A"), WAIT)?);

            assert_eq!(ctx.queue("orders")?.size()?, 0);
            assert_eq!(tx.size("orders")?, 1);

            tx.rollback()?;
            assert!(drain(&ctx.queue("orders")?)?.is_empty());
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_committed_offer_is_visible() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let tx = manager.begin_transaction()?;
            tx.offer("orders", text("A"), WAIT)?;
            tx.commit()?;

            assert_eq!(tx.state(), TransactionState::Closed);
            assert_eq!(drain(&ctx.queue("orders")?)?, vec!["A"]);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_rolled_back_poll_goes_to_tail() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            seed(&manager, "orders", &["A", "B"])?;

            let tx = manager.begin_transaction()?;
            assert_eq!(tx.poll("orders", WAIT)?, Some(text("A")));
            assert_eq!(ctx.queue("orders")?.size()?, 1);
            tx.rollback()?;

            assert_eq!(drain(&ctx.queue("orders")?)?, vec!["B", "A"]);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_committed_poll_is_permanent() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            seed(&manager, "orders", &["A", "B"])?;

            let tx = manager.begin_transaction()?;
            tx.poll("orders", WAIT)?;
            tx.commit()?;

            assert_eq!(drain(&ctx.queue("orders")?)?, vec!["B"]);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_move_between_queues() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            seed(&manager, "orders", &["order-1", "order-2"])?;

            let tx = manager.begin_transaction()?;
            while let Some(order) = tx.poll("orders", WAIT)? {
                tx.offer("shipping", order, WAIT)?;
            }
            assert_eq!(ctx.queue("orders")?.size()?, 0);
            assert_eq!(ctx.queue("shipping")?.size()?, 0);
            tx.commit()?;

            assert!(drain(&ctx.queue("orders")?)?.is_empty());
            assert_eq!(
                drain(&ctx.queue("shipping")?)?,
                vec!["order-1", "order-2"]
            );
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_rolled_back_move_restores_source() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            seed(&manager, "orders", &["order-1", "order-2", "order-3"])?;

            let tx = manager.begin_transaction()?;
            let order = tx.poll("orders", WAIT)?;
            tx.offer("shipping", order.unwrap(), WAIT)?;
            tx.rollback()?;

            assert!(drain(&ctx.queue("shipping")?)?.is_empty());
            assert_eq!(
                drain(&ctx.queue("orders")?)?,
                vec!["order-2", "order-3", "order-1"]
            );
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_journal_records_transaction() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            seed(&manager, "orders", &["A"])?;

            let tx = manager.begin_transaction()?;
            tx.poll("orders", WAIT)?;
            tx.offer("archive", text("A"), WAIT)?;
            tx.commit()?;

            let journal = manager.journal().unwrap();
            let kinds: Vec<OperationKind> = journal
                .read_all()
                .iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.transaction_id() == tx.id())
                .map(|entry| entry.kind())
                .collect();
            assert_eq!(
                kinds,
                vec![
                    OperationKind::Remove,
                    OperationKind::Add,
                    OperationKind::Commit,
                    OperationKind::Applied
                ]
            );
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_transient_queue_in_transaction() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            seed(&manager, "scratch", &["A"])?;

            let scratch = ctx.queue("scratch")?;
            assert!(!scratch.is_persistent());
            assert_eq!(drain(&scratch)?, vec!["A"]);
            Ok(())
        },
        cleanup,
    );
}

// ==================== Lifecycle Tests ====================

#[test]
fn test_closed_transaction_rejects_operations() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let tx = manager.begin_transaction()?;
            tx.commit()?;

            let err = tx.offer("orders", text("A"), WAIT).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::TransactionClosed);
            let err = tx.poll("orders", WAIT).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::TransactionClosed);
            assert!(tx.commit().is_err());
            tx.rollback()?;
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_begin_requires_started_manager() {
    run_test(
        create_stopped_context,
        |ctx| {
            let err = ctx.manager().begin_transaction().unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::InvalidOperation);

            ctx.manager().start()?;
            assert!(ctx.manager().begin_transaction().is_ok());
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_dropped_transaction_rolls_back() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            seed(&manager, "orders", &["A", "B"])?;

            {
                let tx = manager.begin_transaction()?;
                tx.poll("orders", WAIT)?;
                tx.offer("orders", text("C"), WAIT)?;
                assert_eq!(manager.active_transactions(), 1);
            }

            assert_eq!(manager.active_transactions(), 0);
            assert_eq!(drain(&ctx.queue("orders")?)?, vec!["B", "A"]);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_stop_refused_while_transaction_open() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let tx = manager.begin_transaction()?;

            let err = manager.stop().unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::InvalidOperation);

            tx.rollback()?;
            manager.stop()?;
            assert!(!manager.is_started());
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_size_counts_pending_offers() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            assert_eq!(manager.config().queue_config("orders").capacity(), None);

            let tx = manager.begin_transaction()?;
            for i in 0..10 {
                assert!(tx.offer("orders", text(&i.to_string()), WAIT)?);
            }
            assert_eq!(tx.size("orders")?, 10);
            tx.commit()?;
            assert_eq!(ctx.queue("orders")?.size()?, 10);
            Ok(())
        },
        cleanup,
    );
}
