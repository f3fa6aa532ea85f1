use ledgerq::errors::{ErrorKind, LedgerResult};
use ledgerq::journal::{JournalConfig, Operation, TransactionJournal};
use ledgerq::recovery::RecoveryState;
use ledgerq_int_test::test_util::{cleanup, create_test_context, drain, run_test, seed, text, TestContext};
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};

/// Closes the manager, then lets `write` append records to its journal as if a process
/// had died right after writing them.
fn crash_with<F>(ctx: &TestContext, write: F) -> LedgerResult<TestContext>
where
    F: FnOnce(&TransactionJournal) -> LedgerResult<()>,
{
    ctx.manager().close()?;
    let journal = TransactionJournal::open(
        JournalConfig::new(ctx.journal_dir()).with_compaction_threshold(0),
    )?;
    write(&journal)?;
    journal.close()?;
    ctx.reopen()
}

fn add(queue: &str, value: &str) -> Operation {
    Operation::Add {
        queue: queue.to_string(),
        payload: text(value),
    }
}

fn remove(queue: &str, value: &str) -> Operation {
    Operation::Remove {
        queue: queue.to_string(),
        payload: text(value),
    }
}

#[test]
fn test_committed_offer_is_redone_once() {
    run_test(
        create_test_context,
        |ctx| {
            let restarted = crash_with(&ctx, |journal| {
                let tx = journal.next_transaction_id();
                journal.append(tx, add("orders", "A"))?;
                journal.append(tx, add("orders", "B"))?;
                journal.commit(tx)?;
                Ok(())
            })?;

            let report = restarted.manager().start()?;
            assert_eq!(report.committed, 1);
            assert_eq!(report.redone, 2);
            assert_eq!(drain(&restarted.queue("orders")?)?, vec!["A", "B"]);
            cleanup(restarted)
        },
        |_| Ok(()),
    );
}

#[test]
fn test_uncommitted_offer_is_discarded() {
    run_test(
        create_test_context,
        |ctx| {
            let restarted = crash_with(&ctx, |journal| {
                let tx = journal.next_transaction_id();
                journal.append(tx, add("orders", "A"))?;
                Ok(())
            })?;

            let report = restarted.manager().start()?;
            assert_eq!(report.incomplete, 1);
            assert_eq!(report.redone, 0);
            assert!(restarted.queue("orders")?.is_empty()?);
            cleanup(restarted)
        },
        |_| Ok(()),
    );
}

#[test]
fn test_journal_damage_refuses_start() {
    run_test(
        create_test_context,
        |ctx| {
            seed(&ctx.manager(), "orders", &["A", "B"])?;
            ctx.manager().close()?;

            let journal_path = JournalConfig::new(ctx.journal_dir()).file_path();
            let mut file = OpenOptions::new().write(true).open(&journal_path)?;
            file.seek(SeekFrom::Start(10))?;
            file.write_all(&[0xFF, 0xFF, 0xFF, 0xFF])?;
            file.sync_all()?;
            drop(file);

            let restarted = ctx.reopen()?;
            let err = restarted.manager().start().unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::RecoveryError);
            assert!(!restarted.manager().is_started());
            assert_eq!(restarted.manager().recovery_state(), RecoveryState::NotStarted);

            let err = restarted.manager().begin_transaction().unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
            cleanup(restarted)
        },
        |_| Ok(()),
    );
}

#[test]
fn test_torn_tail_is_dropped() {
    run_test(
        create_test_context,
        |ctx| {
            let restarted = crash_with(&ctx, |journal| {
                let tx = journal.next_transaction_id();
                journal.append(tx, add("orders", "A"))?;
                journal.commit(tx)?;
                Ok(())
            })?;

            let journal_path = JournalConfig::new(ctx.journal_dir()).file_path();
            let mut file = OpenOptions::new().append(true).open(&journal_path)?;
            file.write_all(&[0x40, 0x00, 0x00, 0x00, 0x12, 0x34])?;
            file.sync_all()?;
            drop(file);

            let report = restarted.manager().start()?;
            assert_eq!(report.redone, 1);
            assert_eq!(drain(&restarted.queue("orders")?)?, vec!["A"]);
            cleanup(restarted)
        },
        |_| Ok(()),
    );
}

#[cfg(feature = "fjall")]
mod persistent {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_interrupted_polls_return_in_poll_order() {
        run_test(
            create_test_context,
            |ctx| {
                seed(&ctx.manager(), "orders", &["first", "second"])?;
                // the first poll of a transaction reached the queue and the journal,
                // the process died before the second one
                let polled = ctx.queue("orders")?.poll(Duration::ZERO)?;
                assert_eq!(polled, Some(text("first")));

                let restarted = crash_with(&ctx, |journal| {
                    let tx = journal.next_transaction_id();
                    journal.append(tx, remove("orders", "first"))?;
                    Ok(())
                })?;

                let report = restarted.manager().start()?;
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

    #[test]
    fn test_committed_poll_stays_removed() {
        run_test(
            create_test_context,
            |ctx| {
                seed(&ctx.manager(), "orders", &["A", "B"])?;
                ctx.queue("orders")?.poll(Duration::ZERO)?;

                let restarted = crash_with(&ctx, |journal| {
                    let tx = journal.next_transaction_id();
                    journal.append(tx, remove("orders", "A"))?;
                    journal.append(tx, add("archive", "A"))?;
                    journal.commit(tx)?;
                    Ok(())
                })?;

                let report = restarted.manager().start()?;
                assert_eq!(report.undone, 0);
                assert_eq!(report.redone, 1);
                assert_eq!(drain(&restarted.queue("orders")?)?, vec!["B"]);
                assert_eq!(drain(&restarted.queue("archive")?)?, vec!["A"]);
                cleanup(restarted)
            },
            |_| Ok(()),
        );
    }

    #[test]
    fn test_recovery_is_idempotent() {
        run_test(
            create_test_context,
            |ctx| {
                seed(&ctx.manager(), "orders", &["A", "B"])?;
                ctx.queue("orders")?.poll(Duration::ZERO)?;

                let first = crash_with(&ctx, |journal| {
                    let committed = journal.next_transaction_id();
                    journal.append(committed, add("orders", "C"))?;
                    journal.commit(committed)?;
                    let incomplete = journal.next_transaction_id();
                    journal.append(incomplete, remove("orders", "A"))?;
                    journal.append(incomplete, add("orders", "lost"))?;
                    Ok(())
                })?;
                first.manager().start()?;
                let expected = vec!["B", "C", "A"];
                assert_eq!(drain_keep(&first)?, expected);

                first.manager().close()?;
                let second = first.reopen()?;
                let report = second.manager().start()?;
                assert_eq!(report.redone, 0);
                assert_eq!(report.undone, 0);
                assert_eq!(drain_keep(&second)?, expected);

                // compaction after the first run left nothing for later runs to decide
                assert_eq!(report.committed, 0);
                assert_eq!(report.incomplete, 0);
                cleanup(second)
            },
            |_| Ok(()),
        );
    }

    /// Reads the queue contents in order without changing them.
    fn drain_keep(ctx: &TestContext) -> LedgerResult<Vec<String>> {
        let queue = ctx.queue("orders")?;
        let items = drain(&queue)?;
        for item in &items {
            queue.offer(text(item), 0, Duration::ZERO)?;
        }
        Ok(items)
    }
}
