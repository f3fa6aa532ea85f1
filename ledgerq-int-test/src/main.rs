use ledgerq::errors::LedgerResult;
use ledgerq_int_test::test_util::{cleanup, create_test_context, text, WAIT};
use std::time::{Duration, Instant};

fn main() -> LedgerResult<()> {
    println!("Starting stress test...");
    let ctx = create_test_context()?;
    let manager = ctx.manager();

    let count = 100_000;
    let start = Instant::now();
    for i in 0..count {
        let tx = manager.begin_transaction()?;
        tx.offer("inbox", text(&format!("message-{}", i)), WAIT)?;
        tx.commit()?;
    }
    println!("Committed {} offers in {:?}", count, start.elapsed());

    let start = Instant::now();
    let mut moved = 0;
    loop {
        let tx = manager.begin_transaction()?;
        match tx.poll("inbox", Duration::ZERO)? {
            Some(message) => {
                tx.offer("processed", message, WAIT)?;
                tx.commit()?;
                moved += 1;
            }
            None => {
                tx.rollback()?;
                break;
            }
        }
    }
    println!("Moved {} messages in {:?}", moved, start.elapsed());

    let start = Instant::now();
    manager.stop()?;
    let report = manager.start()?;
    println!("Warm restart in {:?}: {}", start.elapsed(), report);

    if let Some(journal) = manager.journal() {
        let stats = journal.stats();
        println!(
            "Journal holds {} bytes, next sequence {}",
            stats.file_size, stats.next_sequence
        );
    }

    cleanup(ctx)?;
    Ok(())
}
