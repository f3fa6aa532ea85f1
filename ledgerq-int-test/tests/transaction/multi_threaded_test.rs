use ledgerq::errors::LedgerResult;
use ledgerq::QueueManager;
use ledgerq_int_test::test_util::{cleanup, create_test_context, drain, run_test, text, WAIT};
use rand::Rng;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const PRODUCERS: usize = 4;
const CONSUMERS: usize = 4;
const PER_PRODUCER: usize = 50;

fn produce(manager: &QueueManager, producer: usize) -> LedgerResult<()> {
    for i in 0..PER_PRODUCER {
        if i % 10 == 9 {
            let abandoned = manager.begin_transaction()?;
            abandoned.offer("work", text(&format!("{}-{}-abandoned", producer, i)), WAIT)?;
            abandoned.rollback()?;
        }

        let tx = manager.begin_transaction()?;
        tx.offer("work", text(&format!("{}-{}", producer, i)), WAIT)?;
        tx.commit()?;
    }
    Ok(())
}

fn consume(
    manager: &QueueManager,
    done: &AtomicBool,
    consumed: &Mutex<Vec<String>>,
) -> LedgerResult<()> {
    let mut rng = rand::rng();
    loop {
        let tx = manager.begin_transaction()?;
        match tx.poll("work", Duration::from_millis(20))? {
            Some(payload) => {
                if rng.random_bool(0.2) {
                    tx.rollback()?;
                } else {
                    tx.offer("done", payload.clone(), WAIT)?;
                    tx.commit()?;
                    consumed.lock().unwrap().push(payload.as_text()?.to_string());
                }
            }
            None => {
                tx.rollback()?;
                if done.load(Ordering::SeqCst) && manager.queue("work")?.is_empty()? {
                    return Ok(());
                }
            }
        }
    }
}

#[test]
fn test_concurrent_producers_and_consumers() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let done = Arc::new(AtomicBool::new(false));
            let finished = Arc::new(AtomicUsize::new(0));
            let consumed = Arc::new(Mutex::new(Vec::new()));

            let producers: Vec<_> = (0..PRODUCERS)
                .map(|p| {
                    let manager = manager.clone();
                    thread::spawn(move || produce(&manager, p))
                })
                .collect();

            let consumers: Vec<_> = (0..CONSUMERS)
                .map(|_| {
                    let manager = manager.clone();
                    let done = done.clone();
                    let finished = finished.clone();
                    let consumed = consumed.clone();
                    thread::spawn(move || {
                        let result = consume(&manager, &done, &consumed);
                        finished.fetch_add(1, Ordering::SeqCst);
                        result
                    })
                })
                .collect();

            for producer in producers {
                producer.join().expect("producer panicked")?;
            }
            done.store(true, Ordering::SeqCst);

            awaitility::at_most(Duration::from_secs(30))
                .until(|| finished.load(Ordering::SeqCst) == CONSUMERS);
            for consumer in consumers {
                consumer.join().expect("consumer panicked")?;
            }

            let consumed = consumed.lock().unwrap().clone();
            let unique: HashSet<&String> = consumed.iter().collect();
            assert_eq!(consumed.len(), PRODUCERS * PER_PRODUCER);
            assert_eq!(unique.len(), consumed.len());
            assert!(consumed.iter().all(|item| !item.ends_with("abandoned")));

            assert!(ctx.queue("work")?.is_empty()?);
            assert_eq!(drain(&ctx.queue("done")?)?.len(), PRODUCERS * PER_PRODUCER);
            assert_eq!(manager.active_transactions(), 0);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_blocked_offer_wakes_when_consumer_commits() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let consumer = {
                let manager = manager.clone();
                thread::spawn(move || -> LedgerResult<Option<String>> {
                    let tx = manager.begin_transaction()?;
                    let item = tx.poll("handoff", Duration::from_secs(5))?;
                    tx.commit()?;
                    match item {
                        Some(payload) => Ok(Some(payload.as_text()?.to_string())),
                        None => Ok(None),
                    }
                })
            };

            thread::sleep(Duration::from_millis(50));
            let tx = manager.begin_transaction()?;
            tx.offer("handoff", text("baton"), WAIT)?;
            tx.commit()?;

            let received = consumer.join().expect("consumer panicked")?;
            assert_eq!(received.as_deref(), Some("baton"));
            Ok(())
        },
        cleanup,
    );
}
