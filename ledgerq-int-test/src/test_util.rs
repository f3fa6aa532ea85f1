use ledgerq::common::Payload;
use ledgerq::errors::LedgerResult;
use ledgerq::store::{QueueConfig, QueueStore};
use ledgerq::QueueManager;
use std::backtrace::Backtrace;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use std::{env, fs, thread};

#[cfg(feature = "fjall")]
use ledgerq_fjall_adapter::FjallModule;
#[cfg(not(feature = "fjall"))]
use ledgerq::store::memory::InMemoryStorageModule;

/// Short wait budget for operations expected to succeed or fail at once.
pub const WAIT: Duration = Duration::from_millis(50);

/// Runs a test with retry logic and error handling.
///
/// Every attempt gets a fresh context from `before`, so a retry never sees the state a
/// failed attempt left behind.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> LedgerResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> LedgerResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> LedgerResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    const MAX_RETRIES: u32 = 2;
    let mut last_error: Option<String> = None;

    for attempt in 1..=MAX_RETRIES {
        let start_time = Instant::now();

        let result = std::panic::catch_unwind(|| {
            let ctx = before().map_err(|e| format!("Setup failed: {}", e))?;
            let outcome = test(ctx.clone()).map_err(|e| format!("Test failed: {}", e));
            if let Err(e) = after(ctx) {
                eprintln!("Warning: cleanup failed: {}", e);
            }
            outcome
        });

        let elapsed = start_time.elapsed();
        match result {
            Ok(Ok(())) => return,
            Ok(Err(e)) => {
                eprintln!(
                    "\n========== Test Attempt {}/{} Failed (took {:?}) ==========",
                    attempt, MAX_RETRIES, elapsed
                );
                eprintln!("Error: {}", e);
                last_error = Some(e);
            }
            Err(panic_err) => {
                let err_msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_err.downcast_ref::<String>() {
                    s.clone()
                } else {
                    format!("Unknown panic: {:?}", panic_err.type_id())
                };
                eprintln!(
                    "\n========== Test Attempt {}/{} Panicked (took {:?}) ==========",
                    attempt, MAX_RETRIES, elapsed
                );
                eprintln!("Panic: {}", err_msg);
                last_error = Some(format!("Panic: {}", err_msg));
            }
        }

        if attempt < MAX_RETRIES {
            thread::sleep(Duration::from_millis(100 * attempt as u64));
        }
    }

    let backtrace = Backtrace::capture().to_string();
    if !backtrace.is_empty() && !backtrace.contains("disabled") {
        eprintln!("\nBacktrace:\n{}", backtrace);
    }
    panic!(
        "Test failed after {} attempts. Last error: {}",
        MAX_RETRIES,
        last_error.unwrap_or_default()
    );
}

/// A started queue manager over its own temp directory.
///
/// The directory holds `journal/` for the transaction journal and, with the `fjall`
/// feature, `queues/` for the persistent queue keyspace.
#[derive(Clone)]
pub struct TestContext {
    path: String,
    manager: QueueManager,
    #[cfg(not(feature = "fjall"))]
    module: InMemoryStorageModule,
}

impl TestContext {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn manager(&self) -> QueueManager {
        self.manager.clone()
    }

    pub fn journal_dir(&self) -> PathBuf {
        PathBuf::from(&self.path).join("journal")
    }

    pub fn db_dir(&self) -> PathBuf {
        PathBuf::from(&self.path).join("queues")
    }

    /// Opens a new, not yet started manager over the same directories. The current
    /// manager should be closed, or abandoned to simulate a crash, before the new one
    /// starts.
    pub fn reopen(&self) -> LedgerResult<TestContext> {
        #[cfg(feature = "fjall")]
        let manager = open_manager(&self.path)?;
        #[cfg(not(feature = "fjall"))]
        let manager = open_manager(&self.path, &self.module)?;

        Ok(TestContext {
            path: self.path.clone(),
            manager,
            #[cfg(not(feature = "fjall"))]
            module: self.module.clone(),
        })
    }

    /// Returns the non-transactional handle of a queue.
    pub fn queue(&self, name: &str) -> LedgerResult<QueueStore> {
        self.manager.queue(name)
    }
}

pub fn random_path() -> String {
    let id = uuid::Uuid::new_v4();
    env::temp_dir()
        .join("ledgerq-int-test")
        .join(id.to_string())
        .to_string_lossy()
        .to_string()
}

#[cfg(feature = "fjall")]
fn open_manager(path: &str) -> LedgerResult<QueueManager> {
    let db_path = PathBuf::from(path).join("queues");
    let module = FjallModule::with_config()
        .low_memory_preset()
        .db_path(&db_path.to_string_lossy())
        .build();

    QueueManager::builder()
        .journal_dir(PathBuf::from(path).join("journal"))
        .compaction_threshold(16)
        .commit_apply_timeout(Duration::from_millis(200))
        .default_queue_config(QueueConfig::persistent())
        .queue_config("scratch", QueueConfig::transient())
        .queue_config("bounded", QueueConfig::persistent().with_capacity(2))
        .load_module(module)
        .open()
}

#[cfg(not(feature = "fjall"))]
fn open_manager(path: &str, module: &InMemoryStorageModule) -> LedgerResult<QueueManager> {
    QueueManager::builder()
        .journal_dir(PathBuf::from(path).join("journal"))
        .compaction_threshold(16)
        .commit_apply_timeout(Duration::from_millis(200))
        .default_queue_config(QueueConfig::persistent())
        .queue_config("scratch", QueueConfig::transient())
        .queue_config("bounded", QueueConfig::persistent().with_capacity(2))
        .load_module(module.clone())
        .open()
}

/// Creates a context whose manager is opened and started.
pub fn create_test_context() -> LedgerResult<TestContext> {
    let ctx = create_stopped_context()?;
    ctx.manager().start()?;
    Ok(ctx)
}

/// Creates a context whose manager is opened but not started.
pub fn create_stopped_context() -> LedgerResult<TestContext> {
    let path = random_path();

    #[cfg(feature = "fjall")]
    let ctx = TestContext {
        manager: open_manager(&path)?,
        path,
    };

    #[cfg(not(feature = "fjall"))]
    let ctx = {
        let module = InMemoryStorageModule::new();
        TestContext {
            manager: open_manager(&path, &module)?,
            path,
            module,
        }
    };

    Ok(ctx)
}

pub fn cleanup(ctx: TestContext) -> LedgerResult<()> {
    if let Err(e) = ctx.manager().close() {
        eprintln!("Warning: Failed to close queue manager: {:?}", e);
    }

    let path = ctx.path().to_string();
    let mut delay_ms = 20u64;
    for retry in 0..5 {
        if !std::path::Path::new(&path).exists() {
            return Ok(());
        }
        match fs::remove_dir_all(&path) {
            Ok(_) => return Ok(()),
            Err(e) if retry < 4 => {
                log::debug!("Retrying removal of {}: {}", path, e);
                thread::sleep(Duration::from_millis(delay_ms));
                delay_ms *= 2;
            }
            Err(e) => eprintln!("Warning: Failed to remove test directory {}: {}", path, e),
        }
    }
    Ok(())
}

pub fn text(value: &str) -> Payload {
    Payload::text(value)
}

/// Polls a queue until it is empty and returns the elements as text, head first.
pub fn drain(queue: &QueueStore) -> LedgerResult<Vec<String>> {
    let mut items = Vec::new();
    while let Some(payload) = queue.poll(Duration::ZERO)? {
        items.push(payload.as_text()?.to_string());
    }
    Ok(items)
}

/// Offers every value to a queue in one committed transaction.
pub fn seed(manager: &QueueManager, queue: &str, values: &[&str]) -> LedgerResult<()> {
    let tx = manager.begin_transaction()?;
    for value in values {
        tx.offer(queue, text(value), WAIT)?;
    }
    tx.commit()
}
