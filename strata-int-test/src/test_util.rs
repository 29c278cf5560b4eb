use std::backtrace::Backtrace;
use std::time::{Duration, Instant};
use std::{env, fs, thread};
use strata::errors::{ErrorKind, StrataError, StrataResult};
use strata::transaction::{Database, TransactionConfig};

/// Runs a test with retry logic and error handling.
/// Tests run on the current thread to avoid thread exhaustion when running many tests in parallel.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> StrataResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> StrataResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> StrataResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    const MAX_RETRIES: u32 = 3;
    let mut last_error: Option<String> = None;
    let mut last_backtrace: Option<String> = None;

    for attempt in 1..=MAX_RETRIES {
        let start_time = Instant::now();

        let result = std::panic::catch_unwind(|| {
            let backtrace = Backtrace::capture();
            match before() {
                Ok(ctx) => match test(ctx.clone()) {
                    Ok(_) => after(ctx)
                        .map_err(|e| (format!("After run failed: {:?}", e), backtrace.to_string())),
                    Err(e) => {
                        let _ = after(ctx);
                        Err((format!("Test failed: {:?}", e), backtrace.to_string()))
                    }
                },
                Err(e) => Err((format!("Before run failed: {:?}", e), backtrace.to_string())),
            }
        });

        let elapsed = start_time.elapsed();

        match result {
            Ok(Ok(_)) => return,
            Ok(Err((e, bt))) => {
                last_error = Some(e.clone());
                last_backtrace = Some(bt);
                if attempt < MAX_RETRIES {
                    eprintln!(
                        "\n========== Test Attempt {}/{} Failed (took {:?}) ==========",
                        attempt, MAX_RETRIES, elapsed
                    );
                    eprintln!("Error: {}", e);
                    eprintln!("Retrying in {}ms...\n", 100 * attempt);
                    thread::sleep(Duration::from_millis(100 * attempt as u64));
                }
            }
            Err(panic_err) => {
                let err_msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_err.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                last_error = Some(format!("Panic: {}", err_msg));
                last_backtrace = Some(Backtrace::capture().to_string());

                if attempt < MAX_RETRIES {
                    eprintln!(
                        "\n========== Test Attempt {}/{} Panicked (took {:?}) ==========",
                        attempt, MAX_RETRIES, elapsed
                    );
                    eprintln!("Panic: {}", err_msg);
                    eprintln!("Retrying in {}ms...\n", 100 * attempt);
                    thread::sleep(Duration::from_millis(100 * attempt as u64));
                }
            }
        }
    }

    eprintln!("\n==================== TEST FAILED ====================");
    eprintln!("Failed after {} attempts", MAX_RETRIES);
    eprintln!("Last error: {}", last_error.as_deref().unwrap_or("Unknown"));
    if let Some(bt) = &last_backtrace {
        if !bt.is_empty() && !bt.contains("disabled") {
            eprintln!("\nBacktrace:\n{}", bt);
        }
    }
    eprintln!("=====================================================\n");

    panic!(
        "Test failed after {} attempts. Last error: {}",
        MAX_RETRIES,
        last_error.unwrap_or_default()
    );
}

#[derive(Clone)]
pub struct TestContext {
    path: Option<String>,
    db: Database,
}

impl TestContext {
    pub fn new(path: Option<String>, db: Database) -> Self {
        Self { path, db }
    }

    /// Directory of the fjall store, `None` for the in-memory store.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn db(&self) -> Database {
        self.db.clone()
    }
}

pub fn random_path() -> String {
    let id = uuid::Uuid::new_v4();
    env::temp_dir().join(id.to_string()).to_string_lossy().to_string()
}

fn transaction_config() -> TransactionConfig {
    TransactionConfig::new().max_retries(20).retry_backoff_ms(1)
}

#[cfg(feature = "fjall")]
fn open_fjall(path: &str) -> StrataResult<Database> {
    use strata_fjall_adapter::FjallStore;

    // low memory preset keeps the thread count down when tests run in parallel
    let store = FjallStore::with_config()
        .db_path(path)
        .low_memory_preset()
        .build()?;
    Database::builder()
        .store(store)
        .config(transaction_config())
        .open()
}

#[cfg(feature = "fjall")]
pub fn create_test_context() -> StrataResult<TestContext> {
    const MAX_ATTEMPTS: u32 = 3;
    let mut last_error: Option<StrataError> = None;

    for attempt in 1..=MAX_ATTEMPTS {
        let path = random_path();
        match open_fjall(&path) {
            Ok(db) => return Ok(TestContext::new(Some(path), db)),
            Err(e) => {
                let _ = fs::remove_dir_all(&path);
                if attempt < MAX_ATTEMPTS {
                    eprintln!(
                        "Warning: Failed to create test context (attempt {}/{}): {:?}",
                        attempt, MAX_ATTEMPTS, e
                    );
                    thread::sleep(Duration::from_millis(50 * attempt as u64));
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        StrataError::new("Failed to create test context", ErrorKind::InternalError)
    }))
}

#[cfg(not(feature = "fjall"))]
pub fn create_test_context() -> StrataResult<TestContext> {
    use strata::store::memory::InMemoryStore;

    let db = Database::builder()
        .store(InMemoryStore::default())
        .config(transaction_config())
        .open()?;
    Ok(TestContext::new(None, db))
}

/// Closes the database and opens a new one over the same files.
///
/// # Errors
/// `InvalidOperation` for an in-memory context, which cannot be reopened.
#[cfg(feature = "fjall")]
pub fn reopen(ctx: TestContext) -> StrataResult<TestContext> {
    let path = ctx.path.clone().ok_or_else(|| {
        StrataError::new("In-memory contexts cannot be reopened", ErrorKind::InvalidOperation)
    })?;
    ctx.db.close()?;
    drop(ctx);
    let db = open_fjall(&path)?;
    Ok(TestContext::new(Some(path), db))
}

pub fn cleanup(ctx: TestContext) -> StrataResult<()> {
    ctx.db.close()?;
    if let Some(path) = ctx.path {
        let mut retry = 0;
        while fs::remove_dir_all(&path).is_err() && retry < 2 {
            thread::sleep(Duration::from_millis(100));
            retry += 1;
        }
    }
    Ok(())
}
