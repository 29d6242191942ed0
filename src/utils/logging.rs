use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};
use chrono::Local;

pub trait Logger: Send + Sync {
    fn log(&self, message: &str);
    fn debug_log(&self, message: &str);
}

#[derive(Debug)]
pub struct FileLogger {
    log_file: String,
    debug: bool,
    // serializes appends from concurrent search tasks
    write_lock: Mutex<()>,
}

impl FileLogger {
    pub fn new(log_file: &str, debug: bool) -> std::io::Result<Self> {
        // Create log directory if it doesn't exist
        if let Some(parent) = Path::new(log_file).parent() {
            fs::create_dir_all(parent)?;
        }

        Ok(FileLogger {
            log_file: log_file.to_string(),
            debug,
            write_lock: Mutex::new(()),
        })
    }

    fn write_to_file(&self, message: &str) -> std::io::Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)?;

        writeln!(file, "{}: {}", Local::now().format("%Y-%m-%d %H:%M:%S"), message)
    }
}

impl Logger for FileLogger {
    fn log(&self, message: &str) {
        if let Err(e) = self.write_to_file(message) {
            eprintln!("Failed to write to log file: {}", e);
        }
    }

    fn debug_log(&self, message: &str) {
        if self.debug {
            if let Err(e) = self.write_to_file(&format!("[DEBUG] {}", message)) {
                eprintln!("Failed to write debug log: {}", e);
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct StderrLogger {
    debug: bool,
}

impl StderrLogger {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }
}

impl Logger for StderrLogger {
    fn log(&self, message: &str) {
        eprintln!("{} {}", Local::now().format("%H:%M:%S"), message);
    }

    fn debug_log(&self, message: &str) {
        if self.debug {
            eprintln!("{} [DEBUG] {}", Local::now().format("%H:%M:%S"), message);
        }
    }
}

// MultiLogger allows logging to multiple destinations
#[derive(Default)]
pub struct MultiLogger {
    loggers: Vec<Box<dyn Logger>>,
}

impl MultiLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, logger: impl Logger + 'static) -> Self {
        self.loggers.push(Box::new(logger));
        self
    }
}

impl Logger for MultiLogger {
    fn log(&self, message: &str) {
        for logger in &self.loggers {
            logger.log(message);
        }
    }

    fn debug_log(&self, message: &str) {
        for logger in &self.loggers {
            logger.debug_log(message);
        }
    }
}

/// Discards everything. Used when a store is built without a process logger.
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _message: &str) {}
    fn debug_log(&self, _message: &str) {}
}

/// Logger handle owned by one store; prefixes every line with the store ID.
#[derive(Clone)]
pub struct StoreLogger {
    store_id: String,
    inner: Arc<dyn Logger>,
}

impl StoreLogger {
    pub fn new(store_id: &str, inner: Arc<dyn Logger>) -> Self {
        Self {
            store_id: store_id.to_string(),
            inner,
        }
    }
}

impl Logger for StoreLogger {
    fn log(&self, message: &str) {
        self.inner.log(&format!("[{}] {}", self.store_id, message));
    }

    fn debug_log(&self, message: &str) {
        self.inner
            .debug_log(&format!("[{}] {}", self.store_id, message));
    }
}
