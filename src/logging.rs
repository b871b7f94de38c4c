use std::sync::Arc;

/// Log levels for the callback logging system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Error messages
    Error,
    /// Warning messages
    Warn,
    /// Informational messages
    Info,
    /// Debug messages
    Debug,
}

/// Logging mode for wire-line display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// Show raw wire lines only
    Raw,
    /// Show interpreted lines with field descriptions
    Interpreted,
    /// Show both raw and interpreted lines
    Both,
}

impl LogLevel {
    /// Convert log level to string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

/// Type alias for log callback functions
///
/// The callback receives a log level and message string
pub type LogCallback = Box<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Logger that uses callbacks for flexible logging
#[derive(Clone)]
pub struct CallbackLogger {
    callback: Option<Arc<LogCallback>>,
    min_level: LogLevel,
    mode: LoggingMode,
}

impl CallbackLogger {
    /// Create a new callback logger
    pub fn new(callback: Option<LogCallback>, min_level: LogLevel) -> Self {
        Self {
            callback: callback.map(Arc::new),
            min_level,
            mode: LoggingMode::Interpreted,
        }
    }

    /// Create a new callback logger with specific mode
    pub fn with_mode(callback: Option<LogCallback>, min_level: LogLevel, mode: LoggingMode) -> Self {
        Self {
            callback: callback.map(Arc::new),
            min_level,
            mode,
        }
    }

    /// Create a logger with default console output
    pub fn console() -> Self {
        let callback: LogCallback = Box::new(|level, message| {
            let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f");
            match level {
                LogLevel::Error => eprintln!("[{}] ERROR: {}", timestamp, message),
                LogLevel::Warn => eprintln!("[{}] WARN: {}", timestamp, message),
                LogLevel::Info => println!("[{}] INFO: {}", timestamp, message),
                LogLevel::Debug => println!("[{}] DEBUG: {}", timestamp, message),
            }
        });
        Self::new(Some(callback), LogLevel::Info)
    }

    /// Create a logger that outputs nothing (disabled)
    pub fn disabled() -> Self {
        Self::new(None, LogLevel::Error)
    }

    /// Set logging mode
    pub fn set_mode(&mut self, mode: LoggingMode) {
        self.mode = mode;
    }

    /// Get current logging mode
    pub fn get_mode(&self) -> LoggingMode {
        self.mode
    }

    /// Log a message at the specified level
    pub fn log(&self, level: LogLevel, message: &str) {
        if self.should_log(level) {
            if let Some(ref callback) = self.callback {
                callback(level, message);
            }
        }
    }

    /// Log an error message
    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    /// Log a warning message
    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    /// Log an info message
    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    /// Log a debug message
    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    /// Check if a message at the given level should be logged
    fn should_log(&self, level: LogLevel) -> bool {
        self.callback.is_some() && level as u8 <= self.min_level as u8
    }

    /// Log a wire line with its direction
    pub fn log_line(&self, level: LogLevel, direction: &str, line: &str) {
        if !self.should_log(level) {
            return;
        }

        let message = format!("{} line ({} bytes): {:?}", direction, line.len(), line);
        self.log(level, &message);
    }

    /// Log an outbound command line with different modes
    pub fn log_command(&self, line: &str) {
        match self.mode {
            LoggingMode::Raw => {
                self.info(&format!("GCS Command -> Raw: {:?}", line));
            }
            LoggingMode::Interpreted => {
                self.info(&Self::interpret_command(line));
            }
            LoggingMode::Both => {
                self.info(&Self::interpret_command(line));
                self.debug(&format!("GCS Command -> Raw: {:?}", line));
            }
        }
    }

    /// Log an inbound reply line with different modes
    pub fn log_reply(&self, line: &str) {
        match self.mode {
            LoggingMode::Raw => {
                self.info(&format!("GCS Reply <- Raw: {:?}", line));
            }
            LoggingMode::Interpreted => {
                self.info(&Self::interpret_reply(line));
            }
            LoggingMode::Both => {
                self.info(&Self::interpret_reply(line));
                self.debug(&format!("GCS Reply <- Raw: {:?}", line));
            }
        }
    }

    /// Render an outbound line with its fields named
    fn interpret_command(line: &str) -> String {
        let mut tokens = line.split_whitespace();
        let first = tokens.next().unwrap_or_default();

        let (index, mnemonic) = match first.parse::<u8>() {
            Ok(index) => (Some(index), tokens.next().unwrap_or_default()),
            Err(_) => (None, first),
        };

        let args: Vec<&str> = tokens.collect();
        let name = Self::get_command_name(mnemonic);

        match index {
            Some(index) => format!(
                "GCS Command -> Controller: {}, {} ({}), Args: {}",
                index,
                name,
                mnemonic,
                args.join(" ")
            ),
            None => format!(
                "GCS Command -> {} ({}), Args: {}",
                name,
                mnemonic,
                args.join(" ")
            ),
        }
    }

    /// Render an inbound line with its fields named
    fn interpret_reply(line: &str) -> String {
        let mut tokens = line.splitn(3, ' ');
        let first = tokens.next().unwrap_or_default();
        let second = tokens.next();
        let third = tokens.next();

        match (second, third) {
            (Some(from), Some(payload)) => format!(
                "GCS Reply <- To: {}, From: {}, Payload: {}",
                first, from, payload
            ),
            _ => format!("GCS Reply <- Payload: {}", line),
        }
    }

    /// Get human-readable command name
    fn get_command_name(mnemonic: &str) -> &'static str {
        match mnemonic {
            "MOV" => "Move Absolute",
            "MVR" => "Move Relative",
            "POS?" => "Get Position",
            "SVO" => "Set Servo",
            "SVO?" => "Get Servo",
            "FRF" => "Find Reference",
            "SVA" => "Set Voltage",
            "SVA?" => "Get Voltage",
            "WAC" => "Wait On Target",
            "ERR?" => "Get Error",
            _ => "Unknown Command",
        }
    }
}

impl Default for CallbackLogger {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Convenience macro for creating a simple console logger
#[macro_export]
macro_rules! console_logger {
    () => {
        $crate::logging::CallbackLogger::console()
    };
}

/// Convenience macro for creating a custom logger
#[macro_export]
macro_rules! custom_logger {
    ($callback:expr) => {
        $crate::logging::CallbackLogger::new(Some($callback), $crate::logging::LogLevel::Info)
    };
    ($callback:expr, $level:expr) => {
        $crate::logging::CallbackLogger::new(Some($callback), $level)
    };
    ($callback:expr, $level:expr, $mode:expr) => {
        $crate::logging::CallbackLogger::with_mode(Some($callback), $level, $mode)
    };
}
