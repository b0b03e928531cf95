use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

use outbox::error::OutboxError;

/// Returns whether terminal output should include backtraces.
fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

pub type PublisherResult<T> = Result<T, PublisherError>;

/// Backtrace captured when a non-outbox error is created.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type of the publisher binary.
#[derive(Debug)]
pub enum PublisherError {
    /// Failure of the publisher itself, including a fail-fast shutdown.
    Outbox(OutboxError),
    /// Configuration or telemetry setup failure.
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    Io(std::io::Error, CapturedBacktrace),
}

impl PublisherError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            PublisherError::Outbox(_) => "publisher error",
            PublisherError::Config(_, _) => "configuration error",
            PublisherError::Io(_, _) => "i/o error",
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            PublisherError::Outbox(err) => err.backtrace(),
            PublisherError::Config(_, captured) => Some(&captured.0),
            PublisherError::Io(_, captured) => Some(&captured.0),
        }
    }

    /// Creates a configuration error from any error.
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        PublisherError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Returns a report for terminal output: category, error, causes and, with
    /// `RUST_BACKTRACE` set, the backtrace.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("outbox publisher failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {self}\n"));

        // Aggregated outbox errors already list their members.
        if !matches!(self, PublisherError::Outbox(err) if err.errors().is_some()) {
            let mut source = Error::source(self);
            let mut index = 1usize;
            while let Some(err) = source {
                out.push_str(&format!("cause {index}: {err}\n"));
                source = err.source();
                index += 1;
            }
        }

        if should_render_backtrace()
            && let Some(backtrace) = self.backtrace()
        {
            out.push_str("backtrace:\n");
            out.push_str(&backtrace.to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }

        out
    }
}

impl fmt::Display for PublisherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublisherError::Outbox(err) => write!(f, "{err}"),
            PublisherError::Config(source, _) => write!(f, "configuration error: {source}"),
            PublisherError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for PublisherError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PublisherError::Outbox(err) => err.source(),
            PublisherError::Config(source, _) => Some(source.as_ref()),
            PublisherError::Io(source, _) => Some(source),
        }
    }
}

impl From<OutboxError> for PublisherError {
    fn from(err: OutboxError) -> Self {
        PublisherError::Outbox(err)
    }
}

impl From<std::io::Error> for PublisherError {
    fn from(err: std::io::Error) -> Self {
        PublisherError::Io(err, CapturedBacktrace::capture())
    }
}
