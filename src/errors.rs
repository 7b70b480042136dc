use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Some assumption was violated. This is a bug: {0}")]
    FatalError(String),
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    #[error("Type error: {0}")]
    TypeError(String),
    #[error("Failed to parse input: {0}")]
    ParseError(String),
    #[error("Value out of range: {0}")]
    OutOfRange(String),
    #[error("Overflow")]
    Overflow,
    #[error("Division by zero")]
    DivideByZero,
    #[error("Memory pool exhausted: requested {requested} bytes with limit of {limit} bytes")]
    PoolExhausted { requested: usize, limit: usize },
    #[error("Tuple does not match schema: {0}")]
    SchemaMismatch(String),
    #[error("Query was cancelled")]
    Cancelled,
    #[error("{operator} failed: {source}")]
    OperatorFailed {
        operator: String,
        #[source]
        source: Box<QueryError>,
    },
}

impl QueryError {
    /// Attaches the failing operator to a runtime error. Errors that already name an operator
    /// and cancellation are passed through unchanged.
    pub fn in_operator(self, operator: &str) -> QueryError {
        match self {
            e @ QueryError::OperatorFailed { .. } | e @ QueryError::Cancelled => e,
            e => QueryError::OperatorFailed {
                operator: operator.to_string(),
                source: Box::new(e),
            },
        }
    }

    /// The innermost error, skipping operator annotations.
    pub fn root_cause(&self) -> &QueryError {
        match self {
            QueryError::OperatorFailed { source, .. } => source.root_cause(),
            e => e,
        }
    }
}

#[macro_export]
macro_rules! fatal {
    ($e:expr) => {
        $crate::QueryError::FatalError($e.to_owned())
    };
    ($fmt:expr, $($arg:tt)+) => {
        $crate::QueryError::FatalError(format!($fmt, $($arg)+).to_string())
    };
}

#[macro_export]
macro_rules! bail {
    ($kind:expr, $e:expr) => {
        return Err($kind($e.to_owned()))
    };
    ($kind:expr, $fmt:expr, $($arg:tt)+) => {
        return Err($kind(format!($fmt, $($arg)+).to_owned()))
    };
}

#[macro_export]
macro_rules! ensure {
    ($cond:expr, $e:expr) => {
        if !($cond) {
            return Err($crate::QueryError::FatalError($e.to_string()));
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)+) => {
        if !($cond) {
            return Err($crate::QueryError::FatalError(format!($fmt, $($arg)+).to_string()));
        }
    };
}
