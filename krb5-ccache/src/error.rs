mod ccache_error;

pub type ErrorCode = i32;

#[derive(Debug, PartialEq, Eq)]
pub struct Error {
    pub code: ErrorCode,
    pub message: &'static str,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Finds the library error behind an `anyhow::Error`, if there is one.
    pub fn find(err: &anyhow::Error) -> Option<&'static Error> {
        err.downcast_ref::<&'static Error>().copied()
    }
}

macro_rules! error {
    ($error:ident, $code:expr, $message:expr) => {
        pub const $error: &'static Error = &Error {
            code: $code,
            message: $message,
        };
    };
}

pub(self) use error;
