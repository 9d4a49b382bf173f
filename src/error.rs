use std::fmt;

#[derive(Debug)]
pub enum PiError {
    IoError(std::io::Error),
    GitCliError {
        code: Option<i32>,
        stderr: String,
        args: Vec<String>,
    },
    JsonError(serde_json::Error),
    Utf8Error(std::str::Utf8Error),
    FromUtf8Error(std::string::FromUtf8Error),
    Generic(String),
}

impl fmt::Display for PiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PiError::IoError(e) => write!(f, "io error: {}", e),
            PiError::GitCliError { code, stderr, args } => write!(
                f,
                "git {} failed (code {:?}): {}",
                args.join(" "),
                code,
                stderr.trim()
            ),
            PiError::JsonError(e) => write!(f, "json error: {}", e),
            PiError::Utf8Error(e) => write!(f, "utf8 error: {}", e),
            PiError::FromUtf8Error(e) => write!(f, "utf8 error: {}", e),
            PiError::Generic(s) => write!(f, "{}", s),
        }
    }
}

impl std::error::Error for PiError {}

impl Clone for PiError {
    fn clone(&self) -> Self {
        match self {
            PiError::IoError(e) => PiError::Generic(format!("io error: {}", e)),
            PiError::GitCliError { code, stderr, args } => PiError::GitCliError {
                code: *code,
                stderr: stderr.clone(),
                args: args.clone(),
            },
            PiError::JsonError(e) => PiError::Generic(format!("json error: {}", e)),
            PiError::Utf8Error(e) => PiError::Utf8Error(*e),
            PiError::FromUtf8Error(e) => PiError::Generic(format!("utf8 error: {}", e)),
            PiError::Generic(s) => PiError::Generic(s.clone()),
        }
    }
}

impl From<std::io::Error> for PiError {
    fn from(e: std::io::Error) -> Self {
        PiError::IoError(e)
    }
}

impl From<serde_json::Error> for PiError {
    fn from(e: serde_json::Error) -> Self {
        PiError::JsonError(e)
    }
}

impl From<std::str::Utf8Error> for PiError {
    fn from(e: std::str::Utf8Error) -> Self {
        PiError::Utf8Error(e)
    }
}

impl From<std::string::FromUtf8Error> for PiError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        PiError::FromUtf8Error(e)
    }
}
