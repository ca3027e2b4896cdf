use std::fmt;

use crewmem::CrewMemError;

/// Message-only error; the binary prints it and exits non-zero
#[derive(Debug)]
pub struct CliError(pub String);

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for CliError {}

impl From<&str> for CliError {
    fn from(message: &str) -> Self {
        CliError(message.to_string())
    }
}

impl From<String> for CliError {
    fn from(message: String) -> Self {
        CliError(message)
    }
}

impl From<CrewMemError> for CliError {
    fn from(e: CrewMemError) -> Self {
        match e.root() {
            CrewMemError::Validation(message) => CliError(format!("Invalid input: {message}")),
            CrewMemError::NotFound(message) => CliError(format!("Not found: {message}")),
            _ => CliError(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError(format!("Malformed JSON: {e}"))
    }
}

pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_labelled() {
        let err: CliError = CrewMemError::Validation("tenant id must not be empty".to_string()).into();
        assert_eq!(err.to_string(), "Invalid input: tenant id must not be empty");
    }

    #[test]
    fn other_errors_keep_their_message() {
        let err: CliError = CrewMemError::Storage("table missing".to_string()).into();
        assert_eq!(err.to_string(), CrewMemError::Storage("table missing".to_string()).to_string());
    }
}
