//! Error handling for the olap CLI

use olap_core::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the CLI itself, before or around a store operation
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Validation error: {message}")]
    Validation { message: String },
}

impl CliError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn file_not_found(path: PathBuf) -> Self {
        Self::FileNotFound { path }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

impl From<toml::de::Error> for CliError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}

/// Render an error chain with hints for the failures users can fix themselves
pub fn format_error_with_suggestions(error: &anyhow::Error) -> String {
    let mut message = format!("{error}");
    for cause in error.chain().skip(1) {
        message.push_str(&format!("\n  caused by: {cause}"));
    }

    if let Some(cli) = error.downcast_ref::<CliError>() {
        match cli {
            CliError::FileNotFound { path } => {
                message.push_str(&format!(
                    "\n\nSuggestions:\n\
                     • Check that the file path is correct: {}\n\
                     • Ensure you have read permissions for the file",
                    path.display()
                ));
            }
            CliError::Config { .. } => {
                message.push_str(
                    "\n\nSuggestions:\n\
                     • Check your olap.toml configuration file\n\
                     • Use 'olap config --example' to generate a sample configuration",
                );
            }
            CliError::Validation { .. } => {
                message.push_str("\n\nSuggestions:\n• Run 'olap help' for the accepted options");
            }
        }
    }

    if let Some(store) = error.chain().find_map(|e| e.downcast_ref::<StoreError>()) {
        match store {
            StoreError::NotFound { .. } => {
                message.push_str(
                    "\n\nSuggestions:\n\
                     • Check that the directory holds an overlap store (offset.olap and data*.olap)",
                );
            }
            StoreError::CorruptStore { .. } | StoreError::Format { .. } => {
                message.push_str(
                    "\n\nSuggestions:\n\
                     • The store is damaged; restore it from a <store>.backNNN copy or rebuild it\n\
                     • Run 'olap stats --verify' to check shard sizes against the index",
                );
            }
            StoreError::CountMismatch { .. } => {
                message.push_str(
                    "\n\nSuggestions:\n\
                     • The erate file was computed for a different store generation",
                );
            }
            _ => {}
        }
    }

    message
}

/// Print error with helpful suggestions and exit
pub fn print_error_and_exit(error: &anyhow::Error) -> ! {
    eprintln!("Error: {}", format_error_with_suggestions(error));
    std::process::exit(1);
}
