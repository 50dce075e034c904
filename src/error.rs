use std::path::{Path, PathBuf};

/// Everything that can go wrong while reading or editing project and
/// solution files. Every variant terminates the operation that raised it;
/// nothing is retried and no partial result is returned.
#[derive(Debug, thiserror::Error)]
pub enum VcxprojError {
    /// The document is not well-formed.
    #[error("{}{line}:{column}: {message}", location(.path))]
    Parse {
        path: Option<PathBuf>,
        line: u32,
        column: u32,
        message: String,
    },

    /// A query produced a number of results its caller does not allow.
    #[error("expected {expected} result(s) for {query}, found {found}")]
    Cardinality {
        query: String,
        expected: &'static str,
        found: usize,
    },

    /// A value does not have the literal shape it is required to have.
    #[error("malformed {field} '{value}': {message}")]
    Format {
        field: &'static str,
        value: String,
        message: String,
    },

    /// A query refers to a `$variable` nobody supplied.
    #[error("unbound variable ${name} in {query}")]
    UnboundVariable { query: String, name: String },

    #[error("{} already contains source file {}", .project.display(), .file.display())]
    DuplicateReference { project: PathBuf, file: PathBuf },

    #[error("{} does not contain source file {}", .file.display(), .reference.display())]
    NotFound { file: PathBuf, reference: PathBuf },

    /// A document parsed from a string has no location to resolve paths
    /// against or save to.
    #[error("cannot {operation}: document was not opened from a file")]
    NoLocation { operation: &'static str },

    #[error("failed to save document to {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = VcxprojError> = std::result::Result<T, E>;

fn location(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!("{}:", path.display()),
        None => String::new(),
    }
}

impl VcxprojError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io { path: path.to_path_buf(), source }
    }

    pub(crate) fn persist(path: &Path, source: std::io::Error) -> Self {
        Self::Persist { path: path.to_path_buf(), source }
    }

    /// Attach the file a path-less parse error came from.
    pub(crate) fn in_file(self, file: &Path) -> Self {
        match self {
            Self::Parse { path: None, line, column, message } => Self::Parse {
                path: Some(file.to_path_buf()),
                line,
                column,
                message,
            },
            other => other,
        }
    }
}

impl From<roxmltree::Error> for VcxprojError {
    fn from(error: roxmltree::Error) -> Self {
        let pos = error.pos();
        Self::Parse {
            path: None,
            line: pos.row,
            column: pos.col,
            message: format!("XML Error: {error}"),
        }
    }
}
