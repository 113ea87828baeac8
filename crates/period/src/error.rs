use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrataError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (empty or clashing field binding, bad survey code, etc.).
    ConfigValidation(String),
    /// No record in the batch carries a required field. A value that is null
    /// or absent in some records only is data, not this.
    MissingColumn { field: String },
    /// Batch input is not a list of record objects.
    Input(String),
    /// IO error (file read, etc.).
    Io(String),
}

impl StrataError {
    /// True for errors detected before any record is processed.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::ConfigParse(_) | Self::ConfigValidation(_))
    }

    /// True for errors caused by the shape of the batch itself.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::MissingColumn { .. } | Self::Input(_))
    }
}

impl fmt::Display for StrataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::MissingColumn { field } => write!(f, "batch has no '{field}' column"),
            Self::Input(msg) => write!(f, "input error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for StrataError {}

impl From<std::io::Error> for StrataError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
