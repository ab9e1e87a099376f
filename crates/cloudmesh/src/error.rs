//! Error types for reconstruction and batch operations with rich diagnostics.
//!
//! Every error carries:
//! - A machine-readable code for programmatic handling
//! - Context naming the file, vertex or parameter involved
//! - A recovery suggestion
//! - Terminal rendering via miette
//!
//! # Error Codes
//!
//! Codes have the form `CM-XXXX`:
//! - `CM-1xxx`: I/O errors (reading, writing, parsing)
//! - `CM-2xxx`: Validation errors (empty candidates, bad indices, bad coordinates)
//! - `CM-3xxx`: Reconstruction errors
//! - `CM-4xxx`: Format errors (unsupported extension, wrong array shape)
//! - `CM-5xxx`: Configuration and directory-structure errors
//!
//! Codes below 5000 are scoped to a single file: the batch runner records
//! them and moves on. `CM-5xxx` errors abort a batch before any file is
//! touched (see [`MeshError::is_batch_fatal`]).
//!
//! # Example
//!
//! ```
//! use cloudmesh::{ErrorCode, MeshError};
//!
//! let err = MeshError::format("scan.npy", 2);
//! assert_eq!(err.code(), ErrorCode::TooFewColumns);
//! assert!(err.to_string().contains("2 columns"));
//! ```

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cloudmesh operations.
pub type MeshResult<T> = Result<T, MeshError>;

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // I/O errors (1xxx)
    /// CM-1001: Failed to read file
    IoRead = 1001,
    /// CM-1002: Failed to write file
    IoWrite = 1002,
    /// CM-1003: Failed to parse file contents
    ParseError = 1003,

    // Validation errors (2xxx)
    /// CM-2001: Face references invalid vertex index
    InvalidVertexIndex = 2001,
    /// CM-2002: Vertex has NaN or Infinity coordinate
    InvalidCoordinate = 2002,
    /// CM-2003: Mesh has no vertices or faces
    EmptyMesh = 2003,

    // Reconstruction errors (3xxx)
    /// CM-3001: Reconstruction strategy could not produce a surface
    ReconstructionFailed = 3001,
    /// CM-3002: A geometry stage panicked
    StagePanicked = 3002,

    // Format errors (4xxx)
    /// CM-4001: Unsupported file format
    UnsupportedFormat = 4001,
    /// CM-4002: Point sample has fewer than three columns
    TooFewColumns = 4002,
    /// CM-4003: Point sample is not a 2-D array
    BadDimensions = 4003,

    // Batch-level errors (5xxx)
    /// CM-5001: Invalid configuration
    Configuration = 5001,
    /// CM-5002: Input or output directory unusable
    Structural = 5002,
}

impl ErrorCode {
    /// Returns the error code as a string in the format `CM-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::IoRead => "CM-1001",
            ErrorCode::IoWrite => "CM-1002",
            ErrorCode::ParseError => "CM-1003",
            ErrorCode::InvalidVertexIndex => "CM-2001",
            ErrorCode::InvalidCoordinate => "CM-2002",
            ErrorCode::EmptyMesh => "CM-2003",
            ErrorCode::ReconstructionFailed => "CM-3001",
            ErrorCode::StagePanicked => "CM-3002",
            ErrorCode::UnsupportedFormat => "CM-4001",
            ErrorCode::TooFewColumns => "CM-4002",
            ErrorCode::BadDimensions => "CM-4003",
            ErrorCode::Configuration => "CM-5001",
            ErrorCode::Structural => "CM-5002",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl serde::Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Recovery suggestions for errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Regenerate the input file with different settings.
    RegenerateInput { hint: String },
    /// Use a different file format.
    UseDifferentFormat { suggested: Vec<String> },
    /// Check the input for specific problems.
    CheckInput { checks: Vec<String> },
    /// Adjust parameters for the operation.
    AdjustParameters { parameters: Vec<(String, String)> },
    /// No automatic recovery available.
    None,
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoverySuggestion::RegenerateInput { hint } => {
                write!(f, "Regenerate the input: {}", hint)
            }
            RecoverySuggestion::UseDifferentFormat { suggested } => {
                write!(f, "Try using a different format: {}", suggested.join(", "))
            }
            RecoverySuggestion::CheckInput { checks } => {
                write!(f, "Check the input for: {}", checks.join(", "))
            }
            RecoverySuggestion::AdjustParameters { parameters } => {
                let params: Vec<String> = parameters
                    .iter()
                    .map(|(k, v)| format!("{} = {}", k, v))
                    .collect();
                write!(f, "Try adjusting: {}", params.join(", "))
            }
            RecoverySuggestion::None => {
                write!(f, "No automatic recovery available")
            }
        }
    }
}

/// Location information for errors.
#[derive(Debug, Clone)]
pub enum ErrorLocation {
    /// Error at a specific vertex.
    Vertex { index: usize },
    /// Error at a specific face.
    Face { index: usize },
    /// Error in a file.
    File { path: PathBuf },
}

impl std::fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorLocation::Vertex { index } => write!(f, "vertex {}", index),
            ErrorLocation::Face { index } => write!(f, "face {}", index),
            ErrorLocation::File { path } => write!(f, "{}", path.display()),
        }
    }
}

/// Errors produced while loading, reconstructing, validating or writing.
#[derive(Debug, Error, Diagnostic)]
pub enum MeshError {
    /// Error reading from a file or directory.
    #[error("failed to read {path}")]
    #[diagnostic(
        code(cloudmesh::io::read),
        help("Check that the file exists and is readable. Try: ls -la {}", path.display())
    )]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error writing to a file.
    #[error("failed to write {path}")]
    #[diagnostic(
        code(cloudmesh::io::write),
        help("Check that the output directory exists and is writable")
    )]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File contents could not be decoded.
    #[error("failed to parse {path}: {details}")]
    #[diagnostic(
        code(cloudmesh::parse::error),
        help("The file may be truncated or written by an incompatible tool.")
    )]
    ParseError { path: PathBuf, details: String },

    /// Point sample has fewer than three columns.
    #[error("point sample {path} has {columns} columns, at least 3 (x, y, z) are required")]
    #[diagnostic(
        code(cloudmesh::format::columns),
        help("Each row must hold x, y, z and optionally nx, ny, nz.")
    )]
    Format { path: PathBuf, columns: usize },

    /// Point sample is not a 2-D array.
    #[error("point sample {path} has {ndim} dimensions, expected a 2-D array")]
    #[diagnostic(
        code(cloudmesh::format::dimensions),
        help("Save the sample as an (N, 3) or (N, 6) array.")
    )]
    Dimensions { path: PathBuf, ndim: usize },

    /// Unsupported file format.
    #[error("unsupported mesh format: {extension:?}")]
    #[diagnostic(
        code(cloudmesh::format::unsupported),
        help("Supported mesh formats: STL, OBJ, PLY")
    )]
    UnsupportedFormat { extension: Option<String> },

    /// Candidate mesh has no vertices or no faces.
    #[error("mesh is empty: {details}")]
    #[diagnostic(
        code(cloudmesh::validation::empty),
        help("The strategy produced no surface. Try a larger radius or a different method.")
    )]
    EmptyMesh { details: String },

    /// Invalid vertex index in face data.
    #[error(
        "invalid vertex index: face {face_index} references vertex {vertex_index}, but mesh only has {vertex_count} vertices"
    )]
    #[diagnostic(code(cloudmesh::validation::vertex_index))]
    InvalidVertexIndex {
        face_index: usize,
        vertex_index: u32,
        vertex_count: usize,
    },

    /// Invalid coordinate value (NaN or Infinity).
    #[error("invalid coordinate at vertex {vertex_index}: {coordinate} is {value}")]
    #[diagnostic(
        code(cloudmesh::validation::coordinate),
        help("Check the point sample for NaN or infinite values.")
    )]
    InvalidCoordinate {
        vertex_index: usize,
        coordinate: &'static str,
        value: f64,
    },

    /// The reconstruction strategy failed.
    #[error("{method} reconstruction failed: {details}")]
    #[diagnostic(code(cloudmesh::reconstruct::failed))]
    Reconstruction {
        method: &'static str,
        details: String,
    },

    /// A geometry stage panicked and was contained.
    #[error("{stage} stage panicked: {details}")]
    #[diagnostic(
        code(cloudmesh::reconstruct::panic),
        help("This usually points at degenerate input such as many coincident points.")
    )]
    StagePanicked { stage: String, details: String },

    /// Invalid configuration.
    #[error("invalid configuration: {details}")]
    #[diagnostic(
        code(cloudmesh::config::invalid),
        help("Valid methods: ball_pivoting, alpha_shape, poisson. Radius and scale must be positive.")
    )]
    Configuration { details: String },

    /// A required directory is missing or unusable.
    #[error("directory error at {path}: {details}")]
    #[diagnostic(code(cloudmesh::structure::directory))]
    Structural { path: PathBuf, details: String },
}

impl MeshError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            MeshError::IoRead { .. } => ErrorCode::IoRead,
            MeshError::IoWrite { .. } => ErrorCode::IoWrite,
            MeshError::ParseError { .. } => ErrorCode::ParseError,
            MeshError::Format { .. } => ErrorCode::TooFewColumns,
            MeshError::Dimensions { .. } => ErrorCode::BadDimensions,
            MeshError::UnsupportedFormat { .. } => ErrorCode::UnsupportedFormat,
            MeshError::EmptyMesh { .. } => ErrorCode::EmptyMesh,
            MeshError::InvalidVertexIndex { .. } => ErrorCode::InvalidVertexIndex,
            MeshError::InvalidCoordinate { .. } => ErrorCode::InvalidCoordinate,
            MeshError::Reconstruction { .. } => ErrorCode::ReconstructionFailed,
            MeshError::StagePanicked { .. } => ErrorCode::StagePanicked,
            MeshError::Configuration { .. } => ErrorCode::Configuration,
            MeshError::Structural { .. } => ErrorCode::Structural,
        }
    }

    /// True for errors that abort a whole batch rather than a single file.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            MeshError::Configuration { .. } | MeshError::Structural { .. }
        )
    }

    /// Returns a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            MeshError::IoRead { .. } => RecoverySuggestion::CheckInput {
                checks: vec!["file exists".into(), "file permissions".into()],
            },
            MeshError::IoWrite { .. } => RecoverySuggestion::CheckInput {
                checks: vec!["directory exists".into(), "write permissions".into()],
            },
            MeshError::ParseError { .. } => RecoverySuggestion::RegenerateInput {
                hint: "write the array with numpy.save".into(),
            },
            MeshError::Format { .. } | MeshError::Dimensions { .. } => {
                RecoverySuggestion::RegenerateInput {
                    hint: "store one point per row as x, y, z[, nx, ny, nz]".into(),
                }
            }
            MeshError::UnsupportedFormat { .. } => RecoverySuggestion::UseDifferentFormat {
                suggested: vec!["STL".into(), "OBJ".into(), "PLY".into()],
            },
            MeshError::EmptyMesh { .. } | MeshError::Reconstruction { .. } => {
                RecoverySuggestion::AdjustParameters {
                    parameters: vec![
                        ("radius".into(), "try a larger value".into()),
                        ("method".into(), "try poisson".into()),
                    ],
                }
            }
            MeshError::InvalidVertexIndex { .. } | MeshError::StagePanicked { .. } => {
                RecoverySuggestion::None
            }
            MeshError::InvalidCoordinate { .. } => RecoverySuggestion::CheckInput {
                checks: vec!["NaN values".into(), "infinite values".into()],
            },
            MeshError::Configuration { .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![
                    ("method".into(), "ball_pivoting | alpha_shape | poisson".into()),
                    ("radius".into(), "> 0".into()),
                ],
            },
            MeshError::Structural { .. } => RecoverySuggestion::CheckInput {
                checks: vec!["directory exists".into(), "directory permissions".into()],
            },
        }
    }

    /// Returns location information if available.
    pub fn location(&self) -> Option<ErrorLocation> {
        match self {
            MeshError::InvalidVertexIndex { face_index, .. } => {
                Some(ErrorLocation::Face { index: *face_index })
            }
            MeshError::InvalidCoordinate { vertex_index, .. } => Some(ErrorLocation::Vertex {
                index: *vertex_index,
            }),
            MeshError::IoRead { path, .. }
            | MeshError::IoWrite { path, .. }
            | MeshError::ParseError { path, .. }
            | MeshError::Format { path, .. }
            | MeshError::Dimensions { path, .. }
            | MeshError::Structural { path, .. } => {
                Some(ErrorLocation::File { path: path.clone() })
            }
            _ => None,
        }
    }

    // Constructor helpers for common error patterns

    /// Create an IoRead error.
    pub fn io_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MeshError::IoRead {
            path: path.into(),
            source,
        }
    }

    /// Create an IoWrite error.
    pub fn io_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MeshError::IoWrite {
            path: path.into(),
            source,
        }
    }

    /// Create a ParseError.
    pub fn parse_error(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        MeshError::ParseError {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Create a column-count Format error.
    pub fn format(path: impl Into<PathBuf>, columns: usize) -> Self {
        MeshError::Format {
            path: path.into(),
            columns,
        }
    }

    /// Create an InvalidVertexIndex error.
    pub fn invalid_vertex_index(face_index: usize, vertex_index: u32, vertex_count: usize) -> Self {
        MeshError::InvalidVertexIndex {
            face_index,
            vertex_index,
            vertex_count,
        }
    }

    /// Create an InvalidCoordinate error.
    pub fn invalid_coordinate(vertex_index: usize, coordinate: &'static str, value: f64) -> Self {
        MeshError::InvalidCoordinate {
            vertex_index,
            coordinate,
            value,
        }
    }

    /// Create an EmptyMesh error.
    pub fn empty_mesh(details: impl Into<String>) -> Self {
        MeshError::EmptyMesh {
            details: details.into(),
        }
    }

    /// Create a Reconstruction error.
    pub fn reconstruction(method: &'static str, details: impl Into<String>) -> Self {
        MeshError::Reconstruction {
            method,
            details: details.into(),
        }
    }

    /// Create a StagePanicked error.
    pub fn stage_panicked(stage: impl Into<String>, details: impl Into<String>) -> Self {
        MeshError::StagePanicked {
            stage: stage.into(),
            details: details.into(),
        }
    }

    /// Message including every underlying cause, for one-line reports.
    pub fn full_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }

    /// Create a Configuration error.
    pub fn configuration(details: impl Into<String>) -> Self {
        MeshError::Configuration {
            details: details.into(),
        }
    }

    /// Create a Structural error.
    pub fn structural(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        MeshError::Structural {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Create an UnsupportedFormat error.
    pub fn unsupported_format(extension: Option<String>) -> Self {
        MeshError::UnsupportedFormat { extension }
    }
}
