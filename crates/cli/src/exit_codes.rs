//! CLI Exit Code Registry
//!
//! Single source of truth for every exit code `feedmatch` returns.
//! Scripts rely on them, so codes are never renumbered.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain    | Description                                  |
//! |---------|-----------|----------------------------------------------|
//! | 0       | Universal | Success                                      |
//! | 1       | Universal | General error (unspecified)                  |
//! | 2       | Universal | CLI usage error (reported by argument parser)|
//! | 3-9     | io        | Input/output files                           |
//! | 10-19   | recon     | Configuration and data errors from the engine|

use feedmatch_recon::ReconError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

// =============================================================================
// IO (3-9)
// =============================================================================

/// An input file (feed, catalog, config) could not be opened or read,
/// or has no header line.
pub const EXIT_IO_READ: u8 = 3;

/// Output could not be written.
pub const EXIT_IO_WRITE: u8 = 4;

// =============================================================================
// Recon (10-19)
// =============================================================================

/// Config file does not parse or fails validation.
pub const EXIT_RECON_INVALID_CONFIG: u8 = 10;

/// A configured column is absent from a dataset's header.
pub const EXIT_RECON_MISSING_COLUMN: u8 = 11;

/// A value could not be interpreted: non-integer internal id, or a date
/// no configured format accepts.
pub const EXIT_RECON_BAD_VALUE: u8 = 12;

/// Map an engine error to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_RECON_INVALID_CONFIG,
        ReconError::MissingColumn { .. } => EXIT_RECON_MISSING_COLUMN,
        ReconError::IdParse { .. } | ReconError::DateParse { .. } => EXIT_RECON_BAD_VALUE,
        ReconError::Io(_) => EXIT_IO_READ,
        // Recovered inside the engine; never surfaces from a run.
        ReconError::RowParse { .. } => EXIT_ERROR,
    }
}
