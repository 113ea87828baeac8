//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 2       | Universal        | CLI usage error (bad args, missing file) |
//! | 3-4     | Universal        | I/O and input parse errors               |
//! | 60-69   | strata           | Classification / reconciliation codes    |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into `exit_code_for` or the relevant command

use strata_period::StrataError;

// =============================================================================
// Universal (0, 2-4)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// Cannot read or write a file or directory.
pub const EXIT_IO: u8 = 3;

/// Input batch is not valid JSON/CSV or not a list of records.
pub const EXIT_INPUT: u8 = 4;

// =============================================================================
// Strata (60-69)
// =============================================================================

/// Config failed to parse or validate, or no current period was given.
pub const EXIT_STRATA_INVALID_CONFIG: u8 = 60;

/// No record in the batch carries a required field.
pub const EXIT_STRATA_STRUCTURAL: u8 = 61;

/// Anomalies found and `--fail-on-anomalies` was set.
pub const EXIT_STRATA_ANOMALIES: u8 = 62;

/// Pipeline run failed; details are in the outcome JSON.
pub const EXIT_STRATA_PIPELINE_FAILED: u8 = 63;

/// Map a library error to its exit code.
pub fn exit_code_for(err: &StrataError) -> u8 {
    match err {
        StrataError::ConfigParse(_) | StrataError::ConfigValidation(_) => EXIT_STRATA_INVALID_CONFIG,
        StrataError::MissingColumn { .. } => EXIT_STRATA_STRUCTURAL,
        StrataError::Input(_) => EXIT_INPUT,
        StrataError::Io(_) => EXIT_IO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_USAGE,
            EXIT_IO,
            EXIT_INPUT,
            EXIT_STRATA_INVALID_CONFIG,
            EXIT_STRATA_STRUCTURAL,
            EXIT_STRATA_ANOMALIES,
            EXIT_STRATA_PIPELINE_FAILED,
        ];
        let mut sorted = codes.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len());
    }

    #[test]
    fn error_mapping() {
        assert_eq!(
            exit_code_for(&StrataError::ConfigValidation("x".into())),
            EXIT_STRATA_INVALID_CONFIG
        );
        assert_eq!(
            exit_code_for(&StrataError::MissingColumn { field: "region".into() }),
            EXIT_STRATA_STRUCTURAL
        );
        assert_eq!(exit_code_for(&StrataError::Io("x".into())), EXIT_IO);
    }
}
