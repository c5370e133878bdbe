pub mod tsm1;

/// TSM_FILE_EXTENSION is the extension used for TSM files.
pub const TSM_FILE_EXTENSION: &str = "tsm";

/// TOMBSTONE_FILE_EXTENSION is the extension used for tombstone files that
/// record deletions against a sibling TSM file.
pub const TOMBSTONE_FILE_EXTENSION: &str = "tombstone";
