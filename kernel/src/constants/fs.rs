pub const MAX_FILES: usize = 32;
pub const MAX_FILENAME: usize = 63;
pub const MAX_FILE_SIZE: usize = 64 * 1024;
