pub const MAX_ROOMS: usize = 64;
pub const MAX_ROOM_NAME_LEN: usize = 64;
pub const MAX_DESCRIPTION_LEN: usize = 256;
pub const MAX_OWNER_LEN: usize = 128;

/// Field separator inside encoded keys and values (ASCII unit separator).
pub const FIELD_SEPARATOR: char = '\u{1f}';

/// Longest accepted protocol line, in bytes.
pub const MAX_LINE_LEN: usize = 4096;
