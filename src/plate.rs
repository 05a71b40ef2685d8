pub const MIN_PLATE_LEN: usize = 3;

/// Uppercases and drops everything that is not an ASCII letter or digit.
/// This is the only equality rule used when matching plates.
pub fn normalize(plate: &str) -> String {
    plate
        .to_uppercase()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

pub fn is_well_formed(normalized: &str) -> bool {
    normalized.len() >= MIN_PLATE_LEN
}
