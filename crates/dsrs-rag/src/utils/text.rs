/// Cuts `value` to at most `max_chars` characters, on a char boundary.
pub fn truncate(value: &str, max_chars: usize) -> &str {
    match value.char_indices().nth(max_chars) {
        Some((cutoff, _)) => &value[..cutoff],
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::truncate;

    #[test]
    fn keeps_short_values() {
        assert_eq!(truncate("Paris", 10), "Paris");
        assert_eq!(truncate("", 3), "");
    }

    #[test]
    fn cuts_on_char_boundaries() {
        assert_eq!(truncate("Zürich canton", 3), "Zür");
        assert_eq!(truncate("«passage»", 1), "«");
    }
}
