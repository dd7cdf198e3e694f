use crate::error::{AppError, AppResult};

/// Trimmed `value`, rejected when shorter than `min` characters.
pub fn min_chars<'a>(field: &str, value: &'a str, min: usize) -> AppResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.chars().count() < min {
        return Err(AppError::Validation(format!(
            "{field} must be at least {min} characters long"
        )));
    }
    Ok(trimmed)
}

pub fn optional_min_chars<'a>(
    field: &str,
    value: Option<&'a str>,
    min: usize,
) -> AppResult<Option<&'a str>> {
    value.map(|v| min_chars(field, v, min)).transpose()
}

/// Query parameters the handler cannot work without.
pub fn required<'a>(field: &str, value: Option<&'a str>) -> AppResult<&'a str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(format!("{field} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_chars_counts_characters_not_bytes() {
        assert_eq!(min_chars("name", "  Ñu ", 2).unwrap(), "Ñu");
        assert!(min_chars("name", " a ", 2).is_err());
    }

    #[test]
    fn required_rejects_blank_values() {
        assert!(required("career", None).is_err());
        assert!(required("career", Some("  ")).is_err());
        assert_eq!(required("career", Some("Sistemas")).unwrap(), "Sistemas");
        assert_eq!(optional_min_chars("title", None, 3).unwrap(), None);
    }
}
