use std::path::Path;

use regex::Regex;

use crate::error::FieldError;
use crate::parser::word_count;

pub const TASK_NAME_MIN: usize = 3;
pub const TEXT_MAX: usize = 255;
pub const DESCRIPTION_MIN_WORDS: usize = 4;
pub const PERSON_NAME_MIN: usize = 2;
pub const AVATAR_MAX_BYTES: u64 = 600 * 1024;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg"];

pub fn task_name(name: &str) -> Result<(), FieldError> {
    let len = name.trim().chars().count();
    if len == 0 {
        Err(FieldError::new("name", "required"))
    } else if len < TASK_NAME_MIN {
        Err(FieldError::new(
            "name",
            format!("at least {TASK_NAME_MIN} characters"),
        ))
    } else if len > TEXT_MAX {
        Err(FieldError::new("name", format!("at most {TEXT_MAX} characters")))
    } else {
        Ok(())
    }
}

/// Empty descriptions are allowed.
pub fn description(text: &str) -> Result<(), FieldError> {
    if text.trim().is_empty() {
        return Ok(());
    }
    if word_count(text) < DESCRIPTION_MIN_WORDS {
        Err(FieldError::new(
            "description",
            format!("at least {DESCRIPTION_MIN_WORDS} words"),
        ))
    } else if text.chars().count() > TEXT_MAX {
        Err(FieldError::new(
            "description",
            format!("at most {TEXT_MAX} characters"),
        ))
    } else {
        Ok(())
    }
}

pub fn comment_text(text: &str) -> Result<(), FieldError> {
    if text.trim().is_empty() {
        Err(FieldError::new("comment", "cannot be empty"))
    } else {
        Ok(())
    }
}

/// Employee name or surname: Latin or Georgian letters only.
pub fn person_name(field: &'static str, value: &str) -> Result<(), FieldError> {
    let letters_re = Regex::new(r"^[a-zA-Zა-ჰ]+$").unwrap();
    let len = value.chars().count();

    if len < PERSON_NAME_MIN {
        Err(FieldError::new(
            field,
            format!("at least {PERSON_NAME_MIN} characters"),
        ))
    } else if len > TEXT_MAX {
        Err(FieldError::new(field, format!("at most {TEXT_MAX} characters")))
    } else if !letters_re.is_match(value) {
        Err(FieldError::new(field, "only Latin or Georgian letters"))
    } else {
        Ok(())
    }
}

pub fn avatar(path: &Path, size: u64) -> Result<(), FieldError> {
    let is_image = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false);

    if !is_image {
        Err(FieldError::new("avatar", "must be an image"))
    } else if size > AVATAR_MAX_BYTES {
        Err(FieldError::new("avatar", "at most 600kb"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_name_bounds() {
        assert_eq!(task_name("  ").unwrap_err().message, "required");
        assert!(task_name("ab").is_err());
        assert!(task_name("abc").is_ok());
        assert!(task_name(&"x".repeat(256)).is_err());
        // Georgian letters count as single characters.
        assert!(task_name("ტესტ").is_ok());
    }

    #[test]
    fn test_description_word_count() {
        assert!(description("").is_ok());
        let err = description("too few words").unwrap_err();
        assert_eq!(err.field, "description");
        assert!(description("now this has four words").is_ok());
        let long = "word ".repeat(60);
        assert!(description(&long).is_err());
    }

    #[test]
    fn test_person_name_letters_only() {
        assert!(person_name("name", "Nino").is_ok());
        assert!(person_name("name", "ნინო").is_ok());
        assert!(person_name("surname", "N").is_err());
        let err = person_name("surname", "O'Neil").unwrap_err();
        assert_eq!(err.field, "surname");
        assert_eq!(err.message, "only Latin or Georgian letters");
    }

    #[test]
    fn test_avatar_rules() {
        assert!(avatar(Path::new("me.PNG"), 10_000).is_ok());
        assert!(avatar(Path::new("me.pdf"), 10_000).is_err());
        assert!(avatar(Path::new("me"), 10_000).is_err());
        assert!(avatar(Path::new("me.jpg"), AVATAR_MAX_BYTES + 1).is_err());
    }

    #[test]
    fn test_comment_text() {
        assert!(comment_text(" \n").is_err());
        assert!(comment_text("on it").is_ok());
    }
}
