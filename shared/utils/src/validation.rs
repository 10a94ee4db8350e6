use crate::error::{StudyError, StudyResult};
use validator::{Validate, ValidationErrors};

pub fn validate_model<T: Validate>(model: &T) -> StudyResult<()> {
    match model.validate() {
        Ok(()) => Ok(()),
        Err(errors) => {
            let error_messages = format_validation_errors(&errors);
            Err(StudyError::validation("model", error_messages))
        }
    }
}

pub fn format_validation_errors(errors: &ValidationErrors) -> String {
    let mut messages = Vec::new();

    for (field, field_errors) in errors.field_errors() {
        for error in field_errors {
            let message = match (&error.message, error.code.as_ref()) {
                (Some(message), _) => message.to_string(),
                (None, "length") => format!("Length validation failed for field '{}'", field),
                (None, "range") => format!("Value out of range for field '{}'", field),
                (None, "required") => format!("Field '{}' is required", field),
                (None, code) => format!("Validation failed for field '{}': {}", field, code),
            };
            messages.push(message);
        }
    }

    messages.sort();
    messages.join(", ")
}

/// Checks a 1-based page number against the page count of a document.
pub fn validate_page_number(page: i64, page_count: usize) -> StudyResult<usize> {
    if page < 1 || page as u64 > page_count as u64 {
        return Err(StudyError::out_of_range(page, page_count));
    }
    Ok(page as usize)
}

pub fn validate_phrase_text(text: &str) -> StudyResult<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(StudyError::validation(
            "text",
            "Highlight text must not be empty",
        ));
    }
    Ok(trimmed)
}

pub fn validate_file_type<'a>(file_name: &'a str, allowed_types: &[String]) -> StudyResult<&'a str> {
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("");

    if !allowed_types
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(extension))
    {
        return Err(StudyError::validation(
            "file_type",
            format!(
                "File type '{}' not allowed. Allowed types: {}",
                extension,
                allowed_types.join(", ")
            ),
        ));
    }

    Ok(extension)
}

pub fn validate_file_size(file_size: u64, max_size: u64) -> StudyResult<()> {
    if file_size == 0 {
        return Err(StudyError::validation("file_size", "Uploaded file is empty"));
    }
    if file_size > max_size {
        return Err(StudyError::validation(
            "file_size",
            format!(
                "File size {} bytes exceeds maximum allowed size {} bytes",
                file_size, max_size
            ),
        ));
    }

    Ok(())
}

pub fn validate_uuid(uuid_str: &str) -> StudyResult<uuid::Uuid> {
    uuid::Uuid::parse_str(uuid_str).map_err(|_| StudyError::validation("uuid", "Invalid UUID format"))
}

/// Content type for an upload, from the declared type or the extension.
pub fn content_type_for(file_name: &str, declared: Option<&str>) -> String {
    if let Some(declared) = declared.filter(|d| !d.is_empty() && *d != "application/octet-stream") {
        return declared.to_string();
    }
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();
    match extension.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use studylens_models::HighlightPhrase;

    fn allowed() -> Vec<String> {
        vec!["pdf".to_string(), "png".to_string()]
    }

    #[test]
    fn test_validate_page_number() {
        assert_eq!(validate_page_number(1, 3).unwrap(), 1);
        assert_eq!(validate_page_number(3, 3).unwrap(), 3);
        assert_eq!(
            validate_page_number(0, 3).unwrap_err(),
            StudyError::out_of_range(0, 3)
        );
        assert_eq!(
            validate_page_number(4, 3).unwrap_err(),
            StudyError::out_of_range(4, 3)
        );
        assert!(validate_page_number(-2, 3).is_err());
        assert!(validate_page_number(1, 0).is_err());
    }

    #[test]
    fn test_out_of_range_message_names_page_count() {
        let error = validate_page_number(9, 4).unwrap_err();
        assert_eq!(error.to_string(), "Page 9 is out of range, document has 4 pages");
        assert_eq!(error.error_code(), "PAGE_OUT_OF_RANGE");
    }

    #[test]
    fn test_validate_phrase_text() {
        assert_eq!(validate_phrase_text("  cell  ").unwrap(), "cell");
        assert!(validate_phrase_text(" \n ").is_err());
    }

    #[test]
    fn test_validate_file_type() {
        assert_eq!(validate_file_type("notes.PDF", &allowed()).unwrap(), "PDF");
        assert!(validate_file_type("notes.docx", &allowed()).is_err());
        assert!(validate_file_type("no_extension", &allowed()).is_err());
    }

    #[test]
    fn test_validate_file_size() {
        assert!(validate_file_size(10, 100).is_ok());
        assert!(validate_file_size(0, 100).is_err());
        assert!(validate_file_size(101, 100).is_err());
    }

    #[test]
    fn test_validate_model_reports_custom_message() {
        let phrase = HighlightPhrase::new("", Default::default());
        let error = validate_model(&phrase).unwrap_err();
        assert!(error.to_string().contains("between 1 and 2000"));
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("a.pdf", None), "application/pdf");
        assert_eq!(content_type_for("a.JPG", Some("application/octet-stream")), "image/jpeg");
        assert_eq!(content_type_for("a.bin", Some("image/png")), "image/png");
    }
}
