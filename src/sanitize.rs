/// Input sanitisation for user-supplied text
///
/// Names and filenames end up in JSON rendered by a browser client, so markup
/// is stripped before anything is stored.
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
    static ref JS_SCHEME: Regex = Regex::new(r"(?i)javascript:").unwrap();
    static ref EVENT_HANDLER: Regex = Regex::new(r"(?i)on\w+=").unwrap();
    static ref FILENAME_UNSAFE: Regex = Regex::new(r"[^a-zA-Z0-9\s\-_.()]").unwrap();
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
    static ref EMAIL: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
}

/// Strip tags and escape HTML-significant characters
pub fn sanitize_string(input: &str) -> String {
    let without_tags = TAG.replace_all(input, "");
    let escaped = without_tags
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#039;");
    let escaped = JS_SCHEME.replace_all(&escaped, "");
    let escaped = EVENT_HANDLER.replace_all(&escaped, "");
    escaped.trim().to_string()
}

/// Reduce a filename to a safe display form; never returns an empty string
pub fn sanitize_filename(filename: &str) -> String {
    let cleaned = filename.replace("..", "").replace(['/', '\\', '\0'], "");
    let cleaned = TAG.replace_all(&cleaned, "");
    let cleaned = FILENAME_UNSAFE.replace_all(&cleaned, "");
    let cleaned = WHITESPACE_RUN.replace_all(&cleaned, " ");
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Whether the address matches as given, without trimming
pub fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

/// Lowercase and validate an email address
pub fn sanitize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_lowercase();
    EMAIL.is_match(&normalized).then_some(normalized)
}

/// Filename without its final extension
pub fn strip_extension(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => &filename[..idx],
        _ => filename,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_string_strips_markup() {
        assert_eq!(sanitize_string("  <b>Asha</b> Rao "), "Asha Rao");
        assert_eq!(sanitize_string("Tom & Jerry"), "Tom &amp; Jerry");
        assert_eq!(sanitize_string("javascript:alert(1)"), "alert(1)");
        assert_eq!(sanitize_string("x onclick=y"), "x y");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_filename("my   report (v2).pdf"), "my report (v2).pdf");
        assert_eq!(sanitize_filename("<script>"), "untitled");
        assert_eq!(sanitize_filename("résumé.pdf"), "rsum.pdf");
        assert_eq!(sanitize_filename(""), "untitled");
    }

    #[test]
    fn test_sanitize_email() {
        assert_eq!(
            sanitize_email("  Asha.Rao@Example.COM "),
            Some("asha.rao@example.com".to_string())
        );
        assert_eq!(sanitize_email("not-an-email"), None);
        assert_eq!(sanitize_email("a@b.c"), None);
    }

    #[test]
    fn test_is_valid_email_is_strict() {
        assert!(is_valid_email("Asha.Rao@Example.COM"));
        assert!(!is_valid_email(" asha@example.com"));
        assert!(!is_valid_email("asha@example.com\n"));
    }

    #[test]
    fn test_strip_extension() {
        assert_eq!(strip_extension("passport.scan.pdf"), "passport.scan");
        assert_eq!(strip_extension("README"), "README");
        assert_eq!(strip_extension(".env"), ".env");
    }
}
