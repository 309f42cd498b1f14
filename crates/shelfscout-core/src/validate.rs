use crate::identifiers::is_valid_isbn_shape;
use crate::models::CanonicalBook;

/// Human-readable problems with a record. Never fatal: callers log or
/// report them and keep the record.
pub fn validate(book: &CanonicalBook) -> Vec<String> {
    let mut issues = Vec::new();

    if book.title.trim().is_empty() {
        issues.push("Missing title".to_string());
    }
    if book.author.trim().is_empty() {
        issues.push("Missing author".to_string());
    }
    if book.download_url.is_empty() && book.local_file_path.is_empty() {
        issues.push("No download URL or local file path".to_string());
    }
    if !book.isbn.is_empty() && !is_valid_isbn_shape(&book.isbn) {
        issues.push("Invalid ISBN format".to_string());
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;

    #[test]
    fn complete_record_has_no_issues() {
        let mut book = CanonicalBook::new("Dune", SourceKind::LibGen);
        book.author = "Frank Herbert".into();
        book.isbn = "9780441013593".into();
        book.download_url = "https://libgen.is/get.php?md5=abc".into();
        assert!(validate(&book).is_empty());
    }

    #[test]
    fn reports_every_problem() {
        let mut book = CanonicalBook::new(" ", SourceKind::OpenLibrary);
        book.isbn = "12345".into();
        assert_eq!(
            validate(&book),
            vec![
                "Missing title",
                "Missing author",
                "No download URL or local file path",
                "Invalid ISBN format",
            ]
        );
    }

    #[test]
    fn local_file_counts_as_available() {
        let mut book = CanonicalBook::new("Dune", SourceKind::LibGen);
        book.author = "Frank Herbert".into();
        book.local_file_path = "output/books/dune-frank-herbert.pdf".into();
        assert!(validate(&book).is_empty());
    }
}
