use urlencoding::encode;

use crate::config::AffiliateConfig;
use crate::models::CanonicalBook;

const AMAZON_SEARCH: &str = "https://www.amazon.com/s";
const EBAY_SEARCH: &str = "https://www.ebay.com/sch/i.html";
// eBay books category and Partner Network rotation id
const EBAY_BOOKS_CATEGORY: &str = "267";
const EBAY_ROTATION_ID: &str = "711-53200-19255-0";

/// Builds store links for a book from the configured affiliate ids.
#[derive(Debug, Clone, Default)]
pub struct AffiliateLinker {
    amazon_tag: Option<String>,
    ebay_campaign_id: Option<String>,
}

impl AffiliateLinker {
    pub fn new(config: &AffiliateConfig) -> Self {
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());
        Self {
            amazon_tag: non_empty(&config.amazon_tag),
            ebay_campaign_id: non_empty(&config.ebay_campaign_id),
        }
    }

    /// Fill the affiliate link fields in place.
    pub fn enrich(&self, book: &mut CanonicalBook) {
        if !book.isbn.is_empty() {
            if let Some(link) = self.amazon_link(&book.title, &book.author, &book.isbn) {
                book.amazon_link = link;
            }
            book.google_books_link = google_books_link(&book.isbn);
        }
        if let Some(link) = self.ebay_link(&book.title, &book.author) {
            book.ebay_link = link;
        }
    }

    /// Amazon search link; the ISBN is the search term when present.
    pub fn amazon_link(&self, title: &str, author: &str, isbn: &str) -> Option<String> {
        let tag = self.amazon_tag.as_deref()?;
        let term = if isbn.is_empty() {
            search_term(title, author)
        } else {
            isbn.to_string()
        };
        Some(format!(
            "{AMAZON_SEARCH}?k={}&ref=sr_st_relevancerank&tag={}",
            encode(&term),
            encode(tag)
        ))
    }

    pub fn ebay_link(&self, title: &str, author: &str) -> Option<String> {
        let campaign = self.ebay_campaign_id.as_deref()?;
        Some(format!(
            "{EBAY_SEARCH}?_nkw={}&_sacat={EBAY_BOOKS_CATEGORY}&mkcid=1&mkrid={EBAY_ROTATION_ID}&siteid=0&campid={}&customid=&toolid=10001",
            encode(&search_term(title, author)),
            encode(campaign)
        ))
    }

    /// Store name to link, in display order. Empty links are left out.
    pub fn price_comparison_links(&self, book: &CanonicalBook) -> Vec<(&'static str, String)> {
        let mut links = vec![
            ("Amazon", book.amazon_link.clone()),
            ("eBay", book.ebay_link.clone()),
            ("Google Books", book.google_books_link.clone()),
        ];
        if !book.isbn.is_empty() {
            links.push(("Book Depository", book_depository_link(&book.isbn)));
        }
        links.push(("ThriftBooks", thriftbooks_link(&book.title, &book.author)));

        links.retain(|(_, link)| !link.is_empty());
        links
    }
}

fn search_term(title: &str, author: &str) -> String {
    format!("{title} {author}").trim().to_string()
}

pub fn google_books_link(isbn: &str) -> String {
    format!("https://books.google.com/books?isbn={}", encode(isbn))
}

pub fn book_depository_link(isbn: &str) -> String {
    format!("https://www.bookdepository.com/search?searchTerm={}", encode(isbn))
}

pub fn thriftbooks_link(title: &str, author: &str) -> String {
    let term = search_term(title, author);
    if term.is_empty() {
        return String::new();
    }
    format!("https://www.thriftbooks.com/browse/?b.search={}", encode(&term))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;

    fn linker() -> AffiliateLinker {
        AffiliateLinker::new(&AffiliateConfig {
            amazon_tag: Some("shelf-20".into()),
            ebay_campaign_id: Some("5338".into()),
        })
    }

    fn dune() -> CanonicalBook {
        let mut book = CanonicalBook::new("Dune", SourceKind::LibGen);
        book.author = "Frank Herbert".into();
        book
    }

    #[test]
    fn enrich_with_isbn_fills_all_links() {
        let mut book = dune();
        book.isbn = "9780441013593".into();
        linker().enrich(&mut book);

        assert_eq!(
            book.amazon_link,
            "https://www.amazon.com/s?k=9780441013593&ref=sr_st_relevancerank&tag=shelf-20"
        );
        assert!(book.ebay_link.contains("_nkw=Dune%20Frank%20Herbert"));
        assert!(book.ebay_link.contains("campid=5338"));
        assert_eq!(book.google_books_link, "https://books.google.com/books?isbn=9780441013593");
    }

    #[test]
    fn enrich_without_isbn_skips_amazon_and_google() {
        let mut book = dune();
        linker().enrich(&mut book);
        assert!(book.amazon_link.is_empty());
        assert!(book.google_books_link.is_empty());
        assert!(!book.ebay_link.is_empty());
    }

    #[test]
    fn nothing_configured_means_no_store_links() {
        let mut book = dune();
        book.isbn = "9780441013593".into();
        let plain = AffiliateLinker::new(&AffiliateConfig::default());
        plain.enrich(&mut book);
        assert!(book.amazon_link.is_empty());
        assert!(book.ebay_link.is_empty());
        assert_eq!(plain.amazon_link("Dune", "", ""), None);
    }

    #[test]
    fn amazon_falls_back_to_title_and_author() {
        let link = linker().amazon_link("Dune", "Frank Herbert", "").unwrap();
        assert!(link.contains("k=Dune%20Frank%20Herbert"));
    }

    #[test]
    fn price_comparison_keeps_order_and_drops_empty() {
        let mut book = dune();
        book.isbn = "9780441013593".into();
        let linker = linker();
        linker.enrich(&mut book);

        let names: Vec<&str> = linker
            .price_comparison_links(&book)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(
            names,
            vec!["Amazon", "eBay", "Google Books", "Book Depository", "ThriftBooks"]
        );

        let bare = AffiliateLinker::default().price_comparison_links(&dune());
        assert_eq!(bare.len(), 1);
        assert_eq!(bare[0].0, "ThriftBooks");
    }
}
