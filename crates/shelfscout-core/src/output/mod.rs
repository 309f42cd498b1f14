//! Files written for each search: per-book JSON, a search envelope, a CSV
//! table, HTML pages and a sitemap.

pub mod csv_table;
pub mod html;
pub mod json;

pub use csv_table::{CsvRow, save_books_csv};
pub use html::HtmlPublisher;
pub use json::{SearchResults, list_book_json, load_book_json, save_book_json, save_search_results};
