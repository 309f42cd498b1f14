pub mod affiliate;
pub mod config;
pub mod dedup;
pub mod error;
pub mod identifiers;
pub mod models;
pub mod normalize;
pub mod output;
pub mod validate;

pub use affiliate::AffiliateLinker;
pub use config::AppConfig;
pub use dedup::{DUPLICATE_THRESHOLD, Deduplicator, Titled};
pub use error::{CoreError, Result};
pub use identifiers::{Isbn, is_valid_isbn_shape};
pub use models::*;
pub use normalize::{clean_text, extract_file_size, extract_isbn, extract_year, normalize_record};
pub use validate::validate;
