pub mod isbn;

pub use isbn::{Isbn, is_valid_isbn_shape};
