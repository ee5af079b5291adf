pub mod cleaner;
pub mod harmonize;

pub use cleaner::{clean_dir, platforms_in_dir, product_from_filename, Cleaner, LongRow};
pub use harmonize::{canonical_element, to_store_format};
