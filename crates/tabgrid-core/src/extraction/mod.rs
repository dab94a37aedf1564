pub mod json;
pub mod pdftotext;

use crate::error::TabgridError;
use crate::geometry::PageInput;

pub use json::{load_pages_json, JsonSource};
pub use pdftotext::PdftotextSource;

/// Trait for page-parser backends that turn a document into positioned
/// primitives.
pub trait PageSource: Send + Sync {
    /// Extract the primitives of every page, in page order.
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageInput>, TabgridError>;

    /// Name of this backend (for diagnostics).
    fn backend_name(&self) -> &str;
}
