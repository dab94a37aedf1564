use crate::error::TabgridError;
use crate::extraction::PageSource;
use crate::geometry::PageInput;
use serde::Deserialize;

/// Page source for primitives produced by an external parser and saved as
/// JSON: either one page object or an array of pages.
pub struct JsonSource;

impl PageSource for JsonSource {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageInput>, TabgridError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| TabgridError::InvalidInput(format!("page JSON is not UTF-8: {e}")))?;
        load_pages_json(text)
    }

    fn backend_name(&self) -> &str {
        "json"
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PagesDoc {
    Many(Vec<PageInput>),
    One(PageInput),
}

/// Parse page primitives from JSON. Pages without numbers are numbered
/// from 1 in document order.
pub fn load_pages_json(json: &str) -> Result<Vec<PageInput>, TabgridError> {
    let mut pages = match serde_json::from_str::<PagesDoc>(json)? {
        PagesDoc::Many(pages) => pages,
        PagesDoc::One(page) => vec![page],
    };

    for page in &pages {
        if !page.width.is_finite() || !page.height.is_finite() || page.width < 0.0 || page.height < 0.0
        {
            return Err(TabgridError::InvalidInput(format!(
                "page {} has invalid size {}x{}",
                page.page_number, page.width, page.height
            )));
        }
    }

    if pages.iter().all(|p| p.page_number == 0) {
        for (i, page) in pages.iter_mut().enumerate() {
            page.page_number = i + 1;
        }
    }
    Ok(pages)
}
