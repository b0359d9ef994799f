//! Document loading: turns uploaded bytes into page-level text.

use ragscope_core::error::RagError;

/// Supported document formats, detected by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    /// Detect the format from `filename` (case-insensitive).
    pub fn from_filename(filename: &str) -> Result<Self, RagError> {
        let extension = std::path::Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("pdf") => Ok(Self::Pdf),
            Some("txt") => Ok(Self::Text),
            _ => Err(RagError::invalid_input(
                "Only .pdf and .txt files are supported.",
            )),
        }
    }
}

/// One page of text. Plain-text documents have a single page with no number.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub number: Option<u32>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDocument {
    pub filename: String,
    pub kind: DocumentKind,
    pub pages: Vec<Page>,
}

/// Decode `bytes` according to the extension of `filename`.
pub fn load_document(filename: &str, bytes: &[u8]) -> Result<LoadedDocument, RagError> {
    let kind = DocumentKind::from_filename(filename)?;
    let pages = match kind {
        DocumentKind::Text => {
            let text = std::str::from_utf8(bytes)
                .map_err(|_| RagError::invalid_input(format!("{filename} is not valid UTF-8 text")))?;
            vec![Page {
                number: None,
                text: text.to_string(),
            }]
        }
        DocumentKind::Pdf => {
            let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| {
                RagError::invalid_input(format!("Failed to extract PDF text: {e}"))
            })?;
            split_pages(&text)
        }
    };
    Ok(LoadedDocument {
        filename: filename.to_string(),
        kind,
        pages,
    })
}

/// Split extracted PDF text on form feeds, numbering pages from zero.
fn split_pages(text: &str) -> Vec<Page> {
    text.split('\x0c')
        .enumerate()
        .map(|(i, page)| Page {
            number: Some(i as u32),
            text: page.to_string(),
        })
        .collect()
}
