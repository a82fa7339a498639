//! LSP protocol conversions.
//!
//! This module turns aggregated provider results into LSP responses:
//! - Semantic tokens from cached line tokens
//! - Hover merging, completion responses and document symbols

mod completion;
mod hover;
mod semantic_tokens;
mod symbols;

pub use completion::completion_response;
pub use hover::merge_hovers;
pub use semantic_tokens::{classify, legend, token_types, tokens_for_lines};
pub use symbols::document_symbol;
