//! Completion responses from merged suggestions.

use tower_lsp::lsp_types::{CompletionList, CompletionResponse};

use crate::features::SuggestResult;

/// `None` when nothing was suggested and more typing will not help.
pub fn completion_response(result: SuggestResult) -> Option<CompletionResponse> {
    if result.items.is_empty() && !result.incomplete {
        return None;
    }
    match result.incomplete {
        true => Some(CompletionResponse::List(CompletionList {
            is_incomplete: true,
            items: result.items,
        })),
        false => Some(CompletionResponse::Array(result.items)),
    }
}

#[cfg(test)]
mod tests {
    use tower_lsp::lsp_types::CompletionItem;

    use super::*;

    #[test]
    fn incomplete_results_become_lists() {
        let result = SuggestResult {
            items: vec![CompletionItem::new_simple("a".into(), "detail".into())],
            incomplete: true,
        };
        assert!(matches!(
            completion_response(result),
            Some(CompletionResponse::List(CompletionList { is_incomplete: true, .. }))
        ));
    }

    #[test]
    fn empty_results_are_none() {
        assert!(completion_response(SuggestResult::default()).is_none());
        let result = SuggestResult {
            items: vec![CompletionItem::new_simple("a".into(), "b".into())],
            incomplete: false,
        };
        assert!(matches!(completion_response(result), Some(CompletionResponse::Array(items)) if items.len() == 1));
    }
}
