//! Document symbols from outline entries.

use tower_lsp::lsp_types::DocumentSymbol;

use crate::features::OutlineEntry;

#[allow(deprecated)]
pub fn document_symbol(entry: OutlineEntry) -> DocumentSymbol {
    DocumentSymbol {
        name: entry.name,
        detail: None,
        kind: entry.kind,
        tags: None,
        deprecated: None,
        range: entry.range,
        selection_range: entry.selection_range,
        children: match entry.children.is_empty() {
            true => None,
            false => Some(entry.children.into_iter().map(document_symbol).collect()),
        },
    }
}

#[cfg(test)]
mod tests {
    use tower_lsp::lsp_types::{Position, Range, SymbolKind};

    use super::*;

    #[test]
    fn children_are_kept() {
        let range = Range::new(Position::new(0, 0), Position::new(2, 1));
        let entry = OutlineEntry {
            name: ".a".into(),
            kind: SymbolKind::CLASS,
            range,
            selection_range: range,
            children: vec![OutlineEntry {
                name: "@x".into(),
                kind: SymbolKind::VARIABLE,
                range,
                selection_range: range,
                children: Vec::new(),
            }],
        };
        let symbol = document_symbol(entry);
        let children = symbol.children.unwrap();
        assert_eq!(children[0].name, "@x");
        assert!(children[0].children.is_none());
    }
}
