//! Combining hovers from several providers into one response.

use tower_lsp::lsp_types::{Hover, HoverContents, MarkedString, MarkupContent, MarkupKind, Range};

fn markdown(contents: HoverContents) -> String {
    fn marked(marked: MarkedString) -> String {
        match marked {
            MarkedString::String(s) => s,
            MarkedString::LanguageString(s) => format!("```{}\n{}\n```", s.language, s.value),
        }
    }

    match contents {
        HoverContents::Scalar(s) => marked(s),
        HoverContents::Array(items) => items
            .into_iter()
            .map(marked)
            .collect::<Vec<_>>()
            .join("\n\n"),
        HoverContents::Markup(markup) => markup.value,
    }
}

/// One hover holding every provider's content in order, separated by rules.
/// The range is the first provider's.
pub fn merge_hovers(hovers: Vec<Hover>) -> Option<Hover> {
    let range: Option<Range> = hovers.first()?.range;
    let value = hovers
        .into_iter()
        .map(|hover| markdown(hover.contents))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");
    Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value,
        }),
        range,
    })
}
