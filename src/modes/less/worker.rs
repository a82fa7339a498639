//! LESS analysis. Runs on the worker pool, never on the request task.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use regex::Regex;

use crate::settings::{LessOptions, LintSeverity};

const AT_RULES: &[&str] = &[
    "import", "media", "charset", "font-face", "keyframes", "supports", "page", "namespace",
    "plugin", "document",
];

const PROPERTIES: &[&str] = &[
    "background", "background-color", "border", "border-radius", "bottom", "color", "cursor",
    "display", "flex", "float", "font", "font-family", "font-size", "font-weight", "height",
    "left", "line-height", "margin", "opacity", "overflow", "padding", "position", "right",
    "text-align", "top", "transition", "width", "z-index",
];

const VALUES: &[&str] = &[
    "absolute", "auto", "block", "bold", "center", "fixed", "flex", "grid", "hidden", "inherit",
    "initial", "inline", "inline-block", "left", "none", "normal", "relative", "right", "solid",
    "static", "transparent",
];

/// Values that step through each other in order.
const VALUE_SETS: &[&[&str]] = &[
    &["true", "false"],
    &["left", "center", "right"],
    &["block", "inline", "inline-block", "flex", "grid", "none"],
    &["normal", "bold", "bolder", "lighter"],
];

/// A `@variable` use or declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    /// Including the leading `@`.
    pub name: String,
    pub span: Range<usize>,
    pub declaration: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlineKind {
    Rule,
    Variable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineNode {
    pub name: String,
    pub kind: OutlineKind,
    pub span: Range<usize>,
    pub selection: Range<usize>,
    pub children: Vec<OutlineNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionKind {
    Variable,
    Keyword,
    Property,
    Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub label: String,
    pub kind: SuggestionKind,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub span: Range<usize>,
    pub message: String,
    pub severity: LintSeverity,
}

/// New indentation for one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndentEdit {
    pub line: usize,
    /// Byte length of the whitespace the line starts with now.
    pub current: usize,
    pub indent: String,
}

#[derive(Debug, Default)]
struct Stylesheet {
    occurrences: Vec<Occurrence>,
    values: Vec<(usize, String)>,
    rules: Vec<OutlineNode>,
    unbalanced: Vec<(Range<usize>, &'static str)>,
}

impl Stylesheet {
    fn occurrence_at(&self, offset: usize) -> Option<&Occurrence> {
        self.occurrences
            .iter()
            .find(|o| o.span.start <= offset && offset <= o.span.end)
    }

    fn named<'s>(&'s self, name: &'s str) -> impl Iterator<Item = &'s Occurrence> + 's {
        self.occurrences.iter().filter(move |o| o.name == name)
    }

    /// Value of the last declaration of `name`.
    fn value_of(&self, name: &str) -> Option<&str> {
        let declaration = self.named(name).filter(|o| o.declaration).last()?;
        self.values
            .iter()
            .find(|(start, _)| *start == declaration.span.start)
            .map(|(_, value)| value.as_str())
    }
}

/// Analysis state of one worker.
pub struct LessWorker {
    options: RwLock<LessOptions>,
    validator: AtomicBool,
    validations: AtomicUsize,
    variable: Regex,
    number: Regex,
    color: Regex,
}

impl LessWorker {
    pub fn new(options: LessOptions) -> Result<Self, regex::Error> {
        Ok(Self {
            options: RwLock::new(options),
            validator: AtomicBool::new(false),
            validations: AtomicUsize::new(0),
            variable: Regex::new(r"@([A-Za-z_][\w-]*)")?,
            number: Regex::new(r"^(-?)(\d*\.?\d+)([a-zA-Z%]*)$")?,
            color: Regex::new(
                r"#(?:[0-9a-fA-F]{8}|[0-9a-fA-F]{6}|[0-9a-fA-F]{3,4})\b|\b(?:rgba?|hsla?)\([^()]*\)",
            )?,
        })
    }

    pub fn configure(&self, options: LessOptions) {
        match self.options.write() {
            Ok(mut current) => *current = options,
            Err(poisoned) => *poisoned.into_inner() = options,
        }
    }

    pub fn options(&self) -> LessOptions {
        match self.options.read() {
            Ok(options) => options.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn mark_validator(&self) {
        self.validator.store(true, Ordering::Release);
    }

    pub fn is_validator(&self) -> bool {
        self.validator.load(Ordering::Acquire)
    }

    /// Number of documents this worker has validated.
    pub fn validations(&self) -> usize {
        self.validations.load(Ordering::Acquire)
    }

    fn parse(&self, text: &str) -> Stylesheet {
        let masked = mask(text);
        let mut sheet = Stylesheet::default();

        for capture in self.variable.captures_iter(&masked) {
            let (Some(whole), Some(name)) = (capture.get(0), capture.get(1)) else {
                continue;
            };
            if AT_RULES.contains(&name.as_str()) {
                continue;
            }
            let after = masked[whole.end()..].trim_start();
            let at_statement_start = masked[..whole.start()]
                .trim_end()
                .chars()
                .last()
                .map_or(true, |c| matches!(c, '{' | '}' | ';'));
            let declaration = at_statement_start && after.starts_with(':');
            if declaration {
                let value_start = masked.len() - after.len() + 1;
                let value_end = masked[value_start..]
                    .find([';', '}', '{'])
                    .map_or(masked.len(), |i| value_start + i);
                sheet
                    .values
                    .push((whole.start(), text[value_start..value_end].trim().to_string()));
            }
            sheet.occurrences.push(Occurrence {
                name: whole.as_str().to_string(),
                span: whole.range(),
                declaration,
            });
        }

        self.parse_blocks(&masked, &mut sheet);
        sheet
    }

    fn parse_blocks(&self, masked: &str, sheet: &mut Stylesheet) {
        struct Open {
            selector: String,
            selection: Range<usize>,
            brace: usize,
            children: Vec<OutlineNode>,
        }

        fn close(stack: &mut [Open], top: &mut Vec<OutlineNode>, open: Open, end: usize) {
            let node = OutlineNode {
                name: open.selector,
                kind: OutlineKind::Rule,
                span: open.selection.start..end,
                selection: open.selection,
                children: open.children,
            };
            match stack.last_mut() {
                Some(parent) => parent.children.push(node),
                None => top.push(node),
            }
        }

        let mut stack: Vec<Open> = Vec::new();
        let mut top = Vec::new();
        let mut statement_start = 0;
        for (i, byte) in masked.bytes().enumerate() {
            match byte {
                b'{' => {
                    let raw = &masked[statement_start..i];
                    let start = statement_start + (raw.len() - raw.trim_start().len());
                    let selector = raw.split_whitespace().collect::<Vec<_>>().join(" ");
                    stack.push(Open {
                        selection: start..start + raw.trim().len(),
                        selector: if selector.is_empty() { "{}".to_string() } else { selector },
                        brace: i,
                        children: Vec::new(),
                    });
                    statement_start = i + 1;
                }
                b'}' => {
                    match stack.pop() {
                        Some(open) => close(&mut stack, &mut top, open, i + 1),
                        None => sheet.unbalanced.push((i..i + 1, "unexpected '}'")),
                    }
                    statement_start = i + 1;
                }
                b';' => statement_start = i + 1,
                _ => {}
            }
        }
        while let Some(open) = stack.pop() {
            sheet
                .unbalanced
                .push((open.brace..open.brace + 1, "missing '}'"));
            close(&mut stack, &mut top, open, masked.len());
        }
        sheet.unbalanced.sort_by_key(|(span, _)| span.start);
        sheet.rules = top;
    }

    /// `@name: value` for the variable at `offset`.
    pub fn hover(&self, text: &str, offset: usize) -> Option<(Range<usize>, String)> {
        let sheet = self.parse(text);
        let occurrence = sheet.occurrence_at(offset)?;
        let value = sheet.value_of(&occurrence.name)?;
        Some((
            occurrence.span.clone(),
            format!("{}: {}", occurrence.name, value),
        ))
    }

    pub fn references(
        &self,
        text: &str,
        offset: usize,
        include_declaration: bool,
    ) -> Vec<Range<usize>> {
        let sheet = self.parse(text);
        let Some(occurrence) = sheet.occurrence_at(offset) else {
            return Vec::new();
        };
        sheet
            .named(&occurrence.name)
            .filter(|o| include_declaration || !o.declaration)
            .map(|o| o.span.clone())
            .collect()
    }

    pub fn declarations(&self, text: &str, offset: usize) -> Vec<Range<usize>> {
        let sheet = self.parse(text);
        let Some(occurrence) = sheet.occurrence_at(offset) else {
            return Vec::new();
        };
        sheet
            .named(&occurrence.name)
            .filter(|o| o.declaration)
            .map(|o| o.span.clone())
            .collect()
    }

    /// Every occurrence of the variable at `offset`.
    pub fn occurrences(&self, text: &str, offset: usize) -> Vec<Occurrence> {
        let sheet = self.parse(text);
        let Some(occurrence) = sheet.occurrence_at(offset) else {
            return Vec::new();
        };
        sheet.named(&occurrence.name).cloned().collect()
    }

    /// Rule blocks by selector, with variable declarations placed in the
    /// innermost block holding them.
    pub fn outline(&self, text: &str) -> Vec<OutlineNode> {
        let sheet = self.parse(text);
        let mut rules = sheet.rules.clone();
        for declaration in sheet.occurrences.iter().filter(|o| o.declaration) {
            place(
                &mut rules,
                OutlineNode {
                    name: declaration.name.clone(),
                    kind: OutlineKind::Variable,
                    span: declaration.span.clone(),
                    selection: declaration.span.clone(),
                    children: Vec::new(),
                },
            );
        }
        rules
    }

    pub fn suggestions(&self, text: &str, offset: usize) -> Vec<Suggestion> {
        let offset = floor_char_boundary(text, offset);
        let prefix_start = text[..offset]
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_alphanumeric() || matches!(c, '-' | '_' | '@'))
            .last()
            .map_or(offset, |(i, _)| i);
        let prefix = &text[prefix_start..offset];

        let mut suggestions = Vec::new();
        if let Some(partial) = prefix.strip_prefix('@') {
            let sheet = self.parse(text);
            let mut seen = Vec::new();
            for declaration in sheet.occurrences.iter().filter(|o| o.declaration) {
                if seen.contains(&declaration.name) || declaration.span.start == prefix_start {
                    continue;
                }
                seen.push(declaration.name.clone());
                suggestions.push(Suggestion {
                    label: declaration.name.clone(),
                    kind: SuggestionKind::Variable,
                    detail: sheet.value_of(&declaration.name).map(str::to_string),
                });
            }
            suggestions.extend(AT_RULES.iter().map(|rule| Suggestion {
                label: format!("@{rule}"),
                kind: SuggestionKind::Keyword,
                detail: None,
            }));
            suggestions.retain(|s| s.label[1..].starts_with(partial));
            return suggestions;
        }

        let masked = mask(text);
        let before = &masked[..prefix_start];
        let depth = before.matches('{').count() as i64 - before.matches('}').count() as i64;
        if depth <= 0 {
            return suggestions;
        }
        let statement = before
            .rfind(['{', '}', ';'])
            .map_or(before, |i| &before[i + 1..]);
        let (words, kind) = match statement.contains(':') {
            true => (VALUES, SuggestionKind::Value),
            false => (PROPERTIES, SuggestionKind::Property),
        };
        suggestions.extend(
            words
                .iter()
                .filter(|word| word.starts_with(prefix))
                .map(|word| Suggestion {
                    label: word.to_string(),
                    kind,
                    detail: None,
                }),
        );
        suggestions
    }

    /// Problems with brace balance, at the configured severity.
    pub fn validate(&self, text: &str) -> Vec<Problem> {
        self.validations.fetch_add(1, Ordering::AcqRel);
        let severity = self.options().lint.unbalanced_braces;
        if severity == LintSeverity::Ignore {
            return Vec::new();
        }
        self.parse(text)
            .unbalanced
            .into_iter()
            .map(|(span, message)| Problem {
                span,
                message: message.to_string(),
                severity,
            })
            .collect()
    }

    /// Color literals in declaration values, and uses of variables whose
    /// value is a color literal. A variable use reports the color it stands
    /// for.
    pub fn color_declarations(&self, text: &str) -> Vec<(Range<usize>, String)> {
        let masked = mask(text);
        let mut colors: Vec<(Range<usize>, String)> = self
            .color
            .find_iter(&masked)
            .filter(|m| in_value(&masked, m.range()))
            .map(|m| (m.range(), text[m.range()].to_string()))
            .collect();

        let sheet = self.parse(text);
        for occurrence in sheet.occurrences.iter().filter(|o| !o.declaration) {
            if let Some(value) = sheet.value_of(&occurrence.name).filter(|v| self.is_color(v)) {
                colors.push((occurrence.span.clone(), value.to_string()));
            }
        }
        colors.sort_by_key(|(span, _)| span.start);
        colors
    }

    fn is_color(&self, value: &str) -> bool {
        self.color
            .find(value)
            .is_some_and(|m| m.start() == 0 && m.end() == value.len())
    }

    /// The value following `value` in its set, or `value` stepped by one if
    /// it is a number. Units and decimal places are kept.
    pub fn navigate_value_set(&self, value: &str, up: bool) -> Option<String> {
        if let Some(set) = VALUE_SETS.iter().find(|set| set.contains(&value)) {
            let index = set.iter().position(|v| *v == value)?;
            let next = match up {
                true => (index + 1) % set.len(),
                false => (index + set.len() - 1) % set.len(),
            };
            return Some(set[next].to_string());
        }

        let captures = self.number.captures(value)?;
        let sign = captures.get(1).map_or("", |m| m.as_str());
        let digits = captures.get(2)?.as_str();
        let unit = captures.get(3).map_or("", |m| m.as_str());
        let number: f64 = format!("{sign}{digits}").parse().ok()?;
        let stepped = if up { number + 1.0 } else { number - 1.0 };
        let decimals = digits.split_once('.').map_or(0, |(_, fraction)| fraction.len());
        Some(format!("{stepped:.decimals$}{unit}"))
    }

    /// Re-indent every line by its brace depth. Lines inside comments,
    /// strings and script blocks are left alone.
    pub fn format(&self, text: &str, unit: &str) -> Vec<IndentEdit> {
        let masked = mask(text);
        let mut edits = Vec::new();
        let mut depth: i64 = 0;
        let lines = text.split('\n').zip(masked.split('\n'));
        for (line, (original, masked_line)) in lines.enumerate() {
            let original = original.strip_suffix('\r').unwrap_or(original);
            let content = masked_line.trim();
            let current = original.len() - original.trim_start().len();

            if content.is_empty() {
                if original.trim().is_empty() && current > 0 {
                    edits.push(IndentEdit {
                        line,
                        current,
                        indent: String::new(),
                    });
                }
                continue;
            }

            let level = if content.starts_with('}') { depth - 1 } else { depth };
            let indent = unit.repeat(level.max(0) as usize);
            if original[..current] != indent {
                edits.push(IndentEdit {
                    line,
                    current,
                    indent,
                });
            }
            depth += content.matches('{').count() as i64 - content.matches('}').count() as i64;
        }
        edits
    }
}

fn place(nodes: &mut Vec<OutlineNode>, node: OutlineNode) {
    let container = nodes.iter_mut().find(|parent| {
        parent.kind == OutlineKind::Rule
            && parent.span.start <= node.span.start
            && node.span.end <= parent.span.end
    });
    match container {
        Some(parent) => place(&mut parent.children, node),
        None => {
            let at = nodes
                .iter()
                .position(|n| n.span.start > node.span.start)
                .unwrap_or(nodes.len());
            nodes.insert(at, node);
        }
    }
}

/// `text` with comments, string bodies and script blocks blanked out.
/// Byte offsets and line breaks are preserved.
fn mask(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = bytes.to_vec();
    let blank = |out: &mut Vec<u8>, range: Range<usize>| {
        for byte in &mut out[range] {
            if *byte != b'\n' {
                *byte = b' ';
            }
        }
    };

    let mut i = 0;
    while i < bytes.len() {
        match (bytes[i], bytes.get(i + 1)) {
            (b'/', Some(b'*')) => {
                let end = text[i + 2..].find("*/").map_or(bytes.len(), |e| i + 2 + e + 2);
                blank(&mut out, i..end);
                i = end;
            }
            (b'/', Some(b'/')) => {
                let end = text[i..].find('\n').map_or(bytes.len(), |e| i + e);
                blank(&mut out, i..end);
                i = end;
            }
            (quote @ (b'"' | b'\''), _) => {
                let mut j = i + 1;
                while j < bytes.len() && bytes[j] != quote && bytes[j] != b'\n' {
                    j += if bytes[j] == b'\\' { 2 } else { 1 };
                }
                let end = j.min(bytes.len());
                blank(&mut out, i + 1..end);
                i = end + 1;
            }
            (b'`', _) => {
                let end = text[i + 1..].find('`').map_or(bytes.len(), |e| i + 1 + e);
                blank(&mut out, i + 1..end);
                i = end + 1;
            }
            _ => i += 1,
        }
    }
    String::from_utf8(out).unwrap_or_else(|_| text.to_string())
}

/// Whether `span` sits after the colon of a declaration rather than in a
/// selector.
fn in_value(masked: &str, span: Range<usize>) -> bool {
    let before = &masked[..span.start];
    let statement = before
        .rfind(['{', '}', ';'])
        .map_or(before, |i| &before[i + 1..]);
    statement.contains(':') && !masked[span.end..].trim_start().starts_with('{')
}

fn floor_char_boundary(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = "@primary: #336699;\n@gap: 4px;\n\n.nav {\n  color: @primary;\n  .item {\n    @inner: 2;\n    margin: @gap;\n  }\n}\n";

    fn worker() -> LessWorker {
        LessWorker::new(LessOptions::default()).unwrap()
    }

    fn spans(text: &str, spans: &[Range<usize>]) -> Vec<String> {
        spans.iter().map(|s| text[s.clone()].to_string()).collect()
    }

    #[test]
    fn colors_in_values_and_through_variables() {
        let colors = worker().color_declarations(SHEET);
        let found: Vec<(&str, &str)> = colors
            .iter()
            .map(|(span, value)| (&SHEET[span.clone()], value.as_str()))
            .collect();
        assert_eq!(found, vec![("#336699", "#336699"), ("@primary", "#336699")]);
    }

    #[test]
    fn colors_skip_selectors_comments_and_strings() {
        let text = "#abc { color: rgb(1, 2, 3); }\n/* #fff */\n.a { background: hsla(0, 0%, 0%, .5) url('#123'); border: #12345; }";
        let colors = worker().color_declarations(text);
        let values: Vec<&str> = colors.iter().map(|(_, v)| v.as_str()).collect();
        assert_eq!(values, vec!["rgb(1, 2, 3)", "hsla(0, 0%, 0%, .5)"]);
    }

    #[test]
    fn validations_are_counted() {
        let worker = worker();
        worker.validate(".a {");
        worker.validate(".a {}");
        assert_eq!(worker.validations(), 2);
    }

    #[test]
    fn mask_blanks_comments_and_strings() {
        let masked = mask("a /* b */ \"c{\" // d\n`e}` f");
        assert_eq!(masked, "a         \"  \"     \n`  ` f");
    }

    #[test]
    fn hover_shows_declared_value() {
        let offset = SHEET.find("@primary;").unwrap() + 2;
        let (span, text) = worker().hover(SHEET, offset).unwrap();
        assert_eq!(&SHEET[span], "@primary");
        assert_eq!(text, "@primary: #336699");
    }

    #[test]
    fn hover_on_unknown_variable() {
        assert_eq!(worker().hover("a { b: @nope; }", 9), None);
        assert_eq!(worker().hover(SHEET, SHEET.find(".nav").unwrap()), None);
    }

    #[test]
    fn references_and_declarations() {
        let worker = worker();
        let offset = SHEET.find("@gap;").unwrap();
        assert_eq!(
            spans(SHEET, &worker.references(SHEET, offset, true)),
            vec!["@gap", "@gap"]
        );
        assert_eq!(worker.references(SHEET, offset, false).len(), 1);
        let declarations = worker.declarations(SHEET, offset);
        assert_eq!(declarations, vec![SHEET.find("@gap").unwrap()..SHEET.find("@gap").unwrap() + 4]);
    }

    #[test]
    fn at_rules_are_not_variables() {
        let sheet = worker().parse("@media screen { @x: 1; }");
        let names: Vec<&str> = sheet.occurrences.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["@x"]);
    }

    #[test]
    fn outline_nests_rules_and_variables() {
        let outline = worker().outline(SHEET);
        let names: Vec<&str> = outline.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["@primary", "@gap", ".nav"]);

        let nav = &outline[2];
        assert_eq!(nav.kind, OutlineKind::Rule);
        assert_eq!(&SHEET[nav.selection.clone()], ".nav");
        assert_eq!(nav.children.len(), 1);
        let item = &nav.children[0];
        assert_eq!(item.name, ".item");
        assert_eq!(item.children[0].name, "@inner");
        assert_eq!(item.children[0].kind, OutlineKind::Variable);
    }

    #[test]
    fn variable_suggestions() {
        let text = format!("{SHEET}.x {{ width: @g");
        let suggestions = worker().suggestions(&text, text.len());
        assert_eq!(
            suggestions,
            vec![Suggestion {
                label: "@gap".into(),
                kind: SuggestionKind::Variable,
                detail: Some("4px".into()),
            }]
        );
    }

    #[test]
    fn property_and_value_suggestions() {
        let worker = worker();
        let text = ".a { pad";
        let labels: Vec<String> = worker
            .suggestions(text, text.len())
            .into_iter()
            .map(|s| s.label)
            .collect();
        assert_eq!(labels, vec!["padding"]);

        let text = ".a { display: inl";
        let suggestions = worker.suggestions(text, text.len());
        assert!(suggestions.iter().all(|s| s.kind == SuggestionKind::Value));
        let labels: Vec<&str> = suggestions.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["inline", "inline-block"]);

        assert!(worker.suggestions("col", 3).is_empty());
    }

    #[test]
    fn brace_problems_follow_configuration() {
        let worker = worker();
        let problems = worker.validate(".a { color: red;\n}\n}");
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].message, "unexpected '}'");
        assert_eq!(problems[0].severity, LintSeverity::Error);

        let problems = worker.validate(".a { .b { }");
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].span, 3..4);
        assert_eq!(problems[0].message, "missing '}'");

        let mut options = LessOptions::default();
        options.lint.unbalanced_braces = LintSeverity::Warning;
        worker.configure(options.clone());
        assert_eq!(worker.validate("}")[0].severity, LintSeverity::Warning);

        options.lint.unbalanced_braces = LintSeverity::Ignore;
        worker.configure(options);
        assert!(worker.validate("}").is_empty());
    }

    #[test]
    fn braces_in_comments_and_strings_are_ignored() {
        assert!(worker()
            .validate(".a { content: \"}\"; /* { */ }\n// }")
            .is_empty());
    }

    #[test]
    fn value_sets_cycle() {
        let worker = worker();
        assert_eq!(worker.navigate_value_set("true", true).as_deref(), Some("false"));
        assert_eq!(worker.navigate_value_set("left", false).as_deref(), Some("right"));
        assert_eq!(worker.navigate_value_set("block", true).as_deref(), Some("inline"));
        assert_eq!(worker.navigate_value_set("10px", true).as_deref(), Some("11px"));
        assert_eq!(worker.navigate_value_set("0.5em", false).as_deref(), Some("-0.5em"));
        assert_eq!(worker.navigate_value_set("-3", true).as_deref(), Some("-2"));
        assert_eq!(worker.navigate_value_set("red", true), None);
    }

    #[test]
    fn format_indents_by_depth() {
        let text = ".a {\ncolor: red;\n      .b {\n  }\n}\n  \n/* keep\n        me */";
        let edits = worker().format(text, "  ");
        assert_eq!(
            edits,
            vec![
                IndentEdit { line: 1, current: 0, indent: "  ".into() },
                IndentEdit { line: 2, current: 6, indent: "  ".into() },
                IndentEdit { line: 5, current: 2, indent: String::new() },
            ]
        );
    }
}
