//! XPath subset evaluated over a parsed HTML document
//!
//! Supported syntax:
//! - location paths: `/html/body/div`, `//div`, `//div//span`, relative `html/body`
//! - node tests: element names, `*`, terminal `text()` and `@attr`
//! - predicates: `[2]`, `[last()]`, `[@class]`, `[@id='x']`, `[text()='x']`,
//!   `[contains(@class,'x')]`, `[starts-with(@href,'x')]`, `[contains(.,'x')]`
//!
//! Results are returned in document order.

use std::collections::HashSet;

use scraper::{ElementRef, Html};

use crate::parser::traits::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeTest {
    Name(String),
    Any,
    Text,
    Attribute(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Operand {
    Attribute(String),
    /// Direct text children of the element
    Text,
    /// Full string value of the element (`.`)
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Position(usize),
    Last,
    HasAttribute(String),
    Equals(Operand, String),
    Contains(Operand, String),
    StartsWith(Operand, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Predicate>,
}

/// A compiled XPath expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XPath {
    expression: String,
    steps: Vec<Step>,
}

#[derive(Clone, Copy)]
enum Scope<'a> {
    Document,
    Element(ElementRef<'a>),
}

impl XPath {
    pub fn compile(expression: &str) -> Result<Self, ParseError> {
        let invalid = || ParseError::InvalidXPath(expression.to_string());

        let mut rest = expression.trim();
        if rest.is_empty() {
            return Err(invalid());
        }

        let mut steps: Vec<Step> = Vec::new();
        loop {
            let axis = if let Some(r) = rest.strip_prefix("//") {
                rest = r;
                Axis::Descendant
            } else if let Some(r) = rest.strip_prefix('/') {
                rest = r;
                Axis::Child
            } else if steps.is_empty() {
                Axis::Child
            } else {
                return Err(invalid());
            };

            let end = rest.find(['/', '[']).unwrap_or(rest.len());
            let test = parse_node_test(rest[..end].trim()).ok_or_else(invalid)?;
            rest = &rest[end..];

            let mut predicates = Vec::new();
            while rest.starts_with('[') {
                let close = find_closing_bracket(rest).ok_or_else(invalid)?;
                predicates.push(parse_predicate(rest[1..close].trim()).ok_or_else(invalid)?);
                rest = &rest[close + 1..];
            }

            let terminal = matches!(test, NodeTest::Text | NodeTest::Attribute(_));
            if terminal && (!predicates.is_empty() || !rest.is_empty()) {
                return Err(invalid());
            }

            steps.push(Step {
                axis,
                test,
                predicates,
            });

            if rest.is_empty() {
                break;
            }
        }

        Ok(Self {
            expression: expression.to_string(),
            steps,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Evaluate against a document, returning string values in document order
    pub fn evaluate(&self, document: &Html) -> Vec<String> {
        let mut scopes = vec![Scope::Document];

        for step in &self.steps {
            match &step.test {
                NodeTest::Text => return select_text(document, &scopes, step.axis),
                NodeTest::Attribute(name) => {
                    return select_attribute(document, &scopes, step.axis, name);
                }
                NodeTest::Name(_) | NodeTest::Any => {
                    let selected = select_elements(document, &scopes, step);
                    scopes = selected.into_iter().map(Scope::Element).collect();
                }
            }
        }

        scopes
            .into_iter()
            .filter_map(|scope| match scope {
                Scope::Element(el) => Some(el.text().collect::<String>()),
                Scope::Document => None,
            })
            .collect()
    }
}

fn parse_node_test(token: &str) -> Option<NodeTest> {
    match token {
        "*" => Some(NodeTest::Any),
        "text()" => Some(NodeTest::Text),
        _ => {
            if let Some(name) = token.strip_prefix('@') {
                is_name(name).then(|| NodeTest::Attribute(name.to_string()))
            } else {
                is_name(token).then(|| NodeTest::Name(token.to_ascii_lowercase()))
            }
        }
    }
}

fn is_name(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
}

/// Index of the `]` closing the predicate that opens at byte 0, skipping quoted literals.
fn find_closing_bracket(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_literal(s: &str) -> Option<String> {
    let s = s.trim();
    let quote = s.chars().next()?;
    if !matches!(quote, '\'' | '"') || s.len() < 2 || !s.ends_with(quote) {
        return None;
    }
    Some(s[1..s.len() - 1].to_string())
}

fn parse_operand(s: &str) -> Option<Operand> {
    match s.trim() {
        "text()" => Some(Operand::Text),
        "." => Some(Operand::Context),
        other => other
            .strip_prefix('@')
            .filter(|name| is_name(name))
            .map(|name| Operand::Attribute(name.to_string())),
    }
}

/// Split `a, 'b'` at the first comma outside quotes.
fn split_arguments(s: &str) -> Option<(&str, &str)> {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, ',') => return Some((&s[..i], &s[i + 1..])),
            _ => {}
        }
    }
    None
}

fn parse_function(s: &str, name: &str) -> Option<(Operand, String)> {
    let args = s.strip_prefix(name)?.trim_start().strip_prefix('(')?;
    let args = args.strip_suffix(')')?;
    let (operand, literal) = split_arguments(args)?;
    Some((parse_operand(operand)?, parse_literal(literal)?))
}

fn parse_predicate(s: &str) -> Option<Predicate> {
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        let position: usize = s.parse().ok()?;
        return (position >= 1).then_some(Predicate::Position(position));
    }
    if s == "last()" {
        return Some(Predicate::Last);
    }
    if let Some((operand, literal)) = parse_function(s, "contains") {
        return Some(Predicate::Contains(operand, literal));
    }
    if let Some((operand, literal)) = parse_function(s, "starts-with") {
        return Some(Predicate::StartsWith(operand, literal));
    }
    if let Some((lhs, rhs)) = s.split_once('=') {
        return Some(Predicate::Equals(parse_operand(lhs)?, parse_literal(rhs)?));
    }
    s.strip_prefix('@')
        .filter(|name| is_name(name))
        .map(|name| Predicate::HasAttribute(name.to_string()))
}

fn direct_text(el: ElementRef<'_>) -> String {
    el.children()
        .filter_map(|node| node.value().as_text().map(|t| String::from(&**t)))
        .collect()
}

fn operand_value(el: ElementRef<'_>, operand: &Operand) -> Option<String> {
    match operand {
        Operand::Attribute(name) => el.value().attr(name).map(str::to_string),
        Operand::Text => Some(direct_text(el)),
        Operand::Context => Some(el.text().collect()),
    }
}

fn matches_test(el: ElementRef<'_>, test: &NodeTest) -> bool {
    match test {
        NodeTest::Any => true,
        NodeTest::Name(name) => el.value().name() == name,
        NodeTest::Text | NodeTest::Attribute(_) => false,
    }
}

fn matches_predicate(el: ElementRef<'_>, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::Position(_) | Predicate::Last => true,
        Predicate::HasAttribute(name) => el.value().attr(name).is_some(),
        Predicate::Equals(operand, literal) => {
            operand_value(el, operand).is_some_and(|v| v.trim() == literal)
        }
        Predicate::Contains(operand, literal) => {
            operand_value(el, operand).is_some_and(|v| v.contains(literal.as_str()))
        }
        Predicate::StartsWith(operand, literal) => {
            operand_value(el, operand).is_some_and(|v| v.starts_with(literal.as_str()))
        }
    }
}

/// Apply predicates in order; positional predicates index into the
/// candidates that survived the previous predicates.
fn apply_predicates<'a>(
    mut candidates: Vec<ElementRef<'a>>,
    predicates: &[Predicate],
) -> Vec<ElementRef<'a>> {
    for predicate in predicates {
        candidates = match predicate {
            Predicate::Position(n) => candidates.get(n - 1).copied().into_iter().collect(),
            Predicate::Last => candidates.last().copied().into_iter().collect(),
            other => candidates
                .into_iter()
                .filter(|el| matches_predicate(*el, other))
                .collect(),
        };
    }
    candidates
}

fn child_elements<'a>(document: &'a Html, scope: Scope<'a>) -> Vec<ElementRef<'a>> {
    match scope {
        Scope::Document => vec![document.root_element()],
        Scope::Element(el) => el.children().filter_map(ElementRef::wrap).collect(),
    }
}

/// The scope itself followed by every element below it.
fn self_and_descendants<'a>(document: &'a Html, scope: Scope<'a>) -> Vec<Scope<'a>> {
    let root = match scope {
        Scope::Document => document.root_element(),
        Scope::Element(el) => el,
    };
    let below = root.descendants().filter_map(ElementRef::wrap);
    match scope {
        Scope::Document => std::iter::once(Scope::Document)
            .chain(below.map(Scope::Element))
            .collect(),
        Scope::Element(_) => below.map(Scope::Element).collect(),
    }
}

fn expand_axis<'a>(document: &'a Html, scopes: &[Scope<'a>], axis: Axis) -> Vec<Scope<'a>> {
    match axis {
        Axis::Child => scopes.to_vec(),
        Axis::Descendant => scopes
            .iter()
            .flat_map(|scope| self_and_descendants(document, *scope))
            .collect(),
    }
}

fn in_document_order<'a>(document: &'a Html, nodes: Vec<ElementRef<'a>>) -> Vec<ElementRef<'a>> {
    let ids: HashSet<_> = nodes.iter().map(|el| (**el).id()).collect();
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| ids.contains(&(**el).id()))
        .collect()
}

fn select_elements<'a>(
    document: &'a Html,
    scopes: &[Scope<'a>],
    step: &Step,
) -> Vec<ElementRef<'a>> {
    let selected = expand_axis(document, scopes, step.axis)
        .into_iter()
        .flat_map(|parent| {
            let candidates = child_elements(document, parent)
                .into_iter()
                .filter(|el| matches_test(*el, &step.test))
                .collect();
            apply_predicates(candidates, &step.predicates)
        })
        .collect();
    in_document_order(document, selected)
}

fn select_text<'a>(document: &'a Html, scopes: &[Scope<'a>], axis: Axis) -> Vec<String> {
    let elements: Vec<ElementRef<'a>> = expand_axis(document, scopes, axis)
        .into_iter()
        .filter_map(|scope| match scope {
            Scope::Element(el) => Some(el),
            Scope::Document => None,
        })
        .collect();

    in_document_order(document, elements)
        .into_iter()
        .flat_map(|el| {
            el.children()
                .filter_map(|node| node.value().as_text().map(|t| String::from(&**t)))
                .collect::<Vec<_>>()
        })
        .filter(|text| !text.trim().is_empty())
        .collect()
}

fn select_attribute<'a>(
    document: &'a Html,
    scopes: &[Scope<'a>],
    axis: Axis,
    name: &str,
) -> Vec<String> {
    let elements: Vec<ElementRef<'a>> = expand_axis(document, scopes, axis)
        .into_iter()
        .filter_map(|scope| match scope {
            Scope::Element(el) => Some(el),
            Scope::Document => None,
        })
        .collect();

    in_document_order(document, elements)
        .into_iter()
        .filter_map(|el| el.value().attr(name).map(str::to_string))
        .collect()
}
