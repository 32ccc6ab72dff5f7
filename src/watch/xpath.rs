//! Location paths for pointing at a table inside an HTML document.
//!
//! Covers the XPath subset such paths are written in: `/` and `//`
//! separated steps naming an element or `*`, each with any number of
//! `[n]`, `[last()]`, `[child]`, `[@attr]` or `[@attr='value']` predicates.
//! Positional predicates count among the siblings matched by the step, so
//! `//table[1]` is every table that is the first table of its parent.

use crate::error::ParseError;
use scraper::{ElementRef, Html};

/// A parsed location path, evaluated from the document root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XPath {
    steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NameTest,
    predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    /// `/name`
    Child,
    /// `//name`
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NameTest {
    Any,
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Position(usize),
    Last,
    HasChild(NameTest),
    Attribute { name: String, value: Option<String> },
}

#[derive(Clone, Copy)]
enum Context<'a> {
    Document,
    Element(ElementRef<'a>),
}

impl XPath {
    pub fn parse(path: &str) -> Result<Self, ParseError> {
        let invalid = |reason: &str| ParseError::InvalidSelector {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        let mut rest = path.trim();
        let mut steps = Vec::new();
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
                return Err(invalid("expected '/' between steps"));
            };

            let (step, remaining) = parse_step(rest, axis).map_err(invalid)?;
            steps.push(step);
            rest = remaining;
            if rest.is_empty() {
                return Ok(Self { steps });
            }
        }
    }

    /// Every matching element, in the order the steps reach them.
    pub fn select<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        let mut contexts = vec![Context::Document];
        for step in &self.steps {
            let mut next: Vec<ElementRef<'a>> = Vec::new();
            for context in &contexts {
                let parents = match step.axis {
                    Axis::Child => vec![*context],
                    Axis::Descendant => context.descendants_or_self(document),
                };
                for parent in parents {
                    let siblings = parent
                        .children(document)
                        .into_iter()
                        .filter(|e| step.test.matches(e))
                        .collect();
                    for element in step.filter(siblings) {
                        if !next.contains(&element) {
                            next.push(element);
                        }
                    }
                }
            }
            if next.is_empty() {
                return next;
            }
            contexts = next.into_iter().map(Context::Element).collect();
        }

        contexts
            .into_iter()
            .filter_map(|context| match context {
                Context::Element(element) => Some(element),
                Context::Document => None,
            })
            .collect()
    }
}

impl Step {
    fn filter<'a>(&self, mut siblings: Vec<ElementRef<'a>>) -> Vec<ElementRef<'a>> {
        for predicate in &self.predicates {
            siblings = match predicate {
                Predicate::Position(n) => siblings.get(n - 1).copied().into_iter().collect(),
                Predicate::Last => siblings.last().copied().into_iter().collect(),
                Predicate::HasChild(test) => siblings
                    .into_iter()
                    .filter(|e| child_elements(*e).any(|child| test.matches(&child)))
                    .collect(),
                Predicate::Attribute { name, value } => siblings
                    .into_iter()
                    .filter(|e| match (e.value().attr(name), value) {
                        (Some(_), None) => true,
                        (Some(actual), Some(expected)) => actual == expected.as_str(),
                        (None, _) => false,
                    })
                    .collect(),
            };
        }
        siblings
    }
}

impl NameTest {
    fn matches(&self, element: &ElementRef<'_>) -> bool {
        match self {
            NameTest::Any => true,
            NameTest::Name(name) => element.value().name() == name.as_str(),
        }
    }
}

impl<'a> Context<'a> {
    fn children(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        match self {
            Context::Document => vec![document.root_element()],
            Context::Element(element) => child_elements(*element).collect(),
        }
    }

    fn descendants_or_self(&self, document: &'a Html) -> Vec<Context<'a>> {
        let (mut out, from) = match self {
            Context::Document => (vec![Context::Document], document.root_element()),
            Context::Element(element) => (Vec::new(), *element),
        };
        out.extend(
            (*from)
                .descendants()
                .filter_map(ElementRef::wrap)
                .map(Context::Element),
        );
        out
    }
}

fn child_elements(parent: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    parent.children().filter_map(ElementRef::wrap)
}

fn parse_step(input: &str, axis: Axis) -> Result<(Step, &str), &'static str> {
    let (test, mut rest) = parse_name_test(input).ok_or("expected an element name")?;

    let mut predicates = Vec::new();
    while let Some(body) = rest.strip_prefix('[') {
        let close = closing_bracket(body).ok_or("unterminated predicate")?;
        predicates.push(parse_predicate(body[..close].trim())?);
        rest = &body[close + 1..];
    }

    Ok((
        Step {
            axis,
            test,
            predicates,
        },
        rest,
    ))
}

fn parse_name_test(input: &str) -> Option<(NameTest, &str)> {
    if let Some(rest) = input.strip_prefix('*') {
        return Some((NameTest::Any, rest));
    }
    let end = input
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':'))
        .unwrap_or(input.len());
    if end == 0 {
        return None;
    }
    let (name, rest) = input.split_at(end);
    Some((NameTest::Name(name.to_ascii_lowercase()), rest))
}

/// Byte offset of the `]` closing a predicate, skipping quoted text.
fn closing_bracket(body: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in body.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, ']') => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_predicate(body: &str) -> Result<Predicate, &'static str> {
    if body == "last()" {
        return Ok(Predicate::Last);
    }
    if !body.is_empty() && body.bytes().all(|b| b.is_ascii_digit()) {
        return match body.parse::<usize>() {
            Ok(n) if n >= 1 => Ok(Predicate::Position(n)),
            _ => Err("positions start at 1"),
        };
    }
    if let Some(attribute) = body.strip_prefix('@') {
        let (name, value) = match attribute.split_once('=') {
            Some((name, value)) => (name.trim(), Some(unquote(value.trim())?)),
            None => (attribute.trim(), None),
        };
        if name.is_empty() {
            return Err("expected an attribute name");
        }
        return Ok(Predicate::Attribute {
            name: name.to_ascii_lowercase(),
            value,
        });
    }
    match parse_name_test(body) {
        Some((test, "")) => Ok(Predicate::HasChild(test)),
        _ => Err("unsupported predicate"),
    }
}

fn unquote(value: &str) -> Result<String, &'static str> {
    for quote in ['\'', '"'] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return Ok(inner.to_string());
        }
    }
    Err("attribute values must be quoted")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
    <div id="status">
        <table class="downstream">
            <tbody>
                <tr><td>Downstream 1</td><td>73</td></tr>
                <tr><td>Downstream 2</td><td>74</td></tr>
            </tbody>
        </table>
        <table class="upstream">
            <tbody>
                <tr><th>Channel</th></tr>
                <tr><td>Upstream 1</td></tr>
            </tbody>
        </table>
    </div>"#;

    fn first_cells(elements: &[ElementRef<'_>]) -> Vec<String> {
        elements
            .iter()
            .map(|e| {
                child_elements(*e)
                    .next()
                    .map(|c| c.text().collect::<String>())
                    .unwrap_or_default()
            })
            .collect()
    }

    #[test]
    fn test_positional_predicate_counts_siblings() {
        let document = Html::parse_document(PAGE);
        let tables = XPath::parse("//table[1]").unwrap().select(&document);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].value().attr("class"), Some("downstream"));

        let last = XPath::parse("//div/table[last()]").unwrap().select(&document);
        assert_eq!(last[0].value().attr("class"), Some("upstream"));
    }

    #[test]
    fn test_absolute_path() {
        let document = Html::parse_document(PAGE);
        let bodies = XPath::parse("/html/body/div/table[2]/tbody").unwrap().select(&document);
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0].value().name(), "tbody");
    }

    #[test]
    fn test_child_predicate() {
        let document = Html::parse_document(PAGE);
        let rows = XPath::parse("//tr[td]").unwrap().select(&document);
        assert_eq!(
            first_cells(&rows),
            vec!["Downstream 1", "Downstream 2", "Upstream 1"]
        );
    }

    #[test]
    fn test_attribute_predicates() {
        let document = Html::parse_document(PAGE);
        let by_value = XPath::parse("//table[@class='upstream']/tbody")
            .unwrap()
            .select(&document);
        assert_eq!(by_value.len(), 1);

        let by_presence = XPath::parse(r#"//*[@id]"#).unwrap().select(&document);
        assert_eq!(by_presence.len(), 1);
        assert_eq!(by_presence[0].value().name(), "div");
    }

    #[test]
    fn test_no_match() {
        let document = Html::parse_document(PAGE);
        assert!(XPath::parse("//table[3]/tbody").unwrap().select(&document).is_empty());
        assert!(XPath::parse("/table").unwrap().select(&document).is_empty());
    }

    #[test]
    fn test_invalid_paths() {
        for path in ["//", "//table[", "//table[0]", "//table[position()>1]", "//table[@class=x]"] {
            let err = XPath::parse(path).unwrap_err();
            assert!(
                matches!(err, ParseError::InvalidSelector { .. }),
                "{path} was accepted"
            );
        }
    }
}
