use scraper::{ElementRef, Html, Node, Selector};

use crate::session::Element;
use crate::{Error, Result};

/// An element of a rendered page, kept as its outer HTML.
///
/// Each query re-parses the fragment, so a handle is `Send` and can outlive the
/// document it was cut out of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    html: String,
}

impl Fragment {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }

    fn with_node<R>(&self, f: impl FnOnce(ElementRef<'_>) -> R) -> Option<R> {
        let doc = Html::parse_fragment(&self.html);
        let node = doc.root_element().children().find_map(ElementRef::wrap)?;
        Some(f(node))
    }
}

impl From<ElementRef<'_>> for Fragment {
    fn from(value: ElementRef<'_>) -> Self {
        Fragment::new(value.html())
    }
}

impl Element for Fragment {
    fn find(&self, selector: &str) -> Result<Option<Self>> {
        let selector = create_selector(selector)?;
        Ok(self
            .with_node(|node| node.select(&selector).next().map(Fragment::from))
            .flatten())
    }

    fn find_all(&self, selector: &str) -> Result<Vec<Self>> {
        let selector = create_selector(selector)?;
        Ok(self
            .with_node(|node| node.select(&selector).map(Fragment::from).collect())
            .unwrap_or_default())
    }

    fn children(&self) -> Vec<Self> {
        self.with_node(|node| {
            node.children()
                .filter_map(ElementRef::wrap)
                .map(Fragment::from)
                .collect()
        })
        .unwrap_or_default()
    }

    fn text(&self) -> String {
        self.with_node(visible_text).unwrap_or_default()
    }
}

/// Whether anything in the document matches `selector`.
pub(crate) fn contains(page_source: &str, selector: &str) -> Result<bool> {
    let selector = create_selector(selector)?;
    let doc = Html::parse_document(page_source);
    let found = doc.select(&selector).next().is_some();
    Ok(found)
}

/// Finds the first `scope` element of the document and returns the outermost
/// elements inside it matching `selector`. `None` if there is no such scope.
///
/// "Outermost" keeps a nested `<li>` inside a card from showing up as a card of its own.
pub(crate) fn outermost_in_scope(
    page_source: &str,
    scope: &str,
    selector: &str,
) -> Result<Option<Vec<Fragment>>> {
    let scope_selector = create_selector(scope)?;
    let selector = create_selector(selector)?;
    let doc = Html::parse_document(page_source);

    let Some(scope_el) = doc.select(&scope_selector).next() else {
        return Ok(None);
    };

    let found = scope_el
        .select(&selector)
        .filter(|el| {
            !el.ancestors()
                .take_while(|a| a.id() != scope_el.id())
                .filter_map(ElementRef::wrap)
                .any(|a| selector.matches(&a))
        })
        .map(Fragment::from)
        .collect();
    Ok(Some(found))
}

/// Elements that start a new line of rendered text.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "footer", "form",
    "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol", "p", "pre",
    "section", "table", "tbody", "td", "th", "thead", "tr", "ul",
];

/// Text the way a browser shows it: inline runs on one line with whitespace
/// collapsed, line breaks only at `<br>` and block boundaries.
fn visible_text(node: ElementRef<'_>) -> String {
    let mut raw = String::new();
    push_text(node, &mut raw);
    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn push_text(node: ElementRef<'_>, out: &mut String) {
    for child in node.children() {
        if let Some(el) = ElementRef::wrap(child) {
            let name = el.value().name();
            if name == "br" {
                out.push('\n');
                continue;
            }
            let block = BLOCK_TAGS.contains(&name);
            if block {
                out.push('\n');
            }
            push_text(el, out);
            if block {
                out.push('\n');
            }
        } else if let Node::Text(text) = child.value() {
            // Source line wrapping is just whitespace.
            out.extend(text.chars().map(|c| if c.is_whitespace() { ' ' } else { c }));
        }
    }
}

#[inline]
pub(crate) fn create_selector(sel_str: &str) -> Result<Selector> {
    Selector::parse(sel_str).map_err(|_| Error::ParseMissingSelector(sel_str.into()))
}
