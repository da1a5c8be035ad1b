// Snapshot of a rendered tree and the queries assertions run against it

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

lazy_static! {
    static ref NUMBER: Regex = Regex::new(r"[-−]?\d+(?:\.\d+)?").expect("static regex");
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Text { text: String },
    Element(Element),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub tag: String,
    /// Stable across re-renders for the same position in the tree
    pub id: u64,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    /// Event names with a handler attached, e.g. `click`, `change`
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn has_event(&self, name: &str) -> bool {
        self.events.iter().any(|e| e == name)
    }

    pub fn is_disabled(&self) -> bool {
        self.attrs.contains_key("disabled")
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out, false);
        out
    }

    /// What a user would read as the control's label
    pub fn label(&self) -> String {
        let text = self.text_content();
        let text = text.trim();
        if !text.is_empty() {
            return text.to_string();
        }
        for name in ["aria-label", "title", "value"] {
            if let Some(value) = self.attr(name) {
                if !value.trim().is_empty() {
                    return value.trim().to_string();
                }
            }
        }
        String::new()
    }

    pub fn is_button(&self) -> bool {
        match self.tag.as_str() {
            "button" => true,
            "input" => matches!(self.attr("type"), Some("button" | "submit" | "reset")),
            _ => self.attr("role") == Some("button"),
        }
    }

    pub fn is_text_input(&self) -> bool {
        match self.tag.as_str() {
            "textarea" => true,
            "input" => matches!(
                self.attr("type"),
                None | Some("text" | "search" | "email" | "url" | "")
            ),
            _ => false,
        }
    }

    /// Class and inline style, the parts of an element that decide how it looks
    pub fn appearance(&self) -> String {
        format!(
            "{}|{}",
            self.attr("class").unwrap_or_default(),
            self.attr("style").unwrap_or_default()
        )
    }
}

/// Rendered output of one component: its top-level nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dom {
    pub roots: Vec<Node>,
}

impl Dom {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Every element, depth first in document order
    pub fn elements(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        walk(&self.roots, &mut out);
        out
    }

    pub fn find_all(&self, predicate: impl Fn(&Element) -> bool) -> Vec<&Element> {
        self.elements().into_iter().filter(|e| predicate(e)).collect()
    }

    pub fn find(&self, predicate: impl Fn(&Element) -> bool) -> Option<&Element> {
        self.elements().into_iter().find(|e| predicate(e))
    }

    pub fn by_id(&self, id: u64) -> Option<&Element> {
        self.find(|e| e.id == id)
    }

    pub fn by_tag(&self, tag: &str) -> Vec<&Element> {
        self.find_all(|e| e.tag == tag)
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.roots, &mut out, false);
        out
    }

    /// Text outside buttons, so labels like "-1" are not read as values
    pub fn visible_text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.roots, &mut out, true);
        out
    }

    /// Numbers displayed outside buttons, in document order
    pub fn numbers(&self) -> Vec<f64> {
        NUMBER
            .find_iter(&self.visible_text())
            .filter_map(|m| m.as_str().replace('−', "-").parse::<f64>().ok())
            .collect()
    }

    pub fn buttons(&self) -> Vec<&Element> {
        self.find_all(Element::is_button)
    }

    /// First enabled-or-not button whose label matches `pattern`
    pub fn button_matching(&self, pattern: &Regex) -> Option<&Element> {
        self.buttons().into_iter().find(|b| pattern.is_match(&b.label()))
    }

    /// First element a user would click: a click handler, then any button,
    /// then a checkbox
    pub fn primary_clickable(&self) -> Option<&Element> {
        self.find(|e| e.has_event("click"))
            .or_else(|| self.buttons().into_iter().next())
            .or_else(|| self.find(|e| e.tag == "input" && e.attr("type") == Some("checkbox")))
    }

    /// Class and style of every element, in document order
    pub fn appearance(&self) -> Vec<String> {
        self.elements().iter().map(|e| e.appearance()).collect()
    }
}

fn walk<'a>(nodes: &'a [Node], out: &mut Vec<&'a Element>) {
    for node in nodes {
        if let Node::Element(element) = node {
            out.push(element);
            walk(&element.children, out);
        }
    }
}

fn collect_text(nodes: &[Node], out: &mut String, skip_buttons: bool) {
    for node in nodes {
        match node {
            Node::Text { text } => out.push_str(text),
            Node::Element(element) => {
                if skip_buttons && element.is_button() {
                    out.push(' ');
                    continue;
                }
                collect_text(&element.children, out, skip_buttons);
                out.push(' ');
            }
        }
    }
}
