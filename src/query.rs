use std::collections::HashMap;
use std::fmt;

use crate::dom::{Dom, NodeId};
use crate::{Error, Result};

/// Where a query starts: a CSS selector against the document, or a named
/// reference recorded earlier in the same case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryRoot {
    Selector(String),
    Alias(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refinement {
    Find(String),
    Filter(String),
    Not(String),
    First,
    Last,
    /// Zero-based; negative values count from the end.
    Eq(i64),
    Children(Option<String>),
    Parent,
    Closest(String),
}

/// A re-runnable element lookup. Queries hold no node ids, so resolving the
/// same query after a mutation observes the live document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    root: QueryRoot,
    refinements: Vec<Refinement>,
}

impl Query {
    /// `@name` refers to an alias, anything else is a selector.
    pub fn parse(target: &str) -> Self {
        let target = target.trim();
        let root = match target.strip_prefix('@') {
            Some(alias) => QueryRoot::Alias(alias.to_string()),
            None => QueryRoot::Selector(target.to_string()),
        };
        Self {
            root,
            refinements: Vec::new(),
        }
    }

    pub fn root(&self) -> &QueryRoot {
        &self.root
    }

    pub fn refinements(&self) -> &[Refinement] {
        &self.refinements
    }

    pub fn refine(mut self, refinement: Refinement) -> Self {
        self.refinements.push(refinement);
        self
    }

    pub fn alias_name(&self) -> Option<&str> {
        match &self.root {
            QueryRoot::Alias(name) => Some(name),
            QueryRoot::Selector(_) => None,
        }
    }

    /// Replaces an alias root with the stored descriptor so the result can be
    /// resolved without the alias table.
    pub(crate) fn expand(&self, aliases: &HashMap<String, Query>) -> Result<Query> {
        match &self.root {
            QueryRoot::Selector(_) => Ok(self.clone()),
            QueryRoot::Alias(name) => {
                let stored = aliases
                    .get(name)
                    .ok_or_else(|| Error::InvalidAlias(name.clone()))?;
                let mut refinements = stored.refinements.clone();
                refinements.extend(self.refinements.iter().cloned());
                Ok(Query {
                    root: stored.root.clone(),
                    refinements,
                })
            }
        }
    }

    pub(crate) fn resolve(
        &self,
        dom: &Dom,
        aliases: &HashMap<String, Query>,
    ) -> Result<Vec<NodeId>> {
        let expanded = self.expand(aliases)?;
        let mut nodes = match &expanded.root {
            QueryRoot::Selector(selector) => dom.query_selector_all(selector)?,
            // Stored descriptors are always expanded when recorded.
            QueryRoot::Alias(name) => return Err(Error::InvalidAlias(name.clone())),
        };

        for refinement in &expanded.refinements {
            nodes = apply_refinement(dom, nodes, refinement)?;
        }
        Ok(nodes)
    }
}

fn apply_refinement(dom: &Dom, nodes: Vec<NodeId>, refinement: &Refinement) -> Result<Vec<NodeId>> {
    Ok(match refinement {
        Refinement::Find(selector) => {
            let mut found = Vec::new();
            for node in &nodes {
                found.extend(dom.query_selector_all_from(*node, selector)?);
            }
            document_order(found)
        }
        Refinement::Filter(selector) => {
            let mut kept = Vec::with_capacity(nodes.len());
            for node in nodes {
                if dom.matches_selector(node, selector)? {
                    kept.push(node);
                }
            }
            kept
        }
        Refinement::Not(selector) => {
            let mut kept = Vec::with_capacity(nodes.len());
            for node in nodes {
                if !dom.matches_selector(node, selector)? {
                    kept.push(node);
                }
            }
            kept
        }
        Refinement::First => nodes.into_iter().take(1).collect(),
        Refinement::Last => nodes.last().copied().into_iter().collect(),
        Refinement::Eq(index) => {
            let len = nodes.len() as i64;
            let index = if *index < 0 { len + index } else { *index };
            if (0..len).contains(&index) {
                vec![nodes[index as usize]]
            } else {
                Vec::new()
            }
        }
        Refinement::Children(selector) => {
            let mut children = Vec::new();
            for node in &nodes {
                for child in dom.element_children(*node) {
                    let keep = match selector {
                        Some(selector) => dom.matches_selector(child, selector)?,
                        None => true,
                    };
                    if keep {
                        children.push(child);
                    }
                }
            }
            document_order(children)
        }
        Refinement::Parent => {
            document_order(nodes.iter().filter_map(|node| dom.parent_element(*node)).collect())
        }
        Refinement::Closest(selector) => {
            let mut found = Vec::new();
            for node in &nodes {
                found.extend(dom.closest(*node, selector)?);
            }
            document_order(found)
        }
    })
}

// Nodes are allocated while parsing in document order, so id order is tree order.
fn document_order(mut nodes: Vec<NodeId>) -> Vec<NodeId> {
    nodes.sort();
    nodes.dedup();
    nodes
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.root {
            QueryRoot::Selector(selector) => write!(f, "{selector}")?,
            QueryRoot::Alias(name) => write!(f, "@{name}")?,
        }
        for refinement in &self.refinements {
            write!(f, " | ")?;
            match refinement {
                Refinement::Find(selector) => write!(f, "find({selector})")?,
                Refinement::Filter(selector) => write!(f, "filter({selector})")?,
                Refinement::Not(selector) => write!(f, "not({selector})")?,
                Refinement::First => write!(f, "first()")?,
                Refinement::Last => write!(f, "last()")?,
                Refinement::Eq(index) => write!(f, "eq({index})")?,
                Refinement::Children(Some(selector)) => write!(f, "children({selector})")?,
                Refinement::Children(None) => write!(f, "children()")?,
                Refinement::Parent => write!(f, "parent()")?,
                Refinement::Closest(selector) => write!(f, "closest({selector})")?,
            }
        }
        Ok(())
    }
}

/// Elements located by one resolution of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    query: Query,
    nodes: Vec<NodeId>,
}

impl ElementHandle {
    pub(crate) fn new(query: Query, nodes: Vec<NodeId>) -> Self {
        Self { query, nodes }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
