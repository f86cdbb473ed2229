//! Term hierarchy resolution
//!
//! Orders hierarchical terms so that no child is emitted before its parent.
//! A term whose parent is not part of the set is treated as a root. Parent
//! references that loop back on themselves can never be satisfied; once a
//! full pass over the remaining terms places nothing, one term on the loop
//! is emitted as a root and resolution carries on from there.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::models::Term;

/// Terms in emission order, with the parent slug of each term that is
/// emitted under a parent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedTerms {
    terms: Vec<Term>,
    parent_slugs: HashMap<i64, String>,
}

impl ResolvedTerms {
    /// A single term emitted as a root
    pub fn single(term: Term) -> Self {
        Self {
            terms: vec![term],
            parent_slugs: HashMap::new(),
        }
    }

    /// Terms in emission order
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Slug of the emitted parent, empty for roots
    pub fn parent_slug(&self, term: &Term) -> &str {
        self.parent_slugs
            .get(&term.id)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Order terms parent-before-child
pub fn resolve_hierarchy(terms: Vec<Term>) -> ResolvedTerms {
    let present: HashSet<i64> = terms.iter().map(|t| t.id).collect();
    let mut queue: VecDeque<Term> = terms.into();
    let mut placed: HashMap<i64, String> = HashMap::with_capacity(queue.len());
    let mut resolved = ResolvedTerms {
        terms: Vec::with_capacity(queue.len()),
        parent_slugs: HashMap::new(),
    };
    let mut deferred = 0;

    while let Some(term) = queue.pop_front() {
        let ready = term.is_root() || !present.contains(&term.parent_id);
        if ready || placed.contains_key(&term.parent_id) {
            if let Some(parent_slug) = placed.get(&term.parent_id).filter(|_| !ready) {
                resolved.parent_slugs.insert(term.id, parent_slug.clone());
            }
            placed.insert(term.id, term.slug.clone());
            resolved.terms.push(term);
            deferred = 0;
            continue;
        }

        queue.push_back(term);
        deferred += 1;

        if deferred >= queue.len() {
            let Some(root) = take_cycle_member(&mut queue) else {
                resolved.terms.extend(queue.drain(..));
                break;
            };
            tracing::warn!(
                "Term parents form a cycle; emitting '{}' as a root",
                root.slug
            );
            placed.insert(root.id, root.slug.clone());
            resolved.terms.push(root);
            deferred = 0;
        }
    }

    resolved
}

/// Remove the first term reachable on a parent loop from the queue front
///
/// Every queued term is blocked on a queued parent, so following parents
/// from any of them must revisit a term.
fn take_cycle_member(queue: &mut VecDeque<Term>) -> Option<Term> {
    let parents: HashMap<i64, i64> = queue.iter().map(|t| (t.id, t.parent_id)).collect();
    let mut seen = HashSet::new();
    let mut current = queue.front()?.id;
    while seen.insert(current) {
        current = *parents.get(&current)?;
    }
    let index = queue.iter().position(|t| t.id == current)?;
    queue.remove(index)
}
