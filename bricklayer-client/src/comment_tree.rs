use std::{collections::HashMap, fmt::Debug, hash::Hash};

use crate::api::{Comment, CommentId};

/// Anything that can be arranged in a reply tree
pub trait Threaded {
    type Id: Clone + Debug + Eq + Hash;

    fn id(&self) -> Self::Id;
    fn parent_id(&self) -> Option<Self::Id>;
}

impl Threaded for Comment {
    type Id = CommentId;

    fn id(&self) -> CommentId {
        self.id
    }

    fn parent_id(&self) -> Option<CommentId> {
        self.parent_id
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommentNode<T> {
    pub comment: T,

    /// Direct replies, in the order they were given to `build_tree`
    pub children: Vec<CommentNode<T>>,
}

impl<T> CommentNode<T> {
    pub fn leaf(comment: T) -> CommentNode<T> {
        CommentNode {
            comment,
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including this one
    pub fn count(&self) -> usize {
        self.walk().count()
    }

    /// Depth-first, pre-order traversal yielding each node with its depth
    /// relative to this one
    pub fn walk(&self) -> Walk<'_, T> {
        Walk {
            stack: vec![(0, self)],
        }
    }
}

pub fn count_nodes<T>(forest: &[CommentNode<T>]) -> usize {
    walk_forest(forest).count()
}

/// Pre-order traversal of a whole forest, roots having depth 0
pub fn walk_forest<T>(forest: &[CommentNode<T>]) -> Walk<'_, T> {
    Walk {
        stack: forest.iter().rev().map(|n| (0, n)).collect(),
    }
}

pub struct Walk<'a, T> {
    stack: Vec<(usize, &'a CommentNode<T>)>,
}

impl<'a, T> Iterator for Walk<'a, T> {
    type Item = (usize, &'a CommentNode<T>);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, node) = self.stack.pop()?;
        self.stack
            .extend(node.children.iter().rev().map(|c| (depth + 1, c)));
        Some((depth, node))
    }
}

/// Arranges a flat list of comments into a forest
///
/// This never fails, whatever the input:
/// - when several comments share an id, only the last one is kept, at the
///   position of that last occurrence;
/// - a comment whose parent is not in the list is shown at the top level;
/// - a comment that is its own ancestor breaks the cycle: the cycle member
///   appearing first in the input becomes a root, and the others hang below
///   it as usual.
///
/// Roots and siblings keep the relative order they had in the input, so
/// callers sort beforehand. The construction is iterative and does not depend
/// on the depth of the discussion.
pub fn build_tree<T: Threaded>(comments: Vec<T>) -> Vec<CommentNode<T>> {
    let n = comments.len();

    let mut index: HashMap<T::Id, usize> = HashMap::with_capacity(n);
    for (i, c) in comments.iter().enumerate() {
        index.insert(c.id(), i);
    }

    let mut parent: Vec<Option<usize>> = vec![None; n];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut roots = Vec::new();
    let mut kept = 0;
    for (i, c) in comments.iter().enumerate() {
        if index.get(&c.id()) != Some(&i) {
            tracing::debug!(id = ?c.id(), "duplicate comment, keeping the later one");
            continue;
        }
        kept += 1;
        match c.parent_id() {
            None => roots.push(i),
            Some(p) => match index.get(&p) {
                Some(&pi) => {
                    parent[i] = Some(pi);
                    children[pi].push(i);
                }
                None => {
                    tracing::debug!(id = ?c.id(), parent = ?p, "parent comment not found, showing at top level");
                    roots.push(i);
                }
            },
        }
    }

    // Pre-order of everything reachable from the roots. Whatever is left
    // over afterwards is stuck in, or hanging below, a parent cycle.
    let mut visited = vec![false; n];
    let mut order = Vec::with_capacity(kept);
    for &r in &roots {
        mark_subtree(r, &children, &mut visited, &mut order);
    }

    if order.len() < kept {
        let mut walk_id = vec![usize::MAX; n];
        for start in 0..n {
            if visited[start] || index.get(&comments[start].id()) != Some(&start) {
                continue;
            }

            // Every unvisited node has a parent, so climbing necessarily
            // ends up looping
            let mut cur = start;
            while walk_id[cur] != start {
                walk_id[cur] = start;
                match parent[cur] {
                    Some(p) => cur = p,
                    None => break,
                }
            }

            let mut promoted = cur;
            let mut member = cur;
            while let Some(p) = parent[member] {
                if p == cur {
                    break;
                }
                promoted = promoted.min(p);
                member = p;
            }

            if let Some(p) = parent[promoted].take() {
                children[p].retain(|&c| c != promoted);
            }
            tracing::warn!(
                id = ?comments[promoted].id(),
                "comment is its own ancestor, showing it at top level"
            );
            roots.push(promoted);
            mark_subtree(promoted, &children, &mut visited, &mut order);
        }
        roots.sort_unstable();
    }

    // Children come after their parent in pre-order, so building in reverse
    // always finds them ready
    let mut items: Vec<Option<T>> = comments.into_iter().map(Some).collect();
    let mut built: Vec<Option<CommentNode<T>>> = (0..n).map(|_| None).collect();
    for &i in order.iter().rev() {
        let kids = children[i]
            .iter()
            .filter_map(|&c| built[c].take())
            .collect();
        if let Some(comment) = items[i].take() {
            built[i] = Some(CommentNode {
                comment,
                children: kids,
            });
        }
    }
    roots.iter().filter_map(|&r| built[r].take()).collect()
}

fn mark_subtree(
    root: usize,
    children: &[Vec<usize>],
    visited: &mut [bool],
    order: &mut Vec<usize>,
) {
    let mut stack = vec![root];
    while let Some(i) = stack.pop() {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        order.push(i);
        stack.extend(children[i].iter().rev().copied());
    }
}
