use std::fmt::{Debug, Formatter};
use derivative::Derivative;
use crate::host::{HostRef, HostTree};

/// A span of the live tree between two marker nodes, owned by one dynamic computation.
///
/// Everything strictly between `start` and `end` belongs to the owner, which may remove or insert
/// freely there, and nothing outside. New content always goes right before `end`. Regions nest:
/// a region may sit inside another region's span, so nothing here assumes the markers are the
/// only children of their parent.
///
/// Both markers are held weakly.
#[derive(Derivative)]
#[derivative(Clone(bound = ""))]
pub struct Region<H: HostTree> {
    start: HostRef<H>,
    end: HostRef<H>
}

impl<H: HostTree> Region<H> {
    /// Append a new pair of markers to `parent`.
    pub fn acquire(host: &H, parent: &H::Node) -> Self {
        Self::acquire_before(host, parent, None)
    }

    /// Insert a new pair of markers into `parent` before `reference`.
    pub fn acquire_before(host: &H, parent: &H::Node, reference: Option<&H::Node>) -> Self {
        let start = host.create_marker();
        let end = host.create_marker();
        host.insert_before(parent, &start, reference);
        host.insert_before(parent, &end, reference);
        Region {
            start: HostRef::new(host, &start),
            end: HostRef::new(host, &end)
        }
    }

    /// Both markers, or `None` if either is gone.
    pub fn bounds(&self) -> Option<(H::Node, H::Node)> {
        Some((self.start.resolve()?, self.end.resolve()?))
    }

    pub fn start(&self) -> &HostRef<H> {
        &self.start
    }

    pub fn end(&self) -> &HostRef<H> {
        &self.end
    }

    /// Mutation effect targets for the markers.
    pub fn targets(&self) -> (HostRef<H>, HostRef<H>) {
        (self.start.clone(), self.end.clone())
    }

    /// The nodes strictly between the markers.
    pub fn contents(&self, host: &H) -> Vec<H::Node> {
        let Some((start, end)) = self.bounds() else { return Vec::new() };
        let mut contents = Vec::new();
        let mut current = Self::first_between(host, &start, &end);
        while let Some(node) = current {
            current = host.next_sibling(&node).filter(|next| !host.same_node(next, &end));
            contents.push(node);
        }
        contents
    }

    pub fn is_empty(&self, host: &H) -> bool {
        self.bounds().map_or(true, |(start, end)| Self::first_between(host, &start, &end).is_none())
    }

    /// Insert `node` (or a fragment's children) right before the end marker.
    pub fn insert(&self, host: &H, node: &H::Node) {
        if let Some(end) = self.end.resolve() {
            Self::insert_before_end(host, &end, node);
        }
    }

    /// Remove everything between the markers.
    pub fn clear(&self, host: &H) {
        if let Some((start, end)) = self.bounds() {
            Self::truncate(host, Self::first_between(host, &start, &end), &end);
        }
    }

    /// First node after `start`, unless that is `end`.
    pub fn first_between(host: &H, start: &H::Node, end: &H::Node) -> Option<H::Node> {
        host.next_sibling(start).filter(|next| !host.same_node(next, end))
    }

    pub fn insert_before_end(host: &H, end: &H::Node, node: &H::Node) {
        match host.parent(end) {
            Some(parent) => host.insert_before(&parent, node, Some(end)),
            None => log::warn!("region end marker {:?} has no parent, dropping inserted content", host.key(end))
        }
    }

    /// Remove `from` and every following sibling up to (not including) `end`.
    /// Returns how many nodes were removed.
    pub fn truncate(host: &H, from: Option<H::Node>, end: &H::Node) -> usize {
        let mut removed = 0;
        let mut current = from;
        while let Some(node) = current {
            if host.same_node(&node, end) {
                break;
            }
            current = host.next_sibling(&node);
            host.remove(&node);
            removed += 1;
        }
        if removed > 0 {
            log::debug!("truncated {} nodes before region end {:?}", removed, host.key(end));
        }
        removed
    }
}

impl<H: HostTree> Debug for Region<H> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("start", &self.start)
            .field("end", &self.end)
            .finish()
    }
}
