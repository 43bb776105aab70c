//! Halo exchange lists between neighbouring ranks

/// Points shared with one neighbouring rank
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighbourLink {
    pub rank: usize,
    /// Local point indices, ordered by global tag on both sides
    pub points: Vec<usize>,
}

/// All neighbour links of one rank, in increasing neighbour rank
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagingInfo {
    pub links: Vec<NeighbourLink>,
}

impl MessagingInfo {
    pub fn new(mut links: Vec<NeighbourLink>) -> Self {
        links.sort_by_key(|l| l.rank);
        links.retain(|l| !l.points.is_empty());
        Self { links }
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn neighbours(&self) -> impl Iterator<Item = usize> + '_ {
        self.links.iter().map(|l| l.rank)
    }
}
