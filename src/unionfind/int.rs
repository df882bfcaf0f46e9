/// Sequential union-find over dense integer elements (product serial
/// numbers), union by rank with path compression and a dead flag on roots.
#[derive(Debug, Default, Clone)]
pub struct IntUnionFind {
    parent: Vec<u32>,
    rank: Vec<u8>,
    dead: Vec<bool>,
    present: Vec<bool>,
}

impl IntUnionFind {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        IntUnionFind {
            parent: Vec::with_capacity(n),
            rank: Vec::with_capacity(n),
            dead: Vec::with_capacity(n),
            present: Vec::with_capacity(n),
        }
    }

    /// Create the singleton `{e}`. Creating an existing element is a no-op.
    pub fn makeset(&mut self, e: u32) {
        let i = e as usize;
        if i >= self.parent.len() {
            let old = self.parent.len();
            self.parent.extend(old as u32..=e);
            self.rank.resize(i + 1, 0);
            self.dead.resize(i + 1, false);
            self.present.resize(i + 1, false);
        }
        self.present[i] = true;
    }

    pub fn contains(&self, e: u32) -> bool {
        self.present.get(e as usize).copied().unwrap_or(false)
    }

    pub fn find(&mut self, e: u32) -> u32 {
        debug_assert!(self.contains(e), "element {} not in union-find", e);
        let mut root = e;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        let mut cur = e;
        while self.parent[cur as usize] != root {
            let next = self.parent[cur as usize];
            self.parent[cur as usize] = root;
            cur = next;
        }
        root
    }

    pub fn unite(&mut self, a: u32, b: u32) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        let dead = self.dead[ra as usize] || self.dead[rb as usize];
        let (child, parent) = match self.rank[ra as usize].cmp(&self.rank[rb as usize]) {
            std::cmp::Ordering::Less => (ra, rb),
            std::cmp::Ordering::Greater => (rb, ra),
            std::cmp::Ordering::Equal => {
                self.rank[ra as usize] += 1;
                (rb, ra)
            }
        };
        self.parent[child as usize] = parent;
        self.dead[parent as usize] = dead;
    }

    pub fn markdead(&mut self, e: u32) {
        let r = self.find(e);
        self.dead[r as usize] = true;
    }

    pub fn isdead(&mut self, e: u32) -> bool {
        let r = self.find(e);
        self.dead[r as usize]
    }

    pub fn sameset(&mut self, a: u32, b: u32) -> bool {
        self.find(a) == self.find(b)
    }

    /// Number of distinct live sets.
    pub fn live_roots(&self) -> usize {
        (0..self.parent.len())
            .filter(|&i| self.present[i] && self.parent[i] as usize == i && !self.dead[i])
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let mut uf = IntUnionFind::new();
        for e in 1..=5 {
            uf.makeset(e);
        }
        assert!(!uf.contains(0));
        assert!(!uf.sameset(1, 2));
        uf.unite(1, 2);
        uf.unite(3, 4);
        assert!(uf.sameset(2, 1));
        assert_eq!(uf.live_roots(), 3);
        uf.markdead(3);
        assert!(uf.isdead(4));
        assert!(!uf.isdead(1));
        assert_eq!(uf.live_roots(), 2);
        uf.unite(1, 4);
        assert!(uf.isdead(2));
    }

    #[test]
    fn test_sparse_makeset() {
        let mut uf = IntUnionFind::with_capacity(4);
        uf.makeset(10);
        assert!(uf.contains(10));
        assert!(!uf.contains(5));
        assert_eq!(uf.find(10), 10);
    }
}
