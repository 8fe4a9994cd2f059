use autojoin_core::geometry::Point2;
use autojoin_core::primitive::Primitive;
use tracing::debug;

use crate::proximity::EndpointIndex;

/// 按秩合并、路径减半的并查集。
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// 合并两个集合；若已同属一个集合则返回 `false`。
    pub fn union(&mut self, x: usize, y: usize) -> bool {
        let rx = self.find(x);
        let ry = self.find(y);
        if rx == ry {
            return false;
        }
        if self.rank[rx] < self.rank[ry] {
            self.parent[rx] = ry;
        } else if self.rank[rx] > self.rank[ry] {
            self.parent[ry] = rx;
        } else {
            self.parent[ry] = rx;
            self.rank[rx] += 1;
        }
        true
    }

    #[inline]
    pub fn same(&mut self, x: usize, y: usize) -> bool {
        self.find(x) == self.find(y)
    }
}

/// 容差内彼此相连的端点所归并成的拓扑节点。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// 一个簇：经端点传递相连的线段 / 圆弧集合，成员为输入切片下标（升序）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub members: Vec<usize>,
}

/// 聚类结果：簇划分、节点邻接表与孤立的圆。
#[derive(Debug, Clone)]
pub struct ClusterSet {
    clusters: Vec<Cluster>,
    cluster_of: Vec<Option<usize>>,
    endpoint_nodes: Vec<Option<[NodeId; 2]>>,
    node_positions: Vec<Point2>,
    incidence: Vec<Vec<usize>>,
    circles: Vec<usize>,
}

impl ClusterSet {
    /// 按发现顺序（最小成员下标递增）排列的簇。
    #[inline]
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    #[inline]
    pub fn cluster_of(&self, primitive: usize) -> Option<usize> {
        self.cluster_of.get(primitive).copied().flatten()
    }

    /// 图元起点、终点所在节点；圆返回 `None`。
    #[inline]
    pub fn nodes_of(&self, primitive: usize) -> Option<[NodeId; 2]> {
        self.endpoint_nodes.get(primitive).copied().flatten()
    }

    /// 节点的代表坐标：输入顺序中第一个落入该节点的端点。
    #[inline]
    pub fn position(&self, node: NodeId) -> Point2 {
        self.node_positions[node.0]
    }

    /// 与节点相接的图元（升序）。首尾都落在同一节点的图元出现两次。
    #[inline]
    pub fn incident(&self, node: NodeId) -> &[usize] {
        &self.incidence[node.0]
    }

    #[inline]
    pub fn degree(&self, node: NodeId) -> usize {
        self.incidence[node.0].len()
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.node_positions.len()
    }

    #[inline]
    pub fn circles(&self) -> &[usize] {
        &self.circles
    }
}

/// 对全部图元聚类。端点经网格索引查找容差内的邻居，并查集同时合并端点与其所属图元，
/// 因此聚类语义是连通性（传递闭包），而不是最近邻。
pub fn build_clusters(primitives: &[Primitive], tolerance: f64) -> ClusterSet {
    let endpoint_count = primitives.len() * 2;
    let mut index = EndpointIndex::new(tolerance);
    let mut endpoints: Vec<Option<Point2>> = vec![None; endpoint_count];
    let mut circles = Vec::new();

    for (i, primitive) in primitives.iter().enumerate() {
        match primitive.endpoints() {
            Some([start, end]) => {
                endpoints[2 * i] = Some(start);
                endpoints[2 * i + 1] = Some(end);
                index.insert(start, 2 * i);
                index.insert(end, 2 * i + 1);
            }
            None => circles.push(i),
        }
    }

    let mut endpoint_sets = UnionFind::new(endpoint_count);
    let mut primitive_sets = UnionFind::new(primitives.len());
    for (endpoint, point) in endpoints.iter().enumerate() {
        let Some(point) = point else { continue };
        for other in index.query_near(*point, tolerance) {
            if other == endpoint {
                continue;
            }
            endpoint_sets.union(endpoint, other);
            primitive_sets.union(endpoint / 2, other / 2);
        }
    }

    // 节点编号按端点输入顺序分配，保证多次运行结果一致。
    let mut node_of_root: Vec<Option<NodeId>> = vec![None; endpoint_count];
    let mut node_positions = Vec::new();
    let mut incidence: Vec<Vec<usize>> = Vec::new();
    let mut endpoint_nodes: Vec<Option<[NodeId; 2]>> = vec![None; primitives.len()];
    for (i, slot) in endpoint_nodes.iter_mut().enumerate() {
        let (Some(start), Some(end)) = (endpoints[2 * i], endpoints[2 * i + 1]) else {
            continue;
        };
        let mut resolve = |endpoint: usize, point: Point2| {
            let root = endpoint_sets.find(endpoint);
            let node = *node_of_root[root].get_or_insert_with(|| {
                node_positions.push(point);
                incidence.push(Vec::new());
                NodeId(node_positions.len() - 1)
            });
            incidence[node.0].push(i);
            node
        };
        let start_node = resolve(2 * i, start);
        let end_node = resolve(2 * i + 1, end);
        *slot = Some([start_node, end_node]);
    }

    let mut cluster_of_root: Vec<Option<usize>> = vec![None; primitives.len()];
    let mut cluster_of = vec![None; primitives.len()];
    let mut clusters: Vec<Cluster> = Vec::new();
    for i in 0..primitives.len() {
        if endpoint_nodes[i].is_none() {
            continue;
        }
        let root = primitive_sets.find(i);
        let cluster = *cluster_of_root[root].get_or_insert_with(|| {
            clusters.push(Cluster {
                members: Vec::new(),
            });
            clusters.len() - 1
        });
        clusters[cluster].members.push(i);
        cluster_of[i] = Some(cluster);
    }

    debug!(
        primitives = primitives.len(),
        clusters = clusters.len(),
        nodes = node_positions.len(),
        circles = circles.len(),
        "聚类完成"
    );

    ClusterSet {
        clusters,
        cluster_of,
        endpoint_nodes,
        node_positions,
        incidence,
        circles,
    }
}
