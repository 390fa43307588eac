//! Message passing layer

use burn::nn::{LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::silu;
use burn_crystal_core::segment_mean;

/// Per-forward edge inputs shared by every layer
#[derive(Debug, Clone)]
pub struct EdgeFeatures<B: Backend> {
    /// Source atom of each edge, host side for aggregation
    pub sources: Vec<usize>,
    pub sources_tensor: Tensor<B, 1, Int>,
    pub targets_tensor: Tensor<B, 1, Int>,
    /// Flattened lattice features of each edge's structure `[E, 9]`
    pub lattice: Tensor<B, 2>,
    /// Embedded displacements `[E, dis_dim]`
    pub distance: Tensor<B, 2>,
}

impl<B: Backend> EdgeFeatures<B> {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Two-layer perceptron with SiLU after each layer
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
}

impl<B: Backend> Mlp<B> {
    pub fn new(d_in: usize, d_hidden: usize, device: &B::Device) -> Self {
        Self {
            fc1: LinearConfig::new(d_in, d_hidden).init(device),
            fc2: LinearConfig::new(d_hidden, d_hidden).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = silu(self.fc1.forward(x));
        silu(self.fc2.forward(x))
    }
}

/// Residual message passing layer
///
/// Edge messages see both endpoint features, the structure's lattice features
/// and the embedded displacement; each atom averages the messages of the edges
/// it is the source of.
#[derive(Module, Debug)]
pub struct CspLayer<B: Backend> {
    pub edge_mlp: Mlp<B>,
    pub node_mlp: Mlp<B>,
    pub layer_norm: Option<LayerNorm<B>>,
    #[module(skip)]
    pub hidden_dim: usize,
}

impl<B: Backend> CspLayer<B> {
    pub fn new(hidden_dim: usize, distance_dim: usize, layer_norm: bool, device: &B::Device) -> Self {
        Self {
            edge_mlp: Mlp::new(hidden_dim * 2 + 9 + distance_dim, hidden_dim, device),
            node_mlp: Mlp::new(hidden_dim * 2, hidden_dim, device),
            layer_norm: layer_norm.then(|| LayerNormConfig::new(hidden_dim).init(device)),
            hidden_dim,
        }
    }

    /// `[N, H] -> [N, H]`
    pub fn forward(&self, node_features: Tensor<B, 2>, edges: &EdgeFeatures<B>) -> Tensor<B, 2> {
        let input = node_features.clone();
        let h = match &self.layer_norm {
            Some(norm) => norm.forward(node_features),
            None => node_features,
        };
        let [num_nodes, hidden] = h.dims();

        let aggregated = if edges.is_empty() {
            Tensor::zeros([num_nodes, hidden], &h.device())
        } else {
            let h_src = h.clone().select(0, edges.sources_tensor.clone());
            let h_dst = h.clone().select(0, edges.targets_tensor.clone());
            let messages = self.edge_mlp.forward(Tensor::cat(
                vec![h_src, h_dst, edges.lattice.clone(), edges.distance.clone()],
                1,
            ));
            segment_mean(messages, &edges.sources, num_nodes)
        };

        let out = self.node_mlp.forward(Tensor::cat(vec![h, aggregated], 1));
        input + out
    }
}
