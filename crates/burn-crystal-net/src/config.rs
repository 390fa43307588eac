//! CSPNet configuration

use burn::nn::{EmbeddingConfig, LayerNormConfig, LinearConfig};
use burn::prelude::*;
use burn_crystal_core::graph::EdgeStyle;
use burn_crystal_core::{sinusoids_dim, MAX_ATOMIC_NUM};
use serde::{Deserialize, Serialize};

use crate::cspnet::CspNet;
use crate::error::{NetError, Result};
use crate::layer::CspLayer;

/// Featurization of the fractional displacement along each edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceEmbedding {
    /// Fourier features with `num_freqs` integer frequencies
    Sinusoidal { num_freqs: usize },
    /// The raw 3-vector
    Raw,
}

impl Default for DistanceEmbedding {
    fn default() -> Self {
        Self::Sinusoidal { num_freqs: 10 }
    }
}

impl DistanceEmbedding {
    /// Width of the edge distance features
    pub fn dim(&self) -> usize {
        match self {
            Self::Sinusoidal { num_freqs } => sinusoids_dim(*num_freqs),
            Self::Raw => 3,
        }
    }
}

/// Property prediction head
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyHead {
    #[default]
    None,
    /// One `dim`-vector per structure, from mean-pooled atom features
    GraphLevel(usize),
    /// One `dim`-vector per atom
    NodeLevel(usize),
}

impl PropertyHead {
    pub fn dim(&self) -> Option<usize> {
        match self {
            Self::None => None,
            Self::GraphLevel(dim) | Self::NodeLevel(dim) => Some(*dim),
        }
    }
}

/// Classifier-free conditioning on the property target
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierFreeConfig {
    /// Probability of dropping the condition during unguided forwards
    pub prob: f64,
}

/// Configuration for [`CspNet`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CspNetConfig {
    pub hidden_dim: usize,
    /// Width of the time embedding concatenated to the atom features
    pub latent_dim: usize,
    pub num_layers: usize,
    /// Size of the atom type vocabulary
    pub max_atoms: usize,
    pub distance_embedding: DistanceEmbedding,
    pub edge_style: EdgeStyle,
    pub layer_norm: bool,
    /// Feed `L·Lᵀ` to the edges and right-multiply the lattice score by `L`
    pub lattice_inner_product: bool,
    /// Atom types arrive as soft/one-hot vectors instead of ids
    pub smooth: bool,
    /// Predict atom type logits
    pub pred_type: bool,
    pub property: PropertyHead,
    pub cfg: Option<ClassifierFreeConfig>,
}

impl Default for CspNetConfig {
    fn default() -> Self {
        Self {
            hidden_dim: 128,
            latent_dim: 256,
            num_layers: 4,
            max_atoms: MAX_ATOMIC_NUM,
            distance_embedding: DistanceEmbedding::default(),
            edge_style: EdgeStyle::FullyConnected,
            layer_norm: false,
            lattice_inner_product: true,
            smooth: false,
            pred_type: false,
            property: PropertyHead::None,
            cfg: None,
        }
    }
}

impl CspNetConfig {
    pub fn with_hidden_dim(mut self, hidden_dim: usize) -> Self {
        self.hidden_dim = hidden_dim;
        self
    }

    pub fn with_latent_dim(mut self, latent_dim: usize) -> Self {
        self.latent_dim = latent_dim;
        self
    }

    pub fn with_num_layers(mut self, num_layers: usize) -> Self {
        self.num_layers = num_layers;
        self
    }

    pub fn with_edge_style(mut self, edge_style: EdgeStyle) -> Self {
        self.edge_style = edge_style;
        self
    }

    pub fn with_distance_embedding(mut self, distance_embedding: DistanceEmbedding) -> Self {
        self.distance_embedding = distance_embedding;
        self
    }

    pub fn with_layer_norm(mut self, layer_norm: bool) -> Self {
        self.layer_norm = layer_norm;
        self
    }

    pub fn with_smooth(mut self, smooth: bool) -> Self {
        self.smooth = smooth;
        self
    }

    pub fn with_pred_type(mut self, pred_type: bool) -> Self {
        self.pred_type = pred_type;
        self
    }

    pub fn with_property(mut self, property: PropertyHead) -> Self {
        self.property = property;
        self
    }

    pub fn with_cfg(mut self, prob: f64) -> Self {
        self.cfg = Some(ClassifierFreeConfig { prob });
        self
    }

    /// Checks the configuration without allocating parameters
    pub fn validate(&self) -> Result<()> {
        if self.hidden_dim == 0 {
            return Err(NetError::Config("hidden_dim must be positive".into()));
        }
        if self.num_layers == 0 {
            return Err(NetError::Config("num_layers must be positive".into()));
        }
        if self.max_atoms != MAX_ATOMIC_NUM {
            return Err(NetError::Config(format!(
                "max_atoms must equal the species vocabulary size {MAX_ATOMIC_NUM}, got {}",
                self.max_atoms
            )));
        }
        if let DistanceEmbedding::Sinusoidal { num_freqs: 0 } = self.distance_embedding {
            return Err(NetError::Config("num_freqs must be positive".into()));
        }
        if self.property.dim() == Some(0) {
            return Err(NetError::Config("property head width must be positive".into()));
        }
        if let Some(cfg) = &self.cfg {
            if self.property.dim().is_none() {
                return Err(NetError::Config(
                    "classifier-free conditioning requires a property head".into(),
                ));
            }
            if !(0.0..=1.0).contains(&cfg.prob) {
                return Err(NetError::Config(format!(
                    "cfg drop probability must lie in [0, 1], got {}",
                    cfg.prob
                )));
            }
        }
        Ok(())
    }

    /// Initializes the network
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<CspNet<B>> {
        self.validate()?;
        let h = self.hidden_dim;

        let (type_embedding, type_projection) = if self.smooth {
            (None, Some(LinearConfig::new(self.max_atoms, h).init(device)))
        } else {
            (Some(EmbeddingConfig::new(self.max_atoms, h).init(device)), None)
        };

        let layers = (0..self.num_layers)
            .map(|_| CspLayer::new(h, self.distance_embedding.dim(), self.layer_norm, device))
            .collect();

        let property_dim = self.property.dim();
        let (graph_out, node_out) = match self.property {
            PropertyHead::None => (None, None),
            PropertyHead::GraphLevel(dim) => (Some(LinearConfig::new(h, dim).init(device)), None),
            PropertyHead::NodeLevel(dim) => (
                None,
                Some(LinearConfig::new(h, dim).with_bias(false).init(device)),
            ),
        };

        Ok(CspNet {
            type_embedding,
            type_projection,
            atom_latent_emb: LinearConfig::new(h + self.latent_dim, h).init(device),
            layers,
            coord_out: LinearConfig::new(h, 3).with_bias(false).init(device),
            lattice_out: LinearConfig::new(h, 9).with_bias(false).init(device),
            final_layer_norm: self
                .layer_norm
                .then(|| LayerNormConfig::new(h).init(device)),
            type_out: self
                .pred_type
                .then(|| LinearConfig::new(h, MAX_ATOMIC_NUM).init(device)),
            graph_out,
            node_out,
            y_projection: match (&self.cfg, property_dim) {
                (Some(_), Some(dim)) => Some(LinearConfig::new(dim, h).init(device)),
                _ => None,
            },
            config: self.clone(),
        })
    }
}


// Host-side value carried by a module as a constant (no parameters, empty record)
macro_rules! constant_module {
    ($($type:ty),+) => {$(
        impl<B: burn::tensor::backend::Backend> burn::module::Module<B> for $type {
            type Record = burn::module::ConstantRecord;

            fn visit<V: burn::module::ModuleVisitor<B>>(&self, _visitor: &mut V) {}

            fn map<M: burn::module::ModuleMapper<B>>(self, _mapper: &mut M) -> Self {
                self
            }

            fn load_record(self, _record: Self::Record) -> Self {
                self
            }

            fn into_record(self) -> Self::Record {
                burn::module::ConstantRecord::new()
            }

            fn to_device(self, _: &B::Device) -> Self {
                self
            }

            fn fork(self, _: &B::Device) -> Self {
                self
            }

            fn collect_devices(&self, devices: burn::module::Devices<B>) -> burn::module::Devices<B> {
                devices
            }
        }

        impl<B: burn::tensor::backend::AutodiffBackend> burn::module::AutodiffModule<B> for $type {
            type InnerModule = $type;

            fn valid(&self) -> Self::InnerModule {
                self.clone()
            }
        }

        impl burn::module::ModuleDisplayDefault for $type {
            fn content(&self, content: burn::module::Content) -> Option<burn::module::Content> {
                content.add_formatted(&format!("{:?}", self)).optional()
            }
        }

        impl burn::module::ModuleDisplay for $type {}
    )+};
}

constant_module!(CspNetConfig);
