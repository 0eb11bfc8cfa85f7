//! Leaf classifier network
//!
//! Four conv stages then global average pooling and a two-layer head.
//! Because of the global pool the same weights accept any square input, so a
//! model fine-tuned at 640px still answers 128px requests.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
        Relu,
    },
    tensor::{activation::softmax, backend::Backend, Tensor},
};

use super::HIDDEN_UNITS;

/// Hyperparameters stored next to every checkpoint as `model_config.json`
#[derive(Config, Debug)]
pub struct PlantClassifierConfig {
    /// Width of the output layer
    #[config(default = "38")]
    pub num_classes: usize,

    /// Square resolution the weights were last trained at
    #[config(default = "128")]
    pub input_size: usize,

    #[config(default = "0.3")]
    pub dropout_rate: f64,

    #[config(default = "3")]
    pub in_channels: usize,

    /// Filters in the first stage; each later stage doubles it
    #[config(default = "32")]
    pub base_filters: usize,
}

impl PlantClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> PlantClassifier<B> {
        PlantClassifier::new(self, device)
    }

    /// Channel count entering each stage, plus the backbone output width
    fn stage_widths(&self) -> [usize; 5] {
        let b = self.base_filters;
        [self.in_channels, b, b * 2, b * 4, b * 8]
    }
}

/// 3x3 same-padded conv, batch norm, ReLU, then a 2x2 max pool
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B>,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(channels_in: usize, channels_out: usize, device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new([channels_in, channels_out], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            bn: BatchNormConfig::new(channels_out).init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let activated = Relu::new().forward(self.bn.forward(self.conv.forward(x)));
        self.pool.forward(activated)
    }
}

/// The plant disease classifier
#[derive(Module, Debug)]
pub struct PlantClassifier<B: Backend> {
    // fields are read by the weight exporter
    pub conv1: ConvBlock<B>,
    pub conv2: ConvBlock<B>,
    pub conv3: ConvBlock<B>,
    pub conv4: ConvBlock<B>,
    pub global_pool: AdaptiveAvgPool2d,
    pub fc1: Linear<B>,
    pub dropout: Dropout,
    pub fc2: Linear<B>,
}

impl<B: Backend> PlantClassifier<B> {
    pub fn new(config: &PlantClassifierConfig, device: &B::Device) -> Self {
        let w = config.stage_widths();
        let stage = |i: usize| ConvBlock::new(w[i], w[i + 1], device);

        Self {
            conv1: stage(0),
            conv2: stage(1),
            conv3: stage(2),
            conv4: stage(3),
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc1: LinearConfig::new(w[4], HIDDEN_UNITS).init(device),
            dropout: DropoutConfig::new(config.dropout_rate).init(),
            fc2: LinearConfig::new(HIDDEN_UNITS, config.num_classes).init(device),
        }
    }

    /// Logits, `[batch, 3, h, w] -> [batch, num_classes]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = [&self.conv1, &self.conv2, &self.conv3, &self.conv4]
            .into_iter()
            .fold(x, |x, block| block.forward(x));

        let pooled = self.global_pool.forward(features);
        let [batch, channels, _, _] = pooled.dims();
        let hidden = self.fc1.forward(pooled.reshape([batch, channels]));
        let hidden = self.dropout.forward(Relu::new().forward(hidden));
        self.fc2.forward(hidden)
    }

    /// Class probabilities
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(x), 1)
    }

    /// Width of the output layer, read from the head weights
    ///
    /// Linear weights are stored as [d_input, d_output].
    pub fn output_classes(&self) -> usize {
        self.fc2.weight.val().dims()[1]
    }

    /// Replace the classification head with a freshly initialized one
    ///
    /// The backbone and `fc1` keep their weights.
    pub fn with_num_classes(mut self, num_classes: usize, device: &B::Device) -> Self {
        self.fc2 = LinearConfig::new(HIDDEN_UNITS, num_classes).init(device);
        self
    }
}
