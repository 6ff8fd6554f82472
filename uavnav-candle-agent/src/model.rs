//! Interfaces of the neural networks used in the agents.
use candle_nn::VarBuilder;

/// A neural network model that does not own its
/// [`VarMap`](candle_nn::VarMap) internally.
pub trait SubModel1 {
    /// Configuration from which [`SubModel1`] is constructed.
    type Config;

    /// Input of the model.
    type Input;

    /// Output of the model.
    type Output;

    /// Builds the model with a [`VarBuilder`] and its configuration.
    fn build(vb: VarBuilder, config: Self::Config) -> Self;

    /// A generalized forward function.
    fn forward(&self, input: &Self::Input) -> Self::Output;
}

/// A neural network model taking two inputs, not owning its
/// [`VarMap`](candle_nn::VarMap) internally.
pub trait SubModel2 {
    /// Configuration from which [`SubModel2`] is constructed.
    type Config;

    /// First input of the model.
    type Input1;

    /// Second input of the model.
    type Input2;

    /// Output of the model.
    type Output;

    /// Builds the model with a [`VarBuilder`] and its configuration.
    fn build(vb: VarBuilder, config: Self::Config) -> Self;

    /// A generalized forward function.
    fn forward(&self, input1: &Self::Input1, input2: &Self::Input2) -> Self::Output;
}
