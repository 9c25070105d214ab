pub mod numeric;
pub mod tensor;

pub use numeric::Float;
pub use numeric::Numeric;
pub use tensor::Tensor;
