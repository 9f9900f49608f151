//! Element trait for distributed matrices

use bytemuck::Pod;
use num_traits::NumAssign;
use std::fmt::Debug;

/// Element types a distributed matrix can hold
///
/// `Pod` lets local slabs travel through the communicator as raw bytes;
/// `NumAssign` covers the arithmetic that reductions need. Implemented for
/// all the primitive numeric types via the blanket impl.
pub trait Scalar: Pod + NumAssign + PartialEq + Debug + Send + Sync + 'static {}

impl<T> Scalar for T where T: Pod + NumAssign + PartialEq + Debug + Send + Sync + 'static {}
