use thiserror::Error;

use super::header::Shape;
use crate::num::{DataType, Scalar};

#[derive(Debug, Error)]
pub enum TensorError {
    #[error("tensor type error: data type {0} mismatches {1}")]
    Type(DataType, DataType),
}

/// Payload bytes of one tensor together with its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTensor {
    pub(super) r#type: DataType,
    pub(super) shape: Shape,
    pub(super) data: Vec<u8>,
}

impl RawTensor {
    #[inline]
    pub fn data_type(&self) -> DataType {
        self.r#type
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Raw little-endian bytes, exactly as stored.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Re-interprets the bytes as elements of `T`. Returns error if type mismatches.
    #[cfg(target_endian = "little")]
    #[inline]
    pub fn try_into_typed<T: Scalar>(self) -> Result<Vec<T>, TensorError> {
        if self.r#type != T::DATA_TYPE {
            return Err(TensorError::Type(self.r#type, T::DATA_TYPE));
        }
        Ok(bytemuck::pod_collect_to_vec(&self.data))
    }
}

#[cfg(test)]
mod tests {
    use half::f16;

    use super::{RawTensor, TensorError};
    use crate::num::DataType;

    #[test]
    fn test_try_into_typed() -> Result<(), TensorError> {
        let values = [1.0f32, -2.5, 3.25];
        let tensor = RawTensor {
            r#type: DataType::F32,
            shape: [3].into(),
            data: values.iter().flat_map(|x| x.to_le_bytes()).collect(),
        };
        assert!(matches!(
            tensor.clone().try_into_typed::<f16>(),
            Err(TensorError::Type(DataType::F32, DataType::F16))
        ));
        assert_eq!(tensor.try_into_typed::<f32>()?, values);
        Ok(())
    }
}
