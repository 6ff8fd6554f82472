use candle_core::{error::Result, DType, Device, IndexOp, Tensor};
use uavnav_core::generic_replay_buffer::BatchBase;

/// Adds the capability of constructing a [`Tensor`] with a static method.
pub trait ZeroTensor {
    /// Constructs a zero tensor.
    fn zeros(shape: &[usize]) -> Result<Tensor>;
}

impl ZeroTensor for u8 {
    fn zeros(shape: &[usize]) -> Result<Tensor> {
        Tensor::zeros(shape, DType::U8, &Device::Cpu)
    }
}

impl ZeroTensor for f32 {
    fn zeros(shape: &[usize]) -> Result<Tensor> {
        Tensor::zeros(shape, DType::F32, &Device::Cpu)
    }
}

impl ZeroTensor for i64 {
    fn zeros(shape: &[usize]) -> Result<Tensor> {
        Tensor::zeros(shape, DType::I64, &Device::Cpu)
    }
}

/// A batch of observations or actions backed by a [`Tensor`].
///
/// The internal buffer is lazily initialized on the first push, taking its
/// shape (except the leading batch dimension) and dtype from the pushed
/// data.
#[derive(Clone, Debug)]
pub struct TensorBatch {
    buf: Option<Tensor>,
    capacity: usize,
}

impl TensorBatch {
    /// Constructs a batch from a tensor; the leading dimension is the
    /// batch dimension.
    pub fn from_tensor(t: Tensor) -> Self {
        let capacity = t.dims()[0] as _;
        Self {
            buf: Some(t),
            capacity,
        }
    }

    /// Moves the internal buffer to the given device.
    pub fn to(&mut self, device: &Device) -> Result<()> {
        if let Some(buf) = &self.buf {
            self.buf = Some(buf.to_device(device)?);
        }
        Ok(())
    }
}

impl BatchBase for TensorBatch {
    fn new(capacity: usize) -> Self {
        Self {
            buf: None,
            capacity,
        }
    }

    /// Pushes the given data at `index`, wrapping around the capacity.
    fn push(&mut self, index: usize, data: Self) {
        if data.buf.is_none() {
            return;
        }

        let batch_size = data.buf.as_ref().unwrap().dims()[0];
        if batch_size == 0 {
            return;
        }

        if self.buf.is_none() {
            let mut shape = data.buf.as_ref().unwrap().dims().to_vec();
            shape[0] = self.capacity;
            let dtype = data.buf.as_ref().unwrap().dtype();
            self.buf = Some(Tensor::zeros(shape, dtype, &Device::Cpu).unwrap());
        }

        if index + batch_size > self.capacity {
            let head = self.capacity - index;
            let data = &data.buf.unwrap();
            let data1 = data.i((..head,)).unwrap();
            let data2 = data.i((head..,)).unwrap();
            self.buf
                .as_mut()
                .unwrap()
                .slice_set(&data1, 0, index)
                .unwrap();
            self.buf.as_mut().unwrap().slice_set(&data2, 0, 0).unwrap();
        } else {
            self.buf
                .as_mut()
                .unwrap()
                .slice_set(&data.buf.unwrap(), 0, index)
                .unwrap();
        }
    }

    fn sample(&self, ixs: &Vec<usize>) -> Self {
        let capacity = ixs.len();
        let ixs = {
            let device = self.buf.as_ref().unwrap().device();
            let ixs = ixs.iter().map(|x| *x as u32).collect();
            Tensor::from_vec(ixs, &[capacity], device).unwrap()
        };
        let buf = Some(self.buf.as_ref().unwrap().index_select(&ixs, 0).unwrap());
        Self { buf, capacity }
    }
}

impl From<TensorBatch> for Tensor {
    fn from(b: TensorBatch) -> Self {
        b.buf.expect("Empty TensorBatch")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch_of(vs: &[f32]) -> TensorBatch {
        let t = Tensor::from_vec(vs.to_vec(), &[vs.len(), 1], &Device::Cpu).unwrap();
        TensorBatch::from_tensor(t)
    }

    #[test]
    fn push_wraps_around() {
        let mut buf = TensorBatch::new(4);
        buf.push(0, batch_of(&[0., 1., 2., 3.]));
        buf.push(3, batch_of(&[4., 5.]));

        let t: Tensor = buf.sample(&vec![0, 1, 2, 3]).into();
        let vs: Vec<f32> = t.flatten_all().unwrap().to_vec1().unwrap();
        assert_eq!(vs, vec![5., 1., 2., 4.]);
    }

    #[test]
    fn sample_selects_rows() {
        let mut buf = TensorBatch::new(3);
        buf.push(0, batch_of(&[10., 20., 30.]));

        let t: Tensor = buf.sample(&vec![2, 0]).into();
        let vs: Vec<f32> = t.flatten_all().unwrap().to_vec1().unwrap();
        assert_eq!(vs, vec![30., 10.]);
    }
}
