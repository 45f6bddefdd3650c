use candle_core::{Device, Result};

/// `id < 0` selects the CPU.
#[cfg(feature = "cuda")]
pub fn select_device(id: i32) -> Result<Device> {
    if id >= 0 {
        let device = Device::new_cuda(id as usize)?;
        if let Some(seed) = super::rand::env_seed() {
            device.set_seed(seed)?;
        }
        Ok(device)
    } else {
        Ok(Device::Cpu)
    }
}

#[cfg(not(feature = "cuda"))]
pub fn select_device(id: i32) -> Result<Device> {
    if id >= 0 {
        candle_core::bail!("CUDA device {} requested, but built without the `cuda` feature", id);
    }
    Ok(Device::Cpu)
}
