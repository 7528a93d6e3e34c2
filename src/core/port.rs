use serde::{Deserialize, Serialize};

/// Network endpoint of a VM.
///
/// The VM only owns its ports; transfers are driven by the transfer
/// subsystem, which reads and updates them through the VM's accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    bandwidth: f64,
}

impl Port {
    pub fn new(bandwidth: f64) -> Self {
        Self { bandwidth }
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn set_bandwidth(&mut self, bandwidth: f64) {
        self.bandwidth = bandwidth;
    }
}
