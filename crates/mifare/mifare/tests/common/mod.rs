//! Common test utilities: simulated cards speaking the MIFARE command sets
#![allow(dead_code)]

mod desfire;
mod ultralight;

pub use classic::SimulatedClassic;
pub use desfire::SimulatedDesFire;
pub use ultralight::{DEFAULT_KEY, SimulatedUltralightC};

use nexum_picc_core::{Picc, Sak, Uid};
use tracing_subscriber::EnvFilter;

/// Install a test subscriber honouring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Identity of a selected card with a 7 byte UID
pub fn picc(sak: u8) -> Picc {
    let uid = Uid::new(vec![0x04, 0x51, 0x5C, 0xFA, 0x6F, 0x31, 0x80]).expect("valid UID");
    Picc::new(uid, Sak(sak))
}
