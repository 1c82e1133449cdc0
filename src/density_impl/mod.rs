//! Correlated one-particle density and properties.
//!
//! Valid only for the whole-energy-shift variants (CEPA(0), CISD, ACPF,
//! AQCC): the wavefunction is normalized, the one-particle density matrix
//! is assembled from the converged amplitudes, and the density is
//! contracted with the reference-supplied one-electron integrals.

mod density;

pub use density::{build_opdm, normalize, properties, PropertyValues};

#[cfg(test)]
mod tests;
