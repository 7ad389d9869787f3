//! Shared traits for the strided-blis engine.
//!
//! This crate provides the scalar abstraction and the micro-kernel contract
//! consumed by `strided-blis`. External crates can depend on
//! `strided-blis-traits` to plug in architecture-specific kernels without
//! orphan rule violations.

pub mod scalar;
pub mod ukernel;

pub use scalar::{Datatype, Scalar, ScalarBase};
pub use ukernel::{
    AuxInfo, GemmMicroKernel, KernelSet, Kernels, RefKernel, TrsmMicroKernel, MAX_REGISTER_BLOCK,
};
