//! Execution runtime
//!
//! The runtime turns a [`MatrixOps`](crate::ops::MatrixOps) call into work:
//!
//! ```text
//! Client
//! ├── Config (threads, chunk, JIT and offload settings)
//! ├── Parallelism (thread pool, task counts)
//! ├── KernelCache + Specializer (JIT tier)
//! ├── DeviceExecutor (optional accelerator)
//! └── dispatch (format-aware algorithms per operation)
//! ```
//!
//! Dispatch code picks an algorithm from the operands' storage state, slices
//! the work with [`slice`], and asks the client for a kernel. The client
//! serves it from the factory, the JIT cache or the generic tier, in that
//! order.

mod client;
pub mod config;
mod dispatch;
pub mod offload;
mod parallel;
pub mod slice;
pub(crate) mod workspace;

pub use client::{Client, ClientBuilder, TierStats};
pub use config::{Config, JitConfig, OffloadConfig, OffloadPolicy};
pub use dispatch::Mask;
pub use offload::{DeviceExecutor, DeviceRequest, OffloadDecision};
pub use parallel::Parallelism;
