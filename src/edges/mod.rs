//! Edge processing utilities: gradients, thinned edge maps and the Laplacian
//! focus measure.
//!
//! - Sobel gradients returning `gx`, `gy` and magnitude, with replicate
//!   border handling.
//! - Non-maximum suppression producing a binary [`EdgeMap`] for line voting.
//! - Laplacian variance over a window, shared by focus and blur scoring.

pub mod grad;
pub mod laplacian;
pub mod nms;

pub use grad::{sobel_gradients, Grad};
pub use laplacian::{laplacian_variance, Window};
pub use nms::{edge_map, thin_edges, EdgeMap};
