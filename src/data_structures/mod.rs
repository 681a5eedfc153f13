//! # Data Structures Module
//!
//! Allocation-free containers for kernel tables.
//!
//! ## Modules
//!
//! - `index_list`: ordered, fixed-capacity list of small indices, used for the
//!   process master sequence and the ready queue

pub mod index_list;

pub use index_list::IndexList;
