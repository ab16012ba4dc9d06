//! Bounded sequenced queue
//!
//! The coordination core of the copy: readers append sequence-tagged lines,
//! writers take them back strictly in sequence order.

mod ring;

pub use ring::*;
