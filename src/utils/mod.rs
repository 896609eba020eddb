//! Small helpers shared by the wire types.

pub mod time;
