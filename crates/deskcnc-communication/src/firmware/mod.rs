//! Controller firmware protocols

pub mod deskcnc;
