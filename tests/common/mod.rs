#![allow(dead_code)]

pub mod assertions;
pub mod executors;
pub mod records;
