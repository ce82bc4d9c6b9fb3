#![no_std]

pub mod firmware;
