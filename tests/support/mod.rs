#![allow(dead_code)]

pub mod scripted_source;
pub mod socket_guard;
