//! Core types shared by the `gyre` runtime: logical time ([`time::Tag`],
//! [`time::Timestamp`]) and the arena keys identifying runtime components.

pub mod keys;
pub mod time;
