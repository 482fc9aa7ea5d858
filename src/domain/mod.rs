//! Domain layer: card, balance and message types, plus the ports through
//! which the controller talks to its hardware and the bus.

pub mod account;
pub mod message;
pub mod ports;
pub mod tag;
