//! Application layer: the controller's resilient core.
//!
//! The [`supervisor::Supervisor`] brings the link and bus session up, then
//! hands a [`context::Context`] to the [`event_loop::EventLoop`], which drains
//! inbound messages through the [`router::MessageRouter`] into the
//! [`ledger::Ledger`] and turns reader polls into scans with the
//! [`debouncer::ScanDebouncer`]. Everything runs on one task.

pub mod context;
pub mod debouncer;
pub mod event_loop;
pub mod ledger;
pub mod router;
pub mod supervisor;
