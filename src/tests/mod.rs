//! Scenario tests for a whole node.
//!
//! Every case wires a real set of components over the in-process doubles in `support`
//! and drives it through the loops' entry points or the HTTP router.

mod cases_ledger_test;

pub mod support;
